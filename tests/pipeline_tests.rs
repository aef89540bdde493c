// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the streaming pipeline
//!
//! Capture, encoder and segmentation are replaced with in-process doubles so
//! the controller can run without devices or ffmpeg.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use vidmask::backends::camera::{CaptureFormat, Frame, FrameSource, Framerate, PixelFormat};
use vidmask::backends::virtual_camera::{SinkLauncher, SinkProcess, StreamGeometry};
use vidmask::errors::{BackendError, BackendResult, SegmentationError};
use vidmask::media::mask::Mask;
use vidmask::media::segmentation::{FullForegroundSegmenter, Segmenter};
use vidmask::pipelines::stream::{CompositionParams, StreamBackend};
use vidmask::{ControllerState, LiveParams, PipelineController, PipelineError};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Repeats one frame, with a short delay per read
struct RepeatingSource {
    frame: Frame,
    sequence: u64,
    /// Every n-th read reports a malformed frame
    malformed_every: Option<u64>,
}

impl FrameSource for RepeatingSource {
    fn negotiated(&self) -> CaptureFormat {
        CaptureFormat {
            width: self.frame.width,
            height: self.frame.height,
            framerate: Some(Framerate::from_int(20)),
            pixel_format: PixelFormat::Rgb24,
        }
    }

    fn read_frame(&mut self) -> BackendResult<Frame> {
        std::thread::sleep(Duration::from_millis(2));
        self.sequence += 1;
        if self.malformed_every.is_some_and(|n| self.sequence % n == 0) {
            return Err(BackendError::MalformedFrame("truncated buffer".to_string()));
        }
        let mut frame = self.frame.clone();
        frame.sequence = self.sequence;
        Ok(frame)
    }
}

/// Everything the fake encoder saw
#[derive(Default)]
struct SinkLog {
    launches: Vec<StreamGeometry>,
    frames: Vec<Vec<u8>>,
    finished: usize,
    /// Per sink, indexed by launch order
    closed: Vec<bool>,
    writes_after_close: usize,
}

struct RecordingSink {
    id: usize,
    log: Arc<Mutex<SinkLog>>,
    fail_after: Option<usize>,
    written: usize,
}

impl SinkProcess for RecordingSink {
    fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder exited"));
        }
        self.written += 1;
        let mut log = self.log.lock().unwrap();
        if log.closed[self.id] {
            log.writes_after_close += 1;
        }
        log.frames.push(data.to_vec());
        Ok(())
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut log = self.log.lock().unwrap();
        log.closed[self.id] = true;
        log.finished += 1;
        Ok(())
    }
}

struct RecordingLauncher {
    log: Arc<Mutex<SinkLog>>,
    fail_after: Option<usize>,
}

impl SinkLauncher for RecordingLauncher {
    fn launch(&self, geometry: &StreamGeometry) -> BackendResult<Box<dyn SinkProcess>> {
        let mut log = self.log.lock().unwrap();
        let id = log.launches.len();
        log.launches.push(*geometry);
        log.closed.push(false);
        Ok(Box::new(RecordingSink {
            id,
            log: Arc::clone(&self.log),
            fail_after: self.fail_after,
            written: 0,
        }))
    }
}

struct BrokenSegmenter;

impl Segmenter for BrokenSegmenter {
    fn name(&self) -> &str {
        "broken"
    }

    fn segment(&mut self, _frame: &Frame) -> Result<Mask, SegmentationError> {
        Err(SegmentationError::Inference("model crashed".to_string()))
    }
}

struct TestBackend {
    frame: Frame,
    log: Arc<Mutex<SinkLog>>,
    fail_after: Option<usize>,
    broken_segmenter: bool,
    malformed_every: Option<u64>,
}

impl TestBackend {
    fn new(frame: Frame) -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let backend = Self {
            frame,
            log: Arc::clone(&log),
            fail_after: None,
            broken_segmenter: false,
            malformed_every: None,
        };
        (backend, log)
    }
}

impl StreamBackend for TestBackend {
    fn open_source(&mut self, _params: &CompositionParams) -> BackendResult<Box<dyn FrameSource>> {
        Ok(Box::new(RepeatingSource {
            frame: self.frame.clone(),
            sequence: 0,
            malformed_every: self.malformed_every,
        }))
    }

    fn launcher(&mut self) -> Box<dyn SinkLauncher> {
        Box::new(RecordingLauncher {
            log: Arc::clone(&self.log),
            fail_after: self.fail_after,
        })
    }

    fn segmenter(&mut self) -> Result<Box<dyn Segmenter>, SegmentationError> {
        if self.broken_segmenter {
            Ok(Box::new(BrokenSegmenter))
        } else {
            Ok(Box::new(FullForegroundSegmenter))
        }
    }
}

/// Frame with a horizontal and vertical gradient so misplacement shows up
fn gradient_frame(width: u32, height: u32) -> Frame {
    let mut frame = Frame::black(width, height);
    for y in 0..height {
        for x in 0..width {
            frame.set_pixel(x, y, [(x % 256) as u8, (y % 256) as u8, 128]);
        }
    }
    frame
}

/// Write a solid-colour PNG background
fn background_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "vidmask-bg-{}-{}.png",
        name,
        std::process::id()
    ));
    let image = image::RgbImage::from_pixel(64, 36, image::Rgb([0, 0, 255]));
    image.save(&path).unwrap();
    path
}

fn params(width: u32, height: u32, background: Option<PathBuf>) -> Arc<LiveParams> {
    Arc::new(LiveParams::new(CompositionParams {
        width,
        height,
        background,
        ..CompositionParams::default()
    }))
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < TIMEOUT, "timed out waiting for pipeline");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_full_foreground_passes_frames_through() {
    let input = gradient_frame(1280, 720);
    let (backend, log) = TestBackend::new(input.clone());
    let background = background_file("passthrough");
    let mut controller = PipelineController::new(
        Box::new(backend),
        params(1280, 720, Some(background.clone())),
    );

    controller.start().unwrap();
    assert_eq!(controller.state(), ControllerState::Running);
    wait_until(|| log.lock().unwrap().frames.len() >= 3);
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    assert_eq!(controller.state(), ControllerState::Idle);
    let log = log.lock().unwrap();
    assert_eq!(log.launches.len(), 1);
    assert_eq!(log.finished, 1, "Encoder closed on stop");
    for frame in &log.frames {
        assert!(frame.as_slice() == input.as_bytes(), "Output differs from input");
    }
    assert!(controller.stats().frames_processed >= 3);
}

#[test]
fn test_resolution_change_restarts_encoder_once() {
    let (backend, log) = TestBackend::new(gradient_frame(640, 480));
    let background = background_file("restart");
    let live = params(640, 480, Some(background.clone()));
    let mut controller = PipelineController::new(Box::new(backend), Arc::clone(&live));

    controller.start().unwrap();
    wait_until(|| !log.lock().unwrap().frames.is_empty());

    live.update(|p| {
        p.width = 1280;
        p.height = 720;
    });
    wait_until(|| {
        log.lock()
            .unwrap()
            .frames
            .last()
            .is_some_and(|f| f.len() == 1280 * 720 * 3)
    });
    // A few more frames at the new size must not cause further restarts
    let seen = log.lock().unwrap().frames.len();
    wait_until(|| log.lock().unwrap().frames.len() >= seen + 3);
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    let log = log.lock().unwrap();
    assert_eq!(log.launches.len(), 2);
    assert_eq!((log.launches[0].width, log.launches[0].height), (640, 480));
    assert_eq!((log.launches[1].width, log.launches[1].height), (1280, 720));
    assert_eq!(controller.stats().encoder_restarts, 1);
    assert_eq!(log.writes_after_close, 0);
}

#[test]
fn test_framerate_change_restarts_encoder_once() {
    let (backend, log) = TestBackend::new(gradient_frame(64, 48));
    let background = background_file("fps");
    let live = Arc::new(LiveParams::new(CompositionParams {
        width: 64,
        height: 48,
        fps: 20,
        background: Some(background.clone()),
        ..CompositionParams::default()
    }));
    let mut controller = PipelineController::new(Box::new(backend), Arc::clone(&live));

    controller.start().unwrap();
    wait_until(|| !log.lock().unwrap().frames.is_empty());

    live.update(|p| p.fps = 30);
    wait_until(|| log.lock().unwrap().launches.len() == 2);
    let seen = log.lock().unwrap().frames.len();
    wait_until(|| log.lock().unwrap().frames.len() >= seen + 3);
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    let log = log.lock().unwrap();
    let rates: Vec<Framerate> = log.launches.iter().map(|g| g.fps).collect();
    assert_eq!(rates, vec![Framerate::from_int(20), Framerate::from_int(30)]);
    assert!(log.launches.iter().all(|g| (g.width, g.height) == (64, 48)));
    assert_eq!(log.closed, vec![true, true]);
    assert_eq!(log.writes_after_close, 0);
    assert_eq!(controller.stats().encoder_restarts, 1);
}

#[test]
fn test_malformed_frames_are_skipped() {
    let input = gradient_frame(64, 48);
    let (mut backend, log) = TestBackend::new(input.clone());
    backend.malformed_every = Some(3);
    let background = background_file("malformed");
    let mut controller =
        PipelineController::new(Box::new(backend), params(64, 48, Some(background.clone())));

    controller.start().unwrap();
    wait_until(|| log.lock().unwrap().frames.len() >= 6);
    assert!(controller.is_running());
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    assert!(controller.take_error().is_none());
    let stats = controller.stats();
    assert!(stats.frames_skipped >= 2);
    assert_eq!(stats.frames_processed, log.lock().unwrap().frames.len() as u64);
    assert_eq!(log.lock().unwrap().launches.len(), 1);
}

#[test]
fn test_unread_preview_drops_frames() {
    let (backend, log) = TestBackend::new(gradient_frame(64, 48));
    let background = background_file("preview");
    let mut controller =
        PipelineController::new(Box::new(backend), params(64, 48, Some(background.clone())));

    controller.start().unwrap();
    wait_until(|| log.lock().unwrap().frames.len() >= 5);
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    // The encoder got every frame even though the preview was full
    let stats = controller.stats();
    assert_eq!(controller.preview().len(), 2);
    assert!(stats.preview_drops >= 3);
    assert_eq!(stats.frames_processed, log.lock().unwrap().frames.len() as u64);
}

#[test]
fn test_missing_background_refuses_start() {
    let (backend, log) = TestBackend::new(gradient_frame(64, 48));
    let mut controller = PipelineController::new(Box::new(backend), params(64, 48, None));

    assert_eq!(controller.start(), Err(PipelineError::MissingBackground));
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(log.lock().unwrap().launches.is_empty());
}

#[test]
fn test_undecodable_background_refuses_start() {
    let (backend, _log) = TestBackend::new(gradient_frame(64, 48));
    let path = std::env::temp_dir().join(format!("vidmask-bg-bad-{}.png", std::process::id()));
    std::fs::write(&path, b"not an image").unwrap();
    let mut controller = PipelineController::new(Box::new(backend), params(64, 48, Some(path.clone())));

    let result = controller.start();
    std::fs::remove_file(&path).ok();
    assert!(matches!(result, Err(PipelineError::BackgroundDecode(_))));
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[test]
fn test_encoder_failure_returns_to_idle() {
    let (mut backend, log) = TestBackend::new(gradient_frame(64, 48));
    backend.fail_after = Some(2);
    let background = background_file("failure");
    let mut controller =
        PipelineController::new(Box::new(backend), params(64, 48, Some(background.clone())));

    controller.start().unwrap();
    wait_until(|| controller.state() == ControllerState::Idle);

    assert!(matches!(
        controller.take_error(),
        Some(PipelineError::Encoder(BackendError::WriteFailed(_)))
    ));
    assert_eq!(log.lock().unwrap().frames.len(), 2);
    assert_eq!(controller.stop(), Err(PipelineError::NotRunning));

    // The controller can be started again after a failure; the new
    // session's sink fails the same way, so it may already have ended
    controller.start().unwrap();
    assert_eq!(log.lock().unwrap().launches.len(), 2);
    let stopped = controller.stop();
    assert!(matches!(stopped, Ok(()) | Err(PipelineError::NotRunning)));
    assert_eq!(controller.state(), ControllerState::Idle);
    std::fs::remove_file(&background).ok();
}

#[test]
fn test_segmentation_failure_keeps_foreground() {
    let input = gradient_frame(64, 48);
    let (mut backend, log) = TestBackend::new(input.clone());
    backend.broken_segmenter = true;
    let background = background_file("segfail");
    let mut controller =
        PipelineController::new(Box::new(backend), params(64, 48, Some(background.clone())));

    controller.start().unwrap();
    wait_until(|| log.lock().unwrap().frames.len() >= 2);
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();

    assert_eq!(log.lock().unwrap().frames[0], input.as_bytes());
    assert!(controller.stats().segmentation_fallbacks >= 2);
}

#[test]
fn test_double_start_and_idle_stop() {
    let (backend, _log) = TestBackend::new(gradient_frame(64, 48));
    let background = background_file("double");
    let mut controller =
        PipelineController::new(Box::new(backend), params(64, 48, Some(background.clone())));

    assert_eq!(controller.stop(), Err(PipelineError::NotRunning));
    controller.start().unwrap();
    assert_eq!(controller.start(), Err(PipelineError::AlreadyRunning));
    controller.stop().unwrap();
    std::fs::remove_file(&background).ok();
    assert_eq!(controller.state(), ControllerState::Idle);
}

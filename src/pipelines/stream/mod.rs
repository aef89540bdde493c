// SPDX-License-Identifier: GPL-3.0-only

//! Background replacement stream
//!
//! The [`PipelineController`] owns one worker thread per streaming session.
//! Each iteration of the worker:
//!
//! ```text
//! read frame ─▶ snapshot params ─▶ restart encoder if geometry changed
//!     ─▶ segment ─▶ smooth mask ─▶ place ─▶ composite ─▶ fanout
//! ```
//!
//! Controller states: `Idle → Running → Stopping → Idle`. A fatal error in
//! the worker tears the session down and returns to `Idle`; the error is kept
//! for [`PipelineController::take_error`].

pub mod backend;
pub mod fanout;
pub mod pacer;
pub mod params;
pub mod stats;

pub use backend::{DeviceBackend, InputSource, StreamBackend};
pub use fanout::{OutputFanout, PreviewQueue, PushOutcome};
pub use pacer::FramePacer;
pub use params::{CompositionParams, LiveParams};
pub use stats::{StatsSnapshot, StreamStats};

use crate::backends::camera::{CaptureFormat, FrameSource};
use crate::backends::virtual_camera::EncoderLifecycle;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::compositor::{BackgroundImage, composite};
use crate::media::geometry::place;
use crate::media::mask::smooth;
use crate::media::segmentation::{MaskOrigin, SegmentationAdapter};
use crate::pipelines::frame_loop::{FrameLoopController, LoopAction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Pipeline controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    Stopping,
}

/// What the current session negotiated
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub capture: CaptureFormat,
    pub segmenter: String,
}

/// Starts, stops and observes streaming sessions
pub struct PipelineController {
    backend: Box<dyn StreamBackend>,
    params: Arc<LiveParams>,
    preview: Arc<PreviewQueue>,
    stats: Arc<StreamStats>,
    state: Arc<Mutex<ControllerState>>,
    last_error: Arc<Mutex<Option<PipelineError>>>,
    session: Option<SessionInfo>,
    worker: Option<FrameLoopController>,
}

impl PipelineController {
    pub fn new(backend: Box<dyn StreamBackend>, params: Arc<LiveParams>) -> Self {
        Self {
            backend,
            params,
            preview: Arc::new(PreviewQueue::default()),
            stats: Arc::new(StreamStats::new()),
            state: Arc::new(Mutex::new(ControllerState::Idle)),
            last_error: Arc::new(Mutex::new(None)),
            session: None,
            worker: None,
        }
    }

    /// Begin streaming
    ///
    /// Validates the background, opens the capture source, builds the
    /// segmenter, and starts the encoder before the worker is spawned. Any
    /// failure here is returned directly and leaves the controller `Idle`.
    pub fn start(&mut self) -> PipelineResult<()> {
        if self.state() != ControllerState::Idle {
            return Err(PipelineError::AlreadyRunning);
        }
        // Previous session ended on its own; its teardown has already run
        if let Some(mut worker) = self.worker.take() {
            let clean = worker.join();
            self.finish_worker(clean);
        }

        let params = self.params.snapshot();
        let background_path = params
            .background
            .clone()
            .ok_or(PipelineError::MissingBackground)?;
        let background = BackgroundImage::load(&background_path, params.width, params.height)?;

        let source = self
            .backend
            .open_source(&params)
            .map_err(PipelineError::Capture)?;
        let capture = source.negotiated();
        info!(capture = %capture, "Capture source opened");

        let segmentation = SegmentationAdapter::new(self.backend.segmenter()?);

        let mut encoder = EncoderLifecycle::new(self.backend.launcher());
        encoder
            .start(params.geometry())
            .map_err(PipelineError::Encoder)?;

        self.preview.clear();
        self.stats = Arc::new(StreamStats::new());
        self.session = Some(SessionInfo {
            capture,
            segmenter: segmentation.name().to_string(),
        });
        if let Some(previous) = lock(&self.last_error).take() {
            debug!(error = %previous, "Discarding error from previous session");
        }

        let session = StreamSession {
            pacer: FramePacer::new(params.fps),
            source,
            segmentation,
            fanout: OutputFanout::new(encoder, Arc::clone(&self.preview), Arc::clone(&self.stats)),
            background,
            rejected_background: None,
            params: Arc::clone(&self.params),
            stats: Arc::clone(&self.stats),
            last_error: Arc::clone(&self.last_error),
            frame_count: 0,
        };

        *lock(&self.state) = ControllerState::Running;
        let state = Arc::clone(&self.state);

        let worker = FrameLoopController::start(
            "vidmask-stream",
            session,
            StreamSession::step,
            move |session| {
                session.teardown();
                *lock(&state) = ControllerState::Idle;
            },
        );

        match worker {
            Ok(worker) => {
                info!(geometry = %params.geometry(), "Streaming started");
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                *lock(&self.state) = ControllerState::Idle;
                self.session = None;
                Err(PipelineError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Cancel the session and wait for teardown
    ///
    /// Returns `NotRunning` when no session exists. A session that already
    /// ended on its own is reaped without error.
    pub fn stop(&mut self) -> PipelineResult<()> {
        let Some(mut worker) = self.worker.take() else {
            return Err(PipelineError::NotRunning);
        };

        info!("Stopping stream");
        {
            let mut state = lock(&self.state);
            if *state == ControllerState::Running {
                *state = ControllerState::Stopping;
            }
        }

        let clean = worker.stop();
        self.finish_worker(clean);
        info!(stats = %self.stats.snapshot(), "Streaming stopped");
        Ok(())
    }

    pub fn state(&self) -> ControllerState {
        let state = *lock(&self.state);
        // A panicked worker never ran its teardown
        if state == ControllerState::Running
            && self.worker.as_ref().is_some_and(|w| !w.is_running())
        {
            return ControllerState::Idle;
        }
        state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Error that ended the last session, if any
    pub fn take_error(&mut self) -> Option<PipelineError> {
        self.reap_worker();
        lock(&self.last_error).take()
    }

    /// Queue of composited frames for display
    pub fn preview(&self) -> Arc<PreviewQueue> {
        Arc::clone(&self.preview)
    }

    pub fn params(&self) -> Arc<LiveParams> {
        Arc::clone(&self.params)
    }

    /// Details of the current or most recent session
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Join a worker that ended on its own
    fn reap_worker(&mut self) {
        if self.worker.as_ref().is_some_and(|w| !w.is_running())
            && let Some(mut worker) = self.worker.take()
        {
            let clean = worker.join();
            self.finish_worker(clean);
        }
    }

    fn finish_worker(&mut self, clean: bool) {
        if !clean {
            error!("Stream worker panicked");
            lock(&self.last_error).get_or_insert(PipelineError::WorkerPanicked);
        }
        *lock(&self.state) = ControllerState::Idle;
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// State owned by the worker thread for one session
struct StreamSession {
    source: Box<dyn FrameSource>,
    segmentation: SegmentationAdapter,
    fanout: OutputFanout,
    background: BackgroundImage,
    /// Background path that failed to decode, so it isn't retried every frame
    rejected_background: Option<PathBuf>,
    pacer: FramePacer,
    params: Arc<LiveParams>,
    stats: Arc<StreamStats>,
    last_error: Arc<Mutex<Option<PipelineError>>>,
    frame_count: u64,
}

impl StreamSession {
    fn step(&mut self) -> LoopAction {
        let frame = match self.source.read_frame().map_err(PipelineError::Capture) {
            Ok(frame) => frame,
            Err(e) if !e.is_fatal() => {
                self.stats.record_skipped();
                debug!(error = %e, "Skipping malformed frame");
                return LoopAction::Continue;
            }
            Err(e) => return self.fail(e),
        };
        let started = Instant::now();

        let params = self.params.snapshot();

        let geometry = params.geometry();
        if self.fanout.encoder().geometry() != Some(geometry) {
            match self.fanout.encoder_mut().reconfigure(geometry) {
                Ok(true) => {
                    self.stats.record_restart();
                    self.background = self.background.resized_to(geometry.width, geometry.height);
                    self.pacer.set_fps(params.fps);
                }
                Ok(false) => {}
                Err(e) => return self.fail(PipelineError::Encoder(e)),
            }
        }

        if let Some(path) = &params.background {
            self.swap_background(path, params.width, params.height);
        }

        let (mask, origin) = self.segmentation.segment(&frame);
        if origin == MaskOrigin::Fallback {
            self.stats.record_segmentation_fallback();
        }
        let mask = smooth(&mask, params.smooth_kernel, params.smooth_sigma);
        let (foreground, mask) = place(&frame, &mask, &params.placement());
        let output = composite(&foreground, &mask, self.background.frame());

        if let Err(e) = self.fanout.publish(output, params.show_preview) {
            return self.fail(PipelineError::Encoder(e));
        }

        let elapsed = started.elapsed();
        self.stats.record_processed(elapsed.as_micros() as u64);
        if self.frame_count % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = self.frame_count,
                sequence = frame.sequence,
                elapsed_us = elapsed.as_micros(),
                "Frame composited"
            );
        }
        self.frame_count += 1;

        if self.source.needs_pacing() {
            self.pacer.wait();
        }
        LoopAction::Continue
    }

    /// Replace the background when the selected file changes
    ///
    /// A file that fails to decode is logged and the current background kept.
    fn swap_background(&mut self, path: &Path, width: u32, height: u32) {
        if path == self.background.path() || self.rejected_background.as_deref() == Some(path) {
            return;
        }
        match BackgroundImage::load(path, width, height) {
            Ok(background) => {
                info!(path = %path.display(), "Background changed");
                self.background = background;
                self.rejected_background = None;
            }
            Err(e) => {
                warn!(error = %e, "Keeping previous background");
                self.rejected_background = Some(path.to_path_buf());
            }
        }
    }

    fn fail(&mut self, err: PipelineError) -> LoopAction {
        error!(error = %err, frame = self.frame_count, "Stream failed");
        *lock(&self.last_error) = Some(err);
        LoopAction::Stop
    }

    /// Flush and close the encoder, then release the capture device
    fn teardown(mut self) {
        self.fanout.close();
        drop(self.source);
        debug!(frames = self.frame_count, "Stream session torn down");
    }
}

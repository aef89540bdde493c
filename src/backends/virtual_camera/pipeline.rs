// SPDX-License-Identifier: MPL-2.0

//! Encoder subprocess for virtual camera output
//!
//! Spawns ffmpeg reading raw RGB24 frames from stdin and writing to a
//! v4l2loopback device:
//!
//! ```text
//! ffmpeg -f rawvideo -pixel_format rgb24 -video_size WxH -framerate FPS -i -
//!        -f v4l2 -pix_fmt yuv420p /dev/videoN
//! ```

use super::StreamGeometry;
use crate::errors::{BackendError, BackendResult};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A running encoder accepting raw frames
pub trait SinkProcess: Send {
    /// Write one complete frame (exactly `width * height * 3` bytes)
    fn write_frame(&mut self, data: &[u8]) -> io::Result<()>;

    /// Close the input channel and wait for the process to exit
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Creates encoder processes for a given output geometry
pub trait SinkLauncher: Send {
    fn launch(&self, geometry: &StreamGeometry) -> BackendResult<Box<dyn SinkProcess>>;
}

/// Launches ffmpeg writing to a V4L2 output device
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: String,
    output_device: String,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<String>, output_device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            output_device: output_device.into(),
        }
    }

    pub fn output_device(&self) -> &str {
        &self.output_device
    }
}

/// Build the encoder argument list for a geometry and output device
pub fn encoder_args(geometry: &StreamGeometry, output_device: &str) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgb24".into(),
        "-video_size".into(),
        format!("{}x{}", geometry.width, geometry.height),
        "-framerate".into(),
        geometry.fps.as_fraction(),
        "-i".into(),
        "-".into(),
        "-f".into(),
        "v4l2".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output_device.to_string(),
    ]
}

impl SinkLauncher for FfmpegLauncher {
    fn launch(&self, geometry: &StreamGeometry) -> BackendResult<Box<dyn SinkProcess>> {
        let args = encoder_args(geometry, &self.output_device);
        info!(
            program = %self.program,
            output = %self.output_device,
            width = geometry.width,
            height = geometry.height,
            fps = %geometry.fps,
            "Spawning encoder"
        );
        debug!(args = ?args, "Encoder arguments");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::SpawnFailed(format!("{}: {}", self.program, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            BackendError::SpawnFailed("encoder stdin was not captured".to_string())
        })?;

        // Forward encoder diagnostics into our log instead of the terminal
        if let Some(stderr) = child.stderr.take() {
            let spawned = std::thread::Builder::new()
                .name("encoder-stderr".into())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        warn!(target: "vidmask::encoder", "{}", line);
                    }
                });
            if let Err(e) = spawned {
                warn!(error = %e, "Failed to spawn encoder log reader");
            }
        }

        Ok(Box::new(FfmpegProcess {
            child,
            stdin: Some(stdin),
            frame_len: geometry.frame_len(),
        }))
    }
}

/// ffmpeg child process with its stdin pipe
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
}

impl SinkProcess for FfmpegProcess {
    fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "encoder input closed"))?;

        if data.len() != self.frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame is {} bytes, encoder expects {}", data.len(), self.frame_len),
            ));
        }

        stdin.write_all(data)?;

        let count = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
        if count % crate::constants::timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frame = count, bytes = data.len(), "Frame written to encoder");
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.close_and_wait()
    }
}

impl FfmpegProcess {
    fn close_and_wait(&mut self) -> io::Result<()> {
        // Dropping stdin sends EOF so ffmpeg flushes and exits
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                debug!(error = %e, "Encoder stdin flush failed");
            }
        } else {
            return Ok(());
        }

        let status = self.child.wait()?;
        if status.success() {
            info!("Encoder exited");
        } else {
            warn!(status = %status, "Encoder exited with error");
        }
        Ok(())
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if let Err(e) = self.close_and_wait() {
            warn!(error = %e, "Failed to reap encoder process");
        }
    }
}

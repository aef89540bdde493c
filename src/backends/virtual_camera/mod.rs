// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera output through an encoder subprocess
//!
//! Composited frames are written as raw RGB24 to an encoder process, which
//! publishes them on a v4l2loopback device that other applications (video
//! conferencing software) can open as a camera.
//!
//! # Architecture
//!
//! ```text
//! Composited Frames (RGB24)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ EncoderLifecycle │  ← Stopped → Starting → Running → Restarting
//! └──────────────────┘
//!        │ stdin
//!        ▼
//! ┌──────────────────┐
//! │ ffmpeg           │  ← rawvideo → v4l2
//! └──────────────────┘
//!        │
//!        ▼
//!   Video Apps (Zoom, Teams, etc.)
//! ```

mod pipeline;

pub use pipeline::{FfmpegLauncher, FfmpegProcess, SinkLauncher, SinkProcess, encoder_args};

use crate::backends::camera::types::{Frame, Framerate};
use crate::errors::{BackendError, BackendResult};
use tracing::{debug, info, warn};

/// Output dimensions and rate an encoder was started with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: Framerate,
}

impl StreamGeometry {
    pub fn new(width: u32, height: u32, fps: Framerate) -> Self {
        Self { width, height, fps }
    }

    /// Bytes per raw frame
    pub fn frame_len(&self) -> usize {
        Frame::byte_len(self.width, self.height)
    }
}

impl std::fmt::Display for StreamGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Encoder lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

/// Owns the encoder subprocess and restarts it on geometry changes
///
/// All transitions are synchronous. Frames offered while the state is not
/// `Running` are rejected, so nothing is ever written to a closed channel.
pub struct EncoderLifecycle {
    launcher: Box<dyn SinkLauncher>,
    sink: Option<Box<dyn SinkProcess>>,
    state: EncoderState,
    geometry: Option<StreamGeometry>,
    restarts: u64,
    frames_fed: u64,
}

impl EncoderLifecycle {
    pub fn new(launcher: Box<dyn SinkLauncher>) -> Self {
        Self {
            launcher,
            sink: None,
            state: EncoderState::Stopped,
            geometry: None,
            restarts: 0,
            frames_fed: 0,
        }
    }

    /// Spawn the encoder for the given geometry
    ///
    /// Spawn failure leaves the lifecycle `Stopped` and is returned to the caller.
    pub fn start(&mut self, geometry: StreamGeometry) -> BackendResult<()> {
        if self.state != EncoderState::Stopped {
            return Err(BackendError::InvalidState(format!(
                "encoder start requested while {:?}",
                self.state
            )));
        }

        info!(geometry = %geometry, "Starting encoder");
        self.state = EncoderState::Starting;
        self.spawn(geometry)
    }

    /// Write one frame to the encoder
    ///
    /// A write failure is fatal for the session: the sink is closed and the
    /// lifecycle returns to `Stopped`.
    pub fn feed(&mut self, frame: &Frame) -> BackendResult<()> {
        if self.state != EncoderState::Running {
            return Err(BackendError::InvalidState(format!(
                "frame offered while encoder {:?}",
                self.state
            )));
        }

        let (Some(geometry), Some(sink)) = (self.geometry, self.sink.as_mut()) else {
            return Err(BackendError::InvalidState("encoder has no sink".to_string()));
        };

        if frame.dimensions() != (geometry.width, geometry.height) {
            return Err(BackendError::FrameSizeMismatch {
                expected: (geometry.width, geometry.height),
                actual: frame.dimensions(),
            });
        }

        if let Err(e) = sink.write_frame(frame.as_bytes()) {
            warn!(error = %e, frame = self.frames_fed, "Encoder write failed, stopping encoder");
            self.shutdown_sink();
            return Err(BackendError::WriteFailed(e.to_string()));
        }

        self.frames_fed += 1;
        Ok(())
    }

    /// Restart the encoder if the geometry differs from the running one
    ///
    /// Returns `Ok(true)` when a restart cycle ran, `Ok(false)` when the
    /// geometry was unchanged.
    pub fn reconfigure(&mut self, geometry: StreamGeometry) -> BackendResult<bool> {
        if self.state != EncoderState::Running {
            return Err(BackendError::InvalidState(format!(
                "reconfigure requested while encoder {:?}",
                self.state
            )));
        }
        if self.geometry == Some(geometry) {
            return Ok(false);
        }

        info!(
            from = ?self.geometry.map(|g| g.to_string()),
            to = %geometry,
            "Restarting encoder for new geometry"
        );
        self.state = EncoderState::Restarting;
        if let Some(sink) = self.sink.take()
            && let Err(e) = sink.finish()
        {
            warn!(error = %e, "Encoder did not exit cleanly during restart");
        }

        self.restarts += 1;
        self.spawn(geometry)?;
        Ok(true)
    }

    /// Close the input channel, wait for the encoder, and go to `Stopped`
    ///
    /// Safe to call in any state.
    pub fn stop(&mut self) {
        if self.state == EncoderState::Stopped && self.sink.is_none() {
            return;
        }
        info!(frames = self.frames_fed, "Stopping encoder");
        self.shutdown_sink();
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Geometry of the running encoder
    pub fn geometry(&self) -> Option<StreamGeometry> {
        self.geometry
    }

    /// Number of completed or attempted restart cycles
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn frames_fed(&self) -> u64 {
        self.frames_fed
    }

    fn spawn(&mut self, geometry: StreamGeometry) -> BackendResult<()> {
        match self.launcher.launch(&geometry) {
            Ok(sink) => {
                self.sink = Some(sink);
                self.geometry = Some(geometry);
                self.state = EncoderState::Running;
                debug!(geometry = %geometry, "Encoder running");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Encoder spawn failed");
                self.sink = None;
                self.geometry = None;
                self.state = EncoderState::Stopped;
                Err(e)
            }
        }
    }

    fn shutdown_sink(&mut self) {
        if let Some(sink) = self.sink.take()
            && let Err(e) = sink.finish()
        {
            warn!(error = %e, "Encoder did not exit cleanly");
        }
        self.geometry = None;
        self.state = EncoderState::Stopped;
    }
}

impl Drop for EncoderLifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}

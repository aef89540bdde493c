// SPDX-License-Identifier: GPL-3.0-only

//! Per-session resources for the stream pipeline
//!
//! The controller asks a [`StreamBackend`] for a fresh capture source,
//! encoder launcher and segmenter each time a session starts.

use super::params::CompositionParams;
use crate::backends::camera::{self, FrameSource, StillImageSource};
use crate::backends::virtual_camera::{FfmpegLauncher, SinkLauncher};
use crate::errors::{BackendResult, SegmentationError};
use crate::media::segmentation::{Segmenter, SegmenterSettings, create_segmenter};
use std::path::PathBuf;

/// Creates the resources a streaming session needs
pub trait StreamBackend: Send {
    /// Open the capture source; `params` carries the requested resolution/fps
    fn open_source(&mut self, params: &CompositionParams) -> BackendResult<Box<dyn FrameSource>>;

    /// Launcher for the encoder subprocess
    fn launcher(&mut self) -> Box<dyn SinkLauncher>;

    /// Segmentation backend
    fn segmenter(&mut self) -> Result<Box<dyn Segmenter>, SegmentationError>;
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// V4L2 capture device path
    Device(String),
    /// Image file replayed as a stream
    Image(PathBuf),
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Device(path) => write!(f, "{}", path),
            InputSource::Image(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Real devices: V4L2 (or still image) in, ffmpeg out
#[derive(Debug, Clone)]
pub struct DeviceBackend {
    pub input: InputSource,
    pub output_device: String,
    pub encoder_program: String,
    pub segmentation: SegmenterSettings,
}

impl StreamBackend for DeviceBackend {
    fn open_source(&mut self, params: &CompositionParams) -> BackendResult<Box<dyn FrameSource>> {
        match &self.input {
            InputSource::Device(path) => {
                camera::open(path, params.width, params.height, params.framerate())
            }
            InputSource::Image(path) => Ok(Box::new(StillImageSource::open(
                path,
                params.width,
                params.height,
                params.framerate(),
            )?)),
        }
    }

    fn launcher(&mut self) -> Box<dyn SinkLauncher> {
        Box::new(FfmpegLauncher::new(
            self.encoder_program.clone(),
            self.output_device.clone(),
        ))
    }

    fn segmenter(&mut self) -> Result<Box<dyn Segmenter>, SegmentationError> {
        create_segmenter(&self.segmentation)
    }
}

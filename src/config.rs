// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Read from `~/.config/vidmask/config.json` (or `--config`). Every field is
//! optional in the file; missing fields take their defaults. The file is
//! never written by the application.

use crate::constants::limits::MAX_SCALE;
use crate::constants::smoothing::{DEFAULT_KERNEL, DEFAULT_SIGMA};
use crate::constants::{
    DEFAULT_ENCODER_PROGRAM, DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_INPUT_DEVICE, DEFAULT_WIDTH,
    FALLBACK_OUTPUT_DEVICE, find_v4l2loopback_device, models,
};
use crate::errors::{AppError, AppResult};
use crate::media::segmentation::{ChromaKeySegmenter, SegmenterKind, SegmenterSettings};
use crate::pipelines::stream::{CompositionParams, DeviceBackend, InputSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture device path
    pub input_device: String,
    /// Image file to stream instead of a capture device
    pub input_image: Option<PathBuf>,
    /// v4l2loopback device; detected when unset
    pub output_device: Option<String>,
    /// Background image
    pub background: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub smooth_kernel: u32,
    pub smooth_sigma: f32,
    /// Segmentation backend
    pub segmenter: SegmenterKind,
    /// 0 = general model, 1 = landscape model
    pub model_selection: u8,
    /// Directory containing the ONNX segmentation models
    pub model_dir: Option<PathBuf>,
    /// Key colour for chroma-key segmentation
    pub chroma_key: [u8; 3],
    pub chroma_tolerance: f32,
    pub show_preview: bool,
    /// Encoder binary
    pub encoder_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_device: DEFAULT_INPUT_DEVICE.to_string(),
            input_image: None,
            output_device: None,
            background: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            scale: 1.0,
            offset_x: 0.5,
            offset_y: 0.5,
            flip_horizontal: false,
            flip_vertical: false,
            smooth_kernel: DEFAULT_KERNEL,
            smooth_sigma: DEFAULT_SIGMA,
            segmenter: SegmenterKind::default(),
            model_selection: models::DEFAULT_MODEL_SELECTION,
            model_dir: None,
            chroma_key: ChromaKeySegmenter::DEFAULT_KEY,
            chroma_tolerance: ChromaKeySegmenter::DEFAULT_TOLERANCE,
            show_preview: true,
            encoder_program: DEFAULT_ENCODER_PROGRAM.to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vidmask").join("config.json"))
    }

    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing file yields defaults. An explicitly given path that doesn't
    /// exist, or any parse error, is an error.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => {
                    debug!("No config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            if explicit {
                return Err(AppError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Initial live parameters (normalized)
    pub fn composition_params(&self) -> CompositionParams {
        if self.scale > MAX_SCALE {
            warn!(scale = self.scale, max = MAX_SCALE, "Scale above maximum, clamping");
        }
        CompositionParams {
            scale: self.scale,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
            smooth_kernel: self.smooth_kernel,
            smooth_sigma: self.smooth_sigma,
            fps: self.fps,
            width: self.width,
            height: self.height,
            background: self.background.clone(),
            show_preview: self.show_preview,
        }
        .normalized()
    }

    pub fn segmenter_settings(&self) -> SegmenterSettings {
        SegmenterSettings {
            kind: self.segmenter,
            model_selection: self.model_selection,
            model_dir: self.model_dir.clone(),
            chroma_key: self.chroma_key,
            chroma_tolerance: self.chroma_tolerance,
        }
    }

    /// Capture input; an image file takes precedence over the device
    pub fn input_source(&self) -> InputSource {
        match &self.input_image {
            Some(path) => InputSource::Image(path.clone()),
            None => InputSource::Device(self.input_device.clone()),
        }
    }

    /// Device-backed session resources for this configuration
    pub fn device_backend(&self) -> DeviceBackend {
        DeviceBackend {
            input: self.input_source(),
            output_device: self.resolved_output_device(),
            encoder_program: self.encoder_program.clone(),
            segmentation: self.segmenter_settings(),
        }
    }

    /// Output device, detecting a v4l2loopback device when unset
    pub fn resolved_output_device(&self) -> String {
        if let Some(device) = &self.output_device {
            return device.clone();
        }
        match find_v4l2loopback_device() {
            Some(device) => {
                info!(device = %device, "Detected v4l2loopback device");
                device
            }
            None => {
                warn!(
                    fallback = FALLBACK_OUTPUT_DEVICE,
                    "No v4l2loopback device found, using fallback"
                );
                FALLBACK_OUTPUT_DEVICE.to_string()
            }
        }
    }
}

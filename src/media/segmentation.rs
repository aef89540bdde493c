// SPDX-License-Identifier: GPL-3.0-only

//! Person segmentation
//!
//! The model is opaque to the pipeline: anything implementing [`Segmenter`]
//! can produce masks. [`SegmentationAdapter`] wraps a segmenter and
//! guarantees a usable mask for every frame.

use super::geometry::resize_mask;
use super::mask::Mask;
use crate::backends::camera::types::{BYTES_PER_PIXEL, Frame};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::SegmentationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Produces a foreground mask for an RGB24 frame
pub trait Segmenter: Send {
    /// Short name for logs and the status bar
    fn name(&self) -> &str;

    /// Foreground probability per pixel
    ///
    /// The mask may be smaller than the frame (model resolution); the
    /// adapter resizes it.
    fn segment(&mut self, frame: &Frame) -> Result<Mask, SegmentationError>;
}

/// Which segmentation backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterKind {
    /// ONNX model when available, otherwise full foreground
    #[default]
    Auto,
    /// Every pixel is foreground
    FullForeground,
    /// Pixels close to a key colour are background
    ChromaKey,
    /// ONNX selfie segmentation model
    Onnx,
}

impl std::fmt::Display for SegmenterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmenterKind::Auto => write!(f, "auto"),
            SegmenterKind::FullForeground => write!(f, "full-foreground"),
            SegmenterKind::ChromaKey => write!(f, "chroma-key"),
            SegmenterKind::Onnx => write!(f, "onnx"),
        }
    }
}

/// Settings needed to build any segmenter
#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterSettings {
    pub kind: SegmenterKind,
    /// 0 = general model, 1 = landscape model
    pub model_selection: u8,
    /// Directory holding the ONNX model files
    pub model_dir: Option<PathBuf>,
    pub chroma_key: [u8; 3],
    pub chroma_tolerance: f32,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            kind: SegmenterKind::Auto,
            model_selection: crate::constants::models::DEFAULT_MODEL_SELECTION,
            model_dir: None,
            chroma_key: ChromaKeySegmenter::DEFAULT_KEY,
            chroma_tolerance: ChromaKeySegmenter::DEFAULT_TOLERANCE,
        }
    }
}

/// Build the segmenter described by `settings`
///
/// `Auto` never fails; an explicit `Onnx` request fails if the model or
/// runtime is unavailable.
pub fn create_segmenter(
    settings: &SegmenterSettings,
) -> Result<Box<dyn Segmenter>, SegmentationError> {
    match settings.kind {
        SegmenterKind::FullForeground => Ok(Box::new(FullForegroundSegmenter)),
        SegmenterKind::ChromaKey => Ok(Box::new(ChromaKeySegmenter::new(
            settings.chroma_key,
            settings.chroma_tolerance,
        ))),
        SegmenterKind::Onnx => create_onnx(settings),
        SegmenterKind::Auto => match create_onnx(settings) {
            Ok(segmenter) => Ok(segmenter),
            Err(e) => {
                info!(error = %e, "ONNX segmentation unavailable, treating frames as foreground");
                Ok(Box::new(FullForegroundSegmenter))
            }
        },
    }
}

#[cfg(feature = "onnx")]
fn create_onnx(settings: &SegmenterSettings) -> Result<Box<dyn Segmenter>, SegmentationError> {
    let dir = settings
        .model_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|d| d.join("vidmask").join("models")))
        .ok_or_else(|| SegmentationError::Unavailable("no model directory".to_string()))?;
    Ok(Box::new(onnx::OnnxSegmenter::new(
        &dir,
        settings.model_selection,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn create_onnx(_settings: &SegmenterSettings) -> Result<Box<dyn Segmenter>, SegmentationError> {
    Err(SegmentationError::Unavailable(
        "built without the `onnx` feature".to_string(),
    ))
}

/// Where a mask came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOrigin {
    Model,
    /// Segmentation failed; the frame is treated as fully foreground
    Fallback,
}

/// Wraps a segmenter with the per-frame failure policy
///
/// Returned masks always match the frame size. A failed inference yields an
/// all-ones mask so the raw frame passes through unchanged.
pub struct SegmentationAdapter {
    segmenter: Box<dyn Segmenter>,
    failures: u64,
}

impl SegmentationAdapter {
    pub fn new(segmenter: Box<dyn Segmenter>) -> Self {
        info!(segmenter = segmenter.name(), "Segmentation ready");
        Self {
            segmenter,
            failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.segmenter.name()
    }

    /// Number of frames that fell back to a full mask
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn segment(&mut self, frame: &Frame) -> (Mask, MaskOrigin) {
        let (width, height) = frame.dimensions();
        match self.segmenter.segment(frame) {
            Ok(mask) if mask.width > 0 && mask.height > 0 => {
                let mut mask = if mask.dimensions() != (width, height) {
                    resize_mask(&mask, width, height)
                } else {
                    mask
                };
                mask.clamp_unit();
                (mask, MaskOrigin::Model)
            }
            Ok(_) => self.fallback(frame, &SegmentationError::NoMask),
            Err(e) => self.fallback(frame, &e),
        }
    }

    fn fallback(&mut self, frame: &Frame, error: &SegmentationError) -> (Mask, MaskOrigin) {
        if self.failures % FRAME_LOG_INTERVAL == 0 {
            warn!(
                error = %error,
                failures = self.failures,
                frame = frame.sequence,
                "Segmentation failed, passing frame through"
            );
        }
        self.failures += 1;
        (Mask::full(frame.width, frame.height), MaskOrigin::Fallback)
    }
}

/// Treats every pixel as foreground
#[derive(Debug, Default, Clone, Copy)]
pub struct FullForegroundSegmenter;

impl Segmenter for FullForegroundSegmenter {
    fn name(&self) -> &str {
        "full-foreground"
    }

    fn segment(&mut self, frame: &Frame) -> Result<Mask, SegmentationError> {
        Ok(Mask::full(frame.width, frame.height))
    }
}

/// Colour-distance keyer for green screens
///
/// Distance is measured in normalized RGB space. Pixels within `tolerance`
/// of the key are background; the mask ramps to foreground over a soft band
/// of the same width.
#[derive(Debug, Clone, Copy)]
pub struct ChromaKeySegmenter {
    key: [f32; 3],
    tolerance: f32,
}

impl ChromaKeySegmenter {
    /// Broadcast chroma green
    pub const DEFAULT_KEY: [u8; 3] = [0, 177, 64];
    pub const DEFAULT_TOLERANCE: f32 = 0.25;

    pub fn new(key: [u8; 3], tolerance: f32) -> Self {
        Self {
            key: key.map(|c| c as f32 / 255.0),
            tolerance: tolerance.clamp(0.01, 1.0),
        }
    }
}

impl Segmenter for ChromaKeySegmenter {
    fn name(&self) -> &str {
        "chroma-key"
    }

    fn segment(&mut self, frame: &Frame) -> Result<Mask, SegmentationError> {
        let soft = self.tolerance;
        let data = frame
            .data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| {
                let dist = px
                    .iter()
                    .zip(self.key)
                    .map(|(&c, k)| {
                        let d = c as f32 / 255.0 - k;
                        d * d
                    })
                    .sum::<f32>()
                    .sqrt();
                ((dist - self.tolerance) / soft).clamp(0.0, 1.0)
            })
            .collect();
        Mask::from_raw(frame.width, frame.height, data).ok_or(SegmentationError::NoMask)
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    //! MediaPipe selfie segmentation via ONNX Runtime

    use super::Segmenter;
    use crate::backends::camera::types::Frame;
    use crate::constants::models::{GENERAL_MODEL, LANDSCAPE_MODEL};
    use crate::errors::SegmentationError;
    use crate::media::mask::Mask;
    use image::imageops::{self, FilterType};
    use ndarray::Array4;
    use ort::session::Session;
    use ort::value::TensorRef;
    use std::path::Path;
    use tracing::info;

    pub struct OnnxSegmenter {
        session: Session,
        input_width: u32,
        input_height: u32,
    }

    impl OnnxSegmenter {
        /// Load the general (0) or landscape (1) model from `dir`
        pub fn new(dir: &Path, model_selection: u8) -> Result<Self, SegmentationError> {
            let (file, input_width, input_height) = match model_selection {
                0 => (GENERAL_MODEL, 256, 256),
                _ => (LANDSCAPE_MODEL, 256, 144),
            };
            let path = dir.join(file);
            if !path.exists() {
                return Err(SegmentationError::Unavailable(format!(
                    "model not found: {}",
                    path.display()
                )));
            }

            info!(path = %path.display(), input_width, input_height, "Loading segmentation model");

            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(2))
                .and_then(|b| b.commit_from_file(&path))
                .map_err(|e| SegmentationError::Unavailable(e.to_string()))?;

            Ok(Self {
                session,
                input_width,
                input_height,
            })
        }

        /// NHWC float input in [0, 1]
        fn preprocess(&self, frame: &Frame) -> Result<Array4<f32>, SegmentationError> {
            let img = frame.to_rgb_image().ok_or_else(|| {
                SegmentationError::Inference("frame buffer has wrong length".to_string())
            })?;
            let resized = imageops::resize(
                &img,
                self.input_width,
                self.input_height,
                FilterType::Triangle,
            );

            let mut input = Array4::<f32>::zeros((
                1,
                self.input_height as usize,
                self.input_width as usize,
                3,
            ));
            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    input[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
                }
            }
            Ok(input)
        }
    }

    impl Segmenter for OnnxSegmenter {
        fn name(&self) -> &str {
            "onnx"
        }

        fn segment(&mut self, frame: &Frame) -> Result<Mask, SegmentationError> {
            let input = self.preprocess(frame)?;
            let tensor = TensorRef::from_array_view(input.view())
                .map_err(|e| SegmentationError::Inference(e.to_string()))?;

            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .map_err(|e| SegmentationError::Inference(e.to_string()))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| SegmentationError::Inference(e.to_string()))?;

            // Output is [1, H, W, 1]
            let dims = shape.as_ref();
            if dims.len() != 4 {
                return Err(SegmentationError::Inference(format!(
                    "expected 4D output, got {:?}",
                    dims
                )));
            }
            let height = dims[1] as u32;
            let width = dims[2] as u32;

            Mask::from_raw(width, height, data.to_vec()).ok_or(SegmentationError::NoMask)
        }
    }
}

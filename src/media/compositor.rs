// SPDX-License-Identifier: GPL-3.0-only

//! Alpha compositing against a background image
//!
//! `output = foreground * mask + background * (1 - mask)` per channel.

use super::geometry::{resize_frame, resize_mask};
use super::mask::Mask;
use crate::backends::camera::types::{BYTES_PER_PIXEL, Frame};
use crate::errors::{PipelineError, PipelineResult};
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Background image resized to the canvas
///
/// Keeps the decoded original so a canvas change re-derives from full
/// quality instead of resizing a resized image.
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    path: PathBuf,
    original: Arc<image::RgbImage>,
    frame: Frame,
}

impl BackgroundImage {
    /// Decode an image file and fit it to the canvas
    pub fn load(path: &Path, width: u32, height: u32) -> PipelineResult<Self> {
        let original = image::open(path)
            .map_err(|e| PipelineError::BackgroundDecode(format!("{}: {}", path.display(), e)))?
            .into_rgb8();

        info!(
            path = %path.display(),
            source_width = original.width(),
            source_height = original.height(),
            width,
            height,
            "Loaded background image"
        );
        Ok(Self::from_image(path, original, width, height))
    }

    /// Use an already decoded image
    pub fn from_image(path: &Path, original: image::RgbImage, width: u32, height: u32) -> Self {
        let original = Arc::new(original);
        let frame = fit(&original, width, height);
        Self {
            path: path.to_path_buf(),
            original,
            frame,
        }
    }

    /// Same background fitted to a new canvas size
    pub fn resized_to(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        debug!(width, height, "Resizing background for new canvas");
        Self {
            path: self.path.clone(),
            original: Arc::clone(&self.original),
            frame: fit(&self.original, width, height),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frame.dimensions()
    }
}

fn fit(original: &image::RgbImage, width: u32, height: u32) -> Frame {
    if original.dimensions() == (width, height) {
        return Frame::from_rgb_image(original.clone());
    }
    Frame::from_rgb_image(imageops::resize(
        original,
        width,
        height,
        FilterType::Triangle,
    ))
}

/// Blend a foreground over a background using a mask
///
/// The output has the foreground's dimensions. A mask or background of a
/// different size is resized to match first.
pub fn composite(foreground: &Frame, mask: &Mask, background: &Frame) -> Frame {
    let (width, height) = foreground.dimensions();

    let resized_mask;
    let mask = if mask.dimensions() != (width, height) {
        warn!(
            mask_width = mask.width,
            mask_height = mask.height,
            width,
            height,
            "Mask size differs from frame, resizing"
        );
        resized_mask = resize_mask(mask, width, height);
        &resized_mask
    } else {
        mask
    };

    let resized_background;
    let background = if background.dimensions() != (width, height) {
        resized_background = resize_frame(background, width, height);
        &resized_background
    } else {
        background
    };

    let mut data = Vec::with_capacity(foreground.data.len());
    for ((fg, bg), &alpha) in foreground
        .data
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(background.data.chunks_exact(BYTES_PER_PIXEL))
        .zip(&mask.data)
    {
        let alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
        for c in 0..BYTES_PER_PIXEL {
            let value = fg[c] as f32 * alpha + bg[c] as f32 * (1.0 - alpha);
            data.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }

    Frame {
        width,
        height,
        data,
        sequence: foreground.sequence,
        captured_at: foreground.captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mask_keeps_foreground() {
        let fg = Frame::filled(4, 4, [10, 200, 30]);
        let bg = Frame::filled(4, 4, [250, 0, 90]);
        let out = composite(&fg, &Mask::full(4, 4), &bg);
        assert_eq!(out.data, fg.data);
    }

    #[test]
    fn test_empty_mask_shows_background() {
        let fg = Frame::filled(4, 4, [10, 200, 30]);
        let bg = Frame::filled(4, 4, [250, 0, 90]);
        let out = composite(&fg, &Mask::empty(4, 4), &bg);
        assert_eq!(out.data, bg.data);
    }

    #[test]
    fn test_half_mask_blends() {
        let fg = Frame::filled(1, 1, [200, 0, 100]);
        let bg = Frame::filled(1, 1, [0, 200, 100]);
        let out = composite(&fg, &Mask::filled(1, 1, 0.5), &bg);
        assert_eq!(out.pixel(0, 0), [100, 100, 100]);
    }

    #[test]
    fn test_mismatched_inputs_are_resized() {
        let fg = Frame::filled(8, 6, [255, 255, 255]);
        let bg = Frame::filled(4, 3, [0, 0, 0]);
        let out = composite(&fg, &Mask::full(2, 2), &bg);
        assert_eq!(out.dimensions(), (8, 6));
        assert!(out.data.iter().all(|&c| c == 255));
    }

    #[test]
    fn test_background_resized_to_canvas() {
        let img = image::RgbImage::from_pixel(32, 16, image::Rgb([5, 6, 7]));
        let background = BackgroundImage::from_image(Path::new("bg.png"), img, 8, 4);
        assert_eq!(background.dimensions(), (8, 4));
        assert_eq!(background.frame().pixel(3, 2), [5, 6, 7]);

        let larger = background.resized_to(16, 8);
        assert_eq!(larger.dimensions(), (16, 8));
        assert_eq!(larger.path(), Path::new("bg.png"));
    }

    #[test]
    fn test_undecodable_background() {
        let result = BackgroundImage::load(Path::new("/nonexistent/bg.jpg"), 4, 4);
        assert!(matches!(result, Err(PipelineError::BackgroundDecode(_))));
    }
}

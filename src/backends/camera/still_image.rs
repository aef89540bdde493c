// SPDX-License-Identifier: GPL-3.0-only

//! Still image capture source
//!
//! Replays a single decoded image as a capture stream. Useful for testing
//! the virtual camera output without a physical device.

use super::FrameSource;
use super::types::*;
use crate::errors::{BackendError, BackendResult};
use std::path::Path;
use tracing::info;

/// Capture source that yields the same image on every read
pub struct StillImageSource {
    image: Frame,
    format: CaptureFormat,
    sequence: u64,
    remaining: Option<u64>,
}

impl StillImageSource {
    /// Load an image file and resize it to the requested dimensions
    pub fn open(path: &Path, width: u32, height: u32, fps: Framerate) -> BackendResult<Self> {
        let img = image::open(path)
            .map_err(|e| BackendError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?
            .into_rgb8();

        let img = if img.dimensions() != (width, height) {
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        info!(path = %path.display(), width, height, fps = %fps, "Opened still image source");
        Ok(Self::from_frame(Frame::from_rgb_image(img), fps))
    }

    /// Replay an in-memory frame
    pub fn from_frame(frame: Frame, fps: Framerate) -> Self {
        let format = CaptureFormat {
            width: frame.width,
            height: frame.height,
            framerate: Some(fps),
            pixel_format: PixelFormat::Rgb24,
        };
        Self {
            image: frame,
            format,
            sequence: 0,
            remaining: None,
        }
    }

    /// End the stream after `frames` reads
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl FrameSource for StillImageSource {
    fn negotiated(&self) -> CaptureFormat {
        self.format
    }

    fn read_frame(&mut self) -> BackendResult<Frame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(BackendError::EndOfStream);
            }
            *remaining -= 1;
        }

        let mut frame = self.image.clone();
        frame.sequence = self.sequence;
        frame.captured_at = std::time::Instant::now();
        self.sequence += 1;
        Ok(frame)
    }

    fn needs_pacing(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_limit_ends_stream() {
        let mut source =
            StillImageSource::from_frame(Frame::filled(4, 2, [1, 2, 3]), Framerate::from_int(20))
                .with_frame_limit(2);

        assert_eq!(source.read_frame().unwrap().sequence, 0);
        assert_eq!(source.read_frame().unwrap().sequence, 1);
        assert_eq!(source.read_frame(), Err(BackendError::EndOfStream));
    }

    #[test]
    fn test_negotiated_matches_image() {
        let source = StillImageSource::from_frame(Frame::black(6, 4), Framerate::from_int(15));
        let format = source.negotiated();
        assert_eq!((format.width, format.height), (6, 4));
        assert_eq!(format.framerate, Some(Framerate::from_int(15)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = StillImageSource::open(
            Path::new("/nonexistent/background.png"),
            4,
            4,
            Framerate::from_int(20),
        );
        assert!(matches!(result, Err(BackendError::DeviceUnavailable(_))));
    }
}

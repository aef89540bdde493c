// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture sources

//! Shared types for capture sources

use crate::errors::{BackendError, BackendResult};
use std::time::Instant;

/// Bytes per pixel of the pipeline's frame layout (RGB24)
pub const BYTES_PER_PIXEL: usize = 3;

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Create a framerate from a V4L2 frame interval (seconds per frame)
    pub fn from_interval(numerator: u32, denominator: u32) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        Some(Self::new(denominator, numerator))
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Get the rounded integer framerate
    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }

    /// Format as an encoder fraction argument (e.g., "60000/1001")
    pub fn as_fraction(&self) -> String {
        format!("{}/{}", self.num, self.denom)
    }

    /// Duration of a single frame, `None` for a zero framerate
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.num == 0 {
            return None;
        }
        Some(std::time::Duration::from_secs_f64(
            self.denom as f64 / self.num as f64,
        ))
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fps = self.as_f64();
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", fps)
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 20, denom: 1 }
    }
}

/// Pixel formats a capture device may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Motion JPEG, decoded on the CPU
    Mjpeg,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    Yuyv,
    /// RGB24 - 3 bytes per pixel, the pipeline's native layout
    Rgb24,
}

impl PixelFormat {
    /// Negotiation order: MJPG keeps USB bandwidth low at 720p and above
    pub const PREFERENCE: [PixelFormat; 3] =
        [PixelFormat::Mjpeg, PixelFormat::Yuyv, PixelFormat::Rgb24];

    /// V4L2 FourCC code
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Mjpeg => b"MJPG",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Rgb24 => b"RGB3",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.fourcc()))
    }
}

/// Format actually negotiated with a capture source
///
/// The requested resolution is only a hint; this is what the device agreed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
    pub pixel_format: PixelFormat,
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(fps) = &self.framerate {
            write!(
                f,
                "{}x{} @ {}fps ({})",
                self.width, self.height, fps, self.pixel_format
            )
        } else {
            write!(f, "{}x{} ({})", self.width, self.height, self.pixel_format)
        }
    }
}

/// A single RGB24 frame
///
/// Rows are tightly packed (stride = width * 3). Each pipeline stage produces
/// a new frame rather than mutating its input.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// RGB24 pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Capture sequence number
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl Frame {
    /// Create a frame from RGB24 bytes, validating the buffer length
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> BackendResult<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(BackendError::MalformedFrame(format!(
                "{} bytes for {}x{} RGB24 (expected {})",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    /// Create a frame filled with a single color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Create a zero-filled (black) frame
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; Self::byte_len(width, height)],
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Size in bytes of a tightly packed RGB24 frame
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    /// Dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGB24 bytes in display order
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Set the RGB value at (x, y)
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[idx..idx + BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }

    /// Build a frame from a decoded image
    pub fn from_rgb_image(image: image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    /// Borrow as an `image` buffer (copies the pixel data)
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Keep capture metadata from another frame (used when a stage builds a new buffer)
    pub fn with_metadata_of(mut self, other: &Frame) -> Self {
        self.sequence = other.sequence;
        self.captured_at = other.captured_at;
        self
    }
}

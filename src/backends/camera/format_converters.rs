// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for capture buffers
//!
//! Every capture format is converted to tightly packed RGB24 before it
//! enters the pipeline.

use super::types::{BYTES_PER_PIXEL, Frame, PixelFormat};
use crate::errors::{BackendError, BackendResult};

/// Convert a raw capture buffer to an RGB24 frame
pub fn to_rgb_frame(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> BackendResult<Frame> {
    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data, width, height),
        PixelFormat::Yuyv => {
            let rgb = yuyv_to_rgb(data, width, height)?;
            Frame::new(width, height, rgb)
        }
        PixelFormat::Rgb24 => Frame::new(width, height, unpad_rgb24(data, width, height)?),
    }
}

/// Convert YUYV (YUV 4:2:2) to RGB24
///
/// YUYV format: Y0 U Y1 V - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> BackendResult<Vec<u8>> {
    let pixel_count = width as usize * height as usize;
    let expected = pixel_count * 2;
    if data.len() < expected {
        return Err(BackendError::MalformedFrame(format!(
            "YUYV buffer {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    let mut rgb = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);

    // YUYV: Y0 U Y1 V - processes 2 pixels at a time
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    // Odd widths leave one pixel per frame uncovered by the 2-pixel groups
    rgb.resize(pixel_count * BYTES_PER_PIXEL, 0);
    Ok(rgb)
}

/// Decode an MJPEG buffer into an RGB24 frame
///
/// Some UVC cameras emit JPEGs whose dimensions differ from the negotiated
/// format for the first few frames; those are reported as malformed.
pub fn decode_mjpeg(data: &[u8], width: u32, height: u32) -> BackendResult<Frame> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| BackendError::MalformedFrame(format!("JPEG decode: {}", e)))?
        .into_rgb8();

    if decoded.dimensions() != (width, height) {
        return Err(BackendError::MalformedFrame(format!(
            "JPEG is {}x{}, negotiated {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        )));
    }

    Ok(Frame::from_rgb_image(decoded))
}

/// Strip row padding from an RGB24 buffer
///
/// Drivers may pad each row to an aligned stride; the stride is inferred
/// from the buffer length.
fn unpad_rgb24(data: &[u8], width: u32, height: u32) -> BackendResult<Vec<u8>> {
    let row = width as usize * BYTES_PER_PIXEL;
    let rows = height as usize;
    if rows == 0 || data.len() < row * rows {
        return Err(BackendError::MalformedFrame(format!(
            "RGB24 buffer {} bytes, expected at least {}",
            data.len(),
            row * rows
        )));
    }

    let stride = data.len() / rows;
    if stride == row {
        return Ok(data[..row * rows].to_vec());
    }

    let mut packed = Vec::with_capacity(row * rows);
    for y in 0..rows {
        let start = y * stride;
        packed.extend_from_slice(&data[start..start + row]);
    }
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey() {
        // Y=128, U=V=128 is mid grey
        let data = vec![128u8; 2 * 2 * 2];
        let rgb = yuyv_to_rgb(&data, 2, 2).unwrap();
        assert_eq!(rgb.len(), 12);
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn test_yuyv_short_buffer_is_malformed() {
        let err = yuyv_to_rgb(&[0u8; 6], 2, 2).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_rgb24_stride_removed() {
        // 1x2 image with 2 bytes of row padding
        let data = vec![1, 2, 3, 0, 0, 4, 5, 6, 0, 0];
        let frame = to_rgb_frame(PixelFormat::Rgb24, &data, 1, 2).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_invalid_jpeg_is_malformed() {
        let err = decode_mjpeg(&[0xff, 0xd8, 0x00], 4, 4).unwrap_err();
        assert!(matches!(err, BackendError::MalformedFrame(_)));
    }

    #[test]
    fn test_jpeg_decodes() {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let frame = decode_mjpeg(&jpeg, 8, 8).unwrap();
        assert_eq!(frame.dimensions(), (8, 8));
        let [r, g, _] = frame.pixel(4, 4);
        assert!(r > 150 && g < 60);

        assert!(decode_mjpeg(&jpeg, 16, 16).is_err());
    }
}

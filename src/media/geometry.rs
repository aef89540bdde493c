// SPDX-License-Identifier: GPL-3.0-only

//! Foreground placement on the output canvas
//!
//! The foreground frame and its mask always move together: they are mirrored
//! by the same call, resized to the same dimensions, and copied through the
//! same clipped span.

use super::mask::Mask;
use crate::backends::camera::types::{BYTES_PER_PIXEL, Frame};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};

/// Where and how the foreground lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Canvas (output frame) size
    pub canvas: (u32, u32),
    /// Foreground size relative to the canvas
    pub scale: f32,
    /// Horizontal position of the scaled foreground, 0 = left, 1 = right
    pub offset_x: f32,
    /// Vertical position of the scaled foreground, 0 = top, 1 = bottom
    pub offset_y: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Placement {
    /// Full-canvas placement with no mirroring
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            canvas: (width, height),
            scale: 1.0,
            offset_x: 0.5,
            offset_y: 0.5,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

/// Mirror an interleaved buffer of `channels` values per pixel
fn mirror_buffer<T: Copy>(
    data: &[T],
    width: usize,
    height: usize,
    channels: usize,
    horizontal: bool,
    vertical: bool,
) -> Vec<T> {
    if !horizontal && !vertical {
        return data.to_vec();
    }

    let row_len = width * channels;
    let mut out = Vec::with_capacity(data.len());
    for y in 0..height {
        let src_y = if vertical { height - 1 - y } else { y };
        let row = &data[src_y * row_len..(src_y + 1) * row_len];
        if horizontal {
            for px in row.chunks_exact(channels).rev() {
                out.extend_from_slice(px);
            }
        } else {
            out.extend_from_slice(row);
        }
    }
    out
}

/// Mirror a foreground frame and its mask together
pub fn mirror_pair(frame: &Frame, mask: &Mask, horizontal: bool, vertical: bool) -> (Frame, Mask) {
    let data = mirror_buffer(
        &frame.data,
        frame.width as usize,
        frame.height as usize,
        BYTES_PER_PIXEL,
        horizontal,
        vertical,
    );
    let mask_data = mirror_buffer(
        &mask.data,
        mask.width as usize,
        mask.height as usize,
        1,
        horizontal,
        vertical,
    );

    let mirrored = Frame {
        width: frame.width,
        height: frame.height,
        data,
        sequence: frame.sequence,
        captured_at: frame.captured_at,
    };
    let mirrored_mask = Mask {
        width: mask.width,
        height: mask.height,
        data: mask_data,
    };
    (mirrored, mirrored_mask)
}

/// Bilinear resize of an RGB24 frame
pub fn resize_frame(frame: &Frame, width: u32, height: u32) -> Frame {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    let Some(img) = frame.to_rgb_image() else {
        return Frame::black(width, height).with_metadata_of(frame);
    };
    let resized = imageops::resize(&img, width, height, FilterType::Triangle);
    Frame::from_rgb_image(resized).with_metadata_of(frame)
}

/// Bilinear resize of a mask
pub fn resize_mask(mask: &Mask, width: u32, height: u32) -> Mask {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    let Some(img) =
        ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(mask.width, mask.height, mask.data.clone())
    else {
        return Mask::empty(width, height);
    };
    let resized = imageops::resize(&img, width, height, FilterType::Triangle);
    Mask {
        width,
        height,
        data: resized.into_raw(),
    }
}

/// Foreground size for a canvas and scale factor, never smaller than 1x1
pub fn scaled_dimensions(canvas: (u32, u32), scale: f32) -> (u32, u32) {
    let scale = scale.max(0.0) as f64;
    let w = (canvas.0 as f64 * scale).round().max(1.0) as u32;
    let h = (canvas.1 as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

/// Top-left corner of the scaled content along one axis
///
/// Negative when the content is larger than the canvas.
pub fn placement_origin(canvas: u32, scaled: u32, offset: f32) -> i64 {
    ((canvas as f64 - scaled as f64) * offset as f64).round() as i64
}

/// Overlap of a source span placed at `origin` with `0..dst_len`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    src: usize,
    dst: usize,
    len: usize,
}

fn clip_span(origin: i64, src_len: u32, dst_len: u32) -> Option<Span> {
    let start = origin.max(0);
    let end = (origin + src_len as i64).min(dst_len as i64);
    if end <= start {
        return None;
    }
    Some(Span {
        src: (start - origin) as usize,
        dst: start as usize,
        len: (end - start) as usize,
    })
}

/// Place a foreground and its mask on a zero-filled canvas
///
/// Returns canvas-sized buffers. Canvas pixels not covered by the scaled
/// foreground have mask 0, so they show the background after compositing.
pub fn place(foreground: &Frame, mask: &Mask, placement: &Placement) -> (Frame, Mask) {
    let (canvas_w, canvas_h) = placement.canvas;

    let (mirrored, mirrored_mask) = mirror_pair(
        foreground,
        mask,
        placement.flip_horizontal,
        placement.flip_vertical,
    );

    let (scaled_w, scaled_h) = scaled_dimensions(placement.canvas, placement.scale);
    let scaled = resize_frame(&mirrored, scaled_w, scaled_h);
    let scaled_mask = resize_mask(&mirrored_mask, scaled_w, scaled_h);

    let origin_x = placement_origin(canvas_w, scaled_w, placement.offset_x);
    let origin_y = placement_origin(canvas_h, scaled_h, placement.offset_y);

    // Scaled content covers the canvas exactly
    if (scaled_w, scaled_h) == (canvas_w, canvas_h) && origin_x == 0 && origin_y == 0 {
        return (scaled, scaled_mask);
    }

    let mut canvas = Frame::black(canvas_w, canvas_h).with_metadata_of(foreground);
    let mut canvas_mask = Mask::empty(canvas_w, canvas_h);

    let (Some(cols), Some(rows)) = (
        clip_span(origin_x, scaled_w, canvas_w),
        clip_span(origin_y, scaled_h, canvas_h),
    ) else {
        return (canvas, canvas_mask);
    };

    let src_stride = scaled_w as usize;
    let dst_stride = canvas_w as usize;
    for row in 0..rows.len {
        let src_row = (rows.src + row) * src_stride + cols.src;
        let dst_row = (rows.dst + row) * dst_stride + cols.dst;

        canvas.data[dst_row * BYTES_PER_PIXEL..(dst_row + cols.len) * BYTES_PER_PIXEL]
            .copy_from_slice(
                &scaled.data[src_row * BYTES_PER_PIXEL..(src_row + cols.len) * BYTES_PER_PIXEL],
            );
        canvas_mask.data[dst_row..dst_row + cols.len]
            .copy_from_slice(&scaled_mask.data[src_row..src_row + cols.len]);
    }

    (canvas, canvas_mask)
}

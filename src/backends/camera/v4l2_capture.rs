// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture using the v4l crate
//!
//! The device is opened with memory-mapped buffers. Pixel formats are tried in
//! [`PixelFormat::PREFERENCE`] order and every buffer is converted to RGB24.

use super::FrameSource;
use super::format_converters;
use super::types::*;
use crate::constants::timing::{CAPTURE_BUFFER_COUNT, FRAME_LOG_INTERVAL};
use crate::errors::{BackendError, BackendResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

/// Frame counter for rate-limited logging
static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capture source backed by a V4L2 device
pub struct V4l2Capture {
    // Declared before the device so buffers are unmapped before the fd closes
    stream: MmapStream<'static>,
    _device: Device,
    device_path: String,
    format: CaptureFormat,
}

impl V4l2Capture {
    /// Open a device and negotiate the closest format to the request
    ///
    /// The returned source reports what the driver actually accepted through
    /// [`FrameSource::negotiated`].
    pub fn open(
        device_path: &str,
        width: u32,
        height: u32,
        fps: Framerate,
    ) -> BackendResult<Self> {
        info!(device_path, width, height, fps = %fps, "Opening V4L2 capture device");

        let device = Device::with_path(device_path).map_err(|e| {
            BackendError::DeviceUnavailable(format!("{}: {}", device_path, e))
        })?;

        let current = device
            .format()
            .map_err(|e| BackendError::DeviceUnavailable(format!("query format: {}", e)))?;
        debug!(
            current_width = current.width,
            current_height = current.height,
            fourcc = ?current.fourcc,
            "Current device format"
        );

        let (negotiated, pixel_format) = negotiate_format(&device, width, height)?;

        let framerate = match device.set_params(&Parameters::with_fps(fps.as_int().max(1))) {
            Ok(params) => {
                Framerate::from_interval(params.interval.numerator, params.interval.denominator)
            }
            Err(e) => {
                warn!(error = %e, "Device rejected framerate, keeping driver default");
                device.params().ok().and_then(|params| {
                    Framerate::from_interval(
                        params.interval.numerator,
                        params.interval.denominator,
                    )
                })
            }
        };

        let format = CaptureFormat {
            width: negotiated.width,
            height: negotiated.height,
            framerate,
            pixel_format,
        };

        if (format.width, format.height) != (width, height) {
            warn!(
                requested_width = width,
                requested_height = height,
                actual_width = format.width,
                actual_height = format.height,
                "Device negotiated a different resolution"
            );
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, CAPTURE_BUFFER_COUNT)
            .map_err(|e| BackendError::DeviceUnavailable(format!("buffer stream: {}", e)))?;

        info!(format = %format, "V4L2 capture stream started");

        Ok(Self {
            stream,
            _device: device,
            device_path: device_path.to_string(),
            format,
        })
    }

    /// Path this source was opened from
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

/// Try each supported pixel format until the driver accepts one
fn negotiate_format(
    device: &Device,
    width: u32,
    height: u32,
) -> BackendResult<(v4l::Format, PixelFormat)> {
    let mut rejected = Vec::new();

    for pixel_format in PixelFormat::PREFERENCE {
        let mut format = device
            .format()
            .map_err(|e| BackendError::FormatNegotiation(format!("query format: {}", e)))?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(pixel_format.fourcc());

        match device.set_format(&format) {
            Ok(accepted) if accepted.fourcc == format.fourcc => {
                info!(
                    width = accepted.width,
                    height = accepted.height,
                    fourcc = ?accepted.fourcc,
                    "Set V4L2 format"
                );
                return Ok((accepted, pixel_format));
            }
            Ok(accepted) => {
                debug!(
                    requested = %pixel_format,
                    got = ?accepted.fourcc,
                    "Device substituted a different pixel format"
                );
                rejected.push(pixel_format.to_string());
            }
            Err(e) => {
                debug!(requested = %pixel_format, error = %e, "Device rejected pixel format");
                rejected.push(pixel_format.to_string());
            }
        }
    }

    Err(BackendError::FormatNegotiation(format!(
        "none of {} accepted",
        rejected.join(", ")
    )))
}

impl FrameSource for V4l2Capture {
    fn negotiated(&self) -> CaptureFormat {
        self.format
    }

    fn read_frame(&mut self) -> BackendResult<Frame> {
        let frame_start = Instant::now();

        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| BackendError::DeviceUnavailable(format!("capture read: {}", e)))?;

        let frame_num = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);

        // The driver reports the used length; mmap buffers may be larger
        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        let mut frame = format_converters::to_rgb_frame(
            self.format.pixel_format,
            data,
            self.format.width,
            self.format.height,
        )?;
        frame.sequence = meta.sequence as u64;
        frame.captured_at = frame_start;

        if frame_num % FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = frame_num,
                sequence = meta.sequence,
                size = data.len(),
                elapsed_us = frame_start.elapsed().as_micros(),
                "Captured frame"
            );
        }

        Ok(frame)
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Capture sources
//!
//! ```text
//! ┌──────────────────────┐
//! │  PipelineController  │
//! └──────────┬───────────┘
//!            │ read_frame()
//!            ▼
//! ┌──────────────────────┐
//! │  FrameSource trait   │  ← negotiated format is authoritative
//! └──────────┬───────────┘
//!       ┌────┴─────┐
//!       ▼          ▼
//!   ┌──────┐  ┌──────────┐
//!   │ V4L2 │  │ Still    │
//!   └──────┘  │ image    │
//!             └──────────┘
//! ```

pub mod format_converters;
pub mod still_image;
pub mod types;
pub mod v4l2_capture;

pub use still_image::StillImageSource;
pub use types::*;
pub use v4l2_capture::V4l2Capture;

use crate::constants::is_loopback_name;
use crate::errors::BackendResult;
use std::fs;
use std::path::Path;

/// A source of RGB24 frames
///
/// Implementations block in [`read_frame`](FrameSource::read_frame) until a
/// frame is available. A `MalformedFrame` error means the caller may skip and
/// read again; any other error ends the stream.
pub trait FrameSource: Send {
    /// Format the source actually delivers
    ///
    /// Downstream sizing must use this rather than the requested resolution.
    fn negotiated(&self) -> CaptureFormat;

    /// Read the next frame
    fn read_frame(&mut self) -> BackendResult<Frame>;

    /// Whether reads return immediately and the caller must keep the cadence
    fn needs_pacing(&self) -> bool {
        false
    }
}

/// Open a V4L2 capture device
///
/// `width`/`height`/`fps` are hints; see [`FrameSource::negotiated`].
pub fn open(
    device: &str,
    width: u32,
    height: u32,
    fps: Framerate,
) -> BackendResult<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Capture::open(device, width, height, fps)?))
}

/// A `/dev/video*` node and the name its driver reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub path: String,
    pub name: String,
    /// Driver name looks like v4l2loopback (or another virtual device)
    pub loopback: bool,
}

/// List video device nodes, sorted by path
///
/// Names come from sysfs; nodes without one are reported with an empty name.
pub fn enumerate_devices() -> Vec<VideoDevice> {
    let Ok(entries) = fs::read_dir("/dev") else {
        return Vec::new();
    };

    let mut devices: Vec<VideoDevice> = entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let index = file_name.strip_prefix("video")?;
            if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let sysfs = Path::new("/sys/class/video4linux")
                .join(&file_name)
                .join("name");
            let name = fs::read_to_string(sysfs)
                .map(|n| n.trim().to_string())
                .unwrap_or_default();
            Some(VideoDevice {
                path: entry.path().to_string_lossy().to_string(),
                loopback: is_loopback_name(&name),
                name,
            })
        })
        .collect();

    // Numeric order so video10 sorts after video2
    devices.sort_by_key(|d| {
        d.path
            .trim_start_matches("/dev/video")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    devices
}

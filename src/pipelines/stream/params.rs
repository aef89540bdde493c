// SPDX-License-Identifier: GPL-3.0-only

//! Live-tunable composition parameters
//!
//! The interaction surface replaces the whole [`CompositionParams`] value;
//! the worker takes one [`Arc`] snapshot per frame. Fields are never mutated
//! in place, so a frame can't observe scale from one update and offsets from
//! another.

use crate::backends::camera::types::Framerate;
use crate::backends::virtual_camera::StreamGeometry;
use crate::constants::limits::{MAX_SCALE, MIN_DIMENSION, MIN_SCALE, MIN_SIGMA};
use crate::constants::smoothing::{DEFAULT_KERNEL, DEFAULT_SIGMA};
use crate::constants::{DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::media::geometry::Placement;
use crate::media::mask::effective_kernel_size;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Snapshot of every value the pipeline reads per frame
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionParams {
    /// Foreground size relative to the canvas
    pub scale: f32,
    /// Horizontal placement, 0 = left edge, 0.5 = centered, 1 = right edge
    pub offset_x: f32,
    /// Vertical placement, 0 = top edge, 0.5 = centered, 1 = bottom edge
    pub offset_y: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Mask blur kernel size (odd, at least 3 after normalization)
    pub smooth_kernel: u32,
    /// Mask blur strength (gaussian sigma)
    pub smooth_sigma: f32,
    /// Output framerate
    pub fps: u32,
    /// Output (canvas) width
    pub width: u32,
    /// Output (canvas) height
    pub height: u32,
    /// Background image file
    pub background: Option<PathBuf>,
    /// Publish frames to the preview queue
    pub show_preview: bool,
}

impl Default for CompositionParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.5,
            offset_y: 0.5,
            flip_horizontal: false,
            flip_vertical: false,
            smooth_kernel: DEFAULT_KERNEL,
            smooth_sigma: DEFAULT_SIGMA,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            background: None,
            show_preview: true,
        }
    }
}

impl CompositionParams {
    /// Apply the silent correction rules
    ///
    /// - kernel: odd and at least 3
    /// - offsets: clamped to [0, 1]
    /// - scale: clamped to [`MIN_SCALE`, `MAX_SCALE`]
    /// - sigma: at least [`MIN_SIGMA`]
    /// - fps: at least 1
    /// - resolution: even and at least 2x2 (yuv420p output needs even sizes)
    ///
    /// Non-finite floats fall back to their defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f32, default: f32| if v.is_finite() { v } else { default };

        Self {
            scale: finite_or(self.scale, defaults.scale).clamp(MIN_SCALE, MAX_SCALE),
            offset_x: finite_or(self.offset_x, defaults.offset_x).clamp(0.0, 1.0),
            offset_y: finite_or(self.offset_y, defaults.offset_y).clamp(0.0, 1.0),
            smooth_kernel: effective_kernel_size(self.smooth_kernel),
            smooth_sigma: finite_or(self.smooth_sigma, defaults.smooth_sigma).max(MIN_SIGMA),
            fps: self.fps.max(1),
            width: even_dimension(self.width),
            height: even_dimension(self.height),
            ..self
        }
    }

    /// Canvas size
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn framerate(&self) -> Framerate {
        Framerate::from_int(self.fps)
    }

    /// Encoder geometry these parameters require
    pub fn geometry(&self) -> StreamGeometry {
        StreamGeometry::new(self.width, self.height, self.framerate())
    }

    /// Foreground placement on the canvas
    pub fn placement(&self) -> Placement {
        Placement {
            canvas: self.resolution(),
            scale: self.scale,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
        }
    }
}

fn even_dimension(value: u32) -> u32 {
    value.max(MIN_DIMENSION) & !1
}

/// Shared holder for the current parameters
///
/// Writers replace the snapshot; readers clone the `Arc`. Lock poisoning is
/// recovered since the guarded value is always a complete snapshot.
#[derive(Debug)]
pub struct LiveParams {
    current: RwLock<Arc<CompositionParams>>,
}

impl LiveParams {
    pub fn new(params: CompositionParams) -> Self {
        Self {
            current: RwLock::new(Arc::new(params.normalized())),
        }
    }

    /// Consistent view of all parameters
    pub fn snapshot(&self) -> Arc<CompositionParams> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Derive a new snapshot from the current one and publish it
    ///
    /// The result is normalized before it becomes visible.
    pub fn update<F>(&self, f: F) -> Arc<CompositionParams>
    where
        F: FnOnce(&mut CompositionParams),
    {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = CompositionParams::clone(&guard);
        f(&mut next);
        let next = Arc::new(next.normalized());
        *guard = Arc::clone(&next);
        next
    }
}

impl Default for LiveParams {
    fn default() -> Self {
        Self::new(CompositionParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_corrections() {
        let params = CompositionParams {
            scale: 0.0,
            offset_x: -0.3,
            offset_y: 1.7,
            smooth_kernel: 20,
            smooth_sigma: 0.0,
            fps: 0,
            width: 1,
            height: 721,
            ..CompositionParams::default()
        }
        .normalized();

        assert_eq!(params.scale, MIN_SCALE);
        assert_eq!(params.offset_x, 0.0);
        assert_eq!(params.offset_y, 1.0);
        assert_eq!(params.smooth_kernel, 21);
        assert_eq!(params.smooth_sigma, MIN_SIGMA);
        assert_eq!(params.fps, 1);
        assert_eq!(params.resolution(), (2, 720));
    }

    #[test]
    fn test_normalized_nan_uses_defaults() {
        let params = CompositionParams {
            scale: f32::NAN,
            offset_x: f32::INFINITY,
            ..CompositionParams::default()
        }
        .normalized();
        assert_eq!(params.scale, 1.0);
        assert_eq!(params.offset_x, 0.5);
    }

    #[test]
    fn test_defaults_already_normal() {
        let params = CompositionParams::default();
        assert_eq!(params.clone().normalized(), params);
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let live = LiveParams::default();
        let before = live.snapshot();

        live.update(|p| {
            p.scale = 1.5;
            p.offset_x = 0.25;
        });

        let after = live.snapshot();
        // Old snapshot is untouched
        assert_eq!(before.scale, 1.0);
        assert_eq!(after.scale, 1.5);
        assert_eq!(after.offset_x, 0.25);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_update_normalizes() {
        let live = LiveParams::default();
        let params = live.update(|p| p.smooth_kernel = 4);
        assert_eq!(params.smooth_kernel, 5);
    }

    #[test]
    fn test_geometry_and_placement() {
        let params = CompositionParams {
            flip_horizontal: true,
            ..CompositionParams::default()
        };
        let geometry = params.geometry();
        assert_eq!((geometry.width, geometry.height), (1280, 720));
        assert_eq!(geometry.fps, Framerate::from_int(20));
        assert!(params.placement().flip_horizontal);
    }
}

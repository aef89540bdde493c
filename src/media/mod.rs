// SPDX-License-Identifier: MPL-2.0

//! Per-frame image processing
//!
//! Each stage is a pure function of its inputs (segmentation aside, which
//! may keep model state):
//!
//! ```text
//! Frame ──▶ segmentation ──▶ mask::smooth ──▶ geometry::place ──▶ compositor
//! ```
//!
//! # Modules
//!
//! - [`segmentation`]: Segmenter trait, fallback policy, built-in segmenters
//! - [`mask`]: Mask buffer and gaussian smoothing
//! - [`geometry`]: Mirroring, scaling and clipped placement on the canvas
//! - [`compositor`]: Alpha blending and background image handling

pub mod compositor;
pub mod geometry;
pub mod mask;
pub mod segmentation;

pub use compositor::{BackgroundImage, composite};
pub use geometry::{Placement, place};
pub use mask::{Mask, effective_kernel_size, smooth};
pub use segmentation::{
    ChromaKeySegmenter, FullForegroundSegmenter, MaskOrigin, SegmentationAdapter, Segmenter,
    SegmenterKind, SegmenterSettings, create_segmenter,
};

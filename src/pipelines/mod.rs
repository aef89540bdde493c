// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! The stream pipeline runs on its own worker thread so the terminal UI (or
//! the headless CLI) never blocks on capture or encoding.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────┐     ┌──────────────────┐
//! │ Capture      │ ──▶ │  Stream Pipeline   │ ──▶ │ ffmpeg → v4l2    │
//! │ (V4L2/image) │     │  - Segmentation    │     │ loopback device  │
//! │              │     │  - Mask smoothing  │     ├──────────────────┤
//! │              │     │  - Placement       │ ──▶ │ Preview queue    │
//! │              │     │  - Compositing     │     │ (drop when full) │
//! └──────────────┘     └────────────────────┘     └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`frame_loop`]: Worker thread lifecycle
//! - [`stream`]: Pipeline controller, live parameters and output fanout

pub mod frame_loop;
pub mod stream;

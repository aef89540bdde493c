// SPDX-License-Identifier: MPL-2.0

//! Backend layer for frame capture and virtual camera output
//!
//! These are the only modules that touch external I/O: the capture device
//! and the encoder subprocess's stdin.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             Pipeline Controller              │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌─────────────┐    ┌──────────────────┐   │
//! │  │   Camera    │    │  Virtual Camera  │   │
//! │  │ (V4L2/file) │    │ (ffmpeg → v4l2)  │   │
//! │  └─────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Capture sources and pixel format conversion
//! - [`virtual_camera`]: Encoder subprocess and its lifecycle

pub mod camera;
pub mod virtual_camera;

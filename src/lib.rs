// SPDX-License-Identifier: MPL-2.0

//! vidmask - real-time background replacement for webcams
//!
//! Frames are read from a V4L2 capture device, the person is segmented from
//! the background, and the result is composited over a still image and
//! published through an encoder subprocess to a v4l2loopback device.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture sources and the virtual camera encoder
//! - [`media`]: Masks, segmentation, placement and compositing
//! - [`pipelines`]: The streaming worker and its controller
//! - [`config`]: User configuration handling
//! - [`terminal`]: Interactive terminal control surface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vidmask::{Config, LiveParams, PipelineController};
//!
//! let config = Config::load(None)?;
//! let params = Arc::new(LiveParams::new(config.composition_params()));
//! let mut controller = PipelineController::new(Box::new(config.device_backend()), params);
//! controller.start()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod terminal;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, BackendError, PipelineError, SegmentationError};
pub use pipelines::stream::{CompositionParams, ControllerState, LiveParams, PipelineController};

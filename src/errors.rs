// SPDX-License-Identifier: MPL-2.0

//! Error types for the background replacement pipeline
//!
//! Errors are split by layer:
//!
//! - [`BackendError`]: capture device and encoder subprocess boundaries
//! - [`SegmentationError`]: a single failed inference (always recoverable)
//! - [`PipelineError`]: controller lifecycle and session-fatal conditions
//! - [`AppError`]: top-level errors surfaced by the binary

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for pipeline controller operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error types for capture and encoder operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Capture device could not be opened
    DeviceUnavailable(String),
    /// Device refused every pixel format we can convert
    FormatNegotiation(String),
    /// Capture source has no more frames
    EndOfStream,
    /// A single frame could not be decoded or had the wrong size
    MalformedFrame(String),
    /// Frame geometry does not match what the encoder was started with
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Encoder subprocess could not be spawned
    SpawnFailed(String),
    /// Writing to the encoder input failed (usually a broken pipe)
    WriteFailed(String),
    /// Operation not valid in the current lifecycle state
    InvalidState(String),
    /// General I/O error
    Io(String),
}

impl BackendError {
    /// Whether the controller may skip the current frame and keep streaming
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackendError::MalformedFrame(_))
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            BackendError::FormatNegotiation(msg) => {
                write!(f, "Format negotiation failed: {}", msg)
            }
            BackendError::EndOfStream => write!(f, "Capture source ended"),
            BackendError::MalformedFrame(msg) => write!(f, "Malformed frame: {}", msg),
            BackendError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "Frame size {}x{} doesn't match encoder {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            BackendError::SpawnFailed(msg) => write!(f, "Failed to start encoder: {}", msg),
            BackendError::WriteFailed(msg) => write!(f, "Encoder write failed: {}", msg),
            BackendError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            BackendError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

/// Segmentation inference errors
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationError {
    /// Model not loaded or failed to initialize
    Unavailable(String),
    /// Inference ran but failed
    Inference(String),
    /// Inference produced no mask
    NoMask,
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentationError::Unavailable(msg) => write!(f, "Segmentation unavailable: {}", msg),
            SegmentationError::Inference(msg) => write!(f, "Inference failed: {}", msg),
            SegmentationError::NoMask => write!(f, "Segmentation returned no mask"),
        }
    }
}

impl std::error::Error for SegmentationError {}

/// Pipeline controller errors
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No background image configured
    MissingBackground,
    /// Background image could not be read or decoded
    BackgroundDecode(String),
    /// Capture device failure
    Capture(BackendError),
    /// Encoder subprocess failure
    Encoder(BackendError),
    /// Segmentation backend could not be created
    Segmentation(SegmentationError),
    /// Streaming session already running
    AlreadyRunning,
    /// No streaming session running
    NotRunning,
    /// The worker thread panicked
    WorkerPanicked,
    /// Worker thread could not be spawned
    WorkerSpawn(String),
}

impl PipelineError {
    /// Whether this error ends the streaming session
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Capture(e) => !e.is_recoverable(),
            PipelineError::AlreadyRunning | PipelineError::NotRunning => false,
            _ => true,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MissingBackground => write!(f, "No background image selected"),
            PipelineError::BackgroundDecode(msg) => {
                write!(f, "Failed to load background image: {}", msg)
            }
            PipelineError::Capture(e) => write!(f, "Capture error: {}", e),
            PipelineError::Encoder(e) => write!(f, "Encoder error: {}", e),
            PipelineError::Segmentation(e) => write!(f, "Segmentation error: {}", e),
            PipelineError::AlreadyRunning => write!(f, "Stream already running"),
            PipelineError::NotRunning => write!(f, "Stream not running"),
            PipelineError::WorkerPanicked => write!(f, "Pipeline worker panicked"),
            PipelineError::WorkerSpawn(msg) => write!(f, "Failed to spawn pipeline worker: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<SegmentationError> for PipelineError {
    fn from(err: SegmentationError) -> Self {
        PipelineError::Segmentation(err)
    }
}

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Pipeline errors
    Pipeline(PipelineError),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Pipeline(e) => write!(f, "{}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_frame_is_recoverable() {
        assert!(BackendError::MalformedFrame("short read".into()).is_recoverable());
        assert!(!BackendError::EndOfStream.is_recoverable());
        assert!(!BackendError::WriteFailed("broken pipe".into()).is_recoverable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::MissingBackground.is_fatal());
        assert!(PipelineError::Encoder(BackendError::WriteFailed("x".into())).is_fatal());
        assert!(PipelineError::Capture(BackendError::EndOfStream).is_fatal());
        assert!(!PipelineError::Capture(BackendError::MalformedFrame("x".into())).is_fatal());
        assert!(!PipelineError::AlreadyRunning.is_fatal());
    }

    #[test]
    fn test_display_mentions_dimensions() {
        let err = BackendError::FrameSizeMismatch {
            expected: (1280, 720),
            actual: (640, 480),
        };
        let msg = err.to_string();
        assert!(msg.contains("640x480"));
        assert!(msg.contains("1280x720"));
    }
}

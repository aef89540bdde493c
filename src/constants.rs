// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants


/// Default capture device
pub const DEFAULT_INPUT_DEVICE: &str = "/dev/video0";

/// Output device used when no v4l2loopback device can be detected
pub const FALLBACK_OUTPUT_DEVICE: &str = "/dev/video2";

/// Default encoder binary
pub const DEFAULT_ENCODER_PROGRAM: &str = "ffmpeg";

/// Default output resolution
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Default output framerate
pub const DEFAULT_FPS: u32 = 20;

/// Preview queue capacity (frames)
pub const PREVIEW_QUEUE_CAPACITY: usize = 2;

/// Composition parameter limits
pub mod limits {
    /// Smallest accepted foreground scale factor
    pub const MIN_SCALE: f32 = 0.05;

    /// Largest accepted foreground scale factor
    pub const MAX_SCALE: f32 = 4.0;

    /// Smallest mask smoothing kernel (must be odd)
    pub const MIN_KERNEL: u32 = 3;

    /// Largest kernel offered by interactive controls
    pub const MAX_KERNEL: u32 = 99;

    /// Smallest accepted smoothing strength (gaussian sigma)
    pub const MIN_SIGMA: f32 = 0.1;

    /// Largest smoothing strength offered by interactive controls
    pub const MAX_SIGMA: f32 = 50.0;

    /// Smallest output dimension
    pub const MIN_DIMENSION: u32 = 2;
}

/// Mask smoothing defaults
pub mod smoothing {
    /// Default blur kernel size
    pub const DEFAULT_KERNEL: u32 = 21;

    /// Default blur strength (gaussian sigma)
    pub const DEFAULT_SIGMA: f32 = 10.0;
}

/// Output presets cycled by the terminal surface
pub mod presets {
    /// Output resolutions (width, height)
    pub const RESOLUTIONS: &[(u32, u32)] = &[(640, 480), (1280, 720), (1920, 1080)];

    /// Output framerates
    pub const FRAMERATES: &[u32] = &[15, 20, 24, 30, 60];
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Number of capture buffers requested from V4L2
    pub const CAPTURE_BUFFER_COUNT: u32 = 4;

    /// Terminal input poll interval in milliseconds
    pub const UI_POLL_INTERVAL_MS: u64 = 16;
}

/// Segmentation model files
pub mod models {
    /// General-purpose selfie model (256x256 input)
    pub const GENERAL_MODEL: &str = "selfie_segmentation.onnx";

    /// Landscape selfie model (144x256 input)
    pub const LANDSCAPE_MODEL: &str = "selfie_segmentation_landscape.onnx";

    /// Default model selection (1 = landscape)
    pub const DEFAULT_MODEL_SELECTION: u8 = 1;
}

/// Find a v4l2loopback device to use as the virtual camera output
///
/// Returns the first device (by path) whose driver-reported name looks like
/// a loopback device.
pub fn find_v4l2loopback_device() -> Option<String> {
    crate::backends::camera::enumerate_devices()
        .into_iter()
        .find(|device| device.loopback)
        .map(|device| device.path)
}

/// v4l2loopback default names, or anything that calls itself a loopback/virtual device
pub fn is_loopback_name(device_name: &str) -> bool {
    let lower = device_name.to_lowercase();
    device_name.contains("Dummy video device")
        || lower.contains("loopback")
        || lower.contains("virtual")
        || device_name.contains("OBS")
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_names() {
        assert!(is_loopback_name("Dummy video device (0x0000)"));
        assert!(is_loopback_name("v4l2loopback"));
        assert!(is_loopback_name("OBS Virtual Camera"));
        assert!(!is_loopback_name("Integrated Camera: Integrated C"));
    }

    #[test]
    fn test_default_kernel_is_odd() {
        assert_eq!(smoothing::DEFAULT_KERNEL % 2, 1);
        assert!(smoothing::DEFAULT_KERNEL >= limits::MIN_KERNEL);
    }
}

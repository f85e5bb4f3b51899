//! Capture request parameters and file configuration.
//!
//! The value ranges declared here are the same ranges the node advertises
//! to the host in its input schema.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

/// Valid camera indices.
pub const DEVICE_ID_RANGE: RangeInclusive<u32> = 0..=10;
/// Valid requested widths in pixels.
pub const WIDTH_RANGE: RangeInclusive<u32> = 256..=1920;
/// Valid requested heights in pixels.
pub const HEIGHT_RANGE: RangeInclusive<u32> = 256..=1080;
/// Valid normalized brightness values.
pub const BRIGHTNESS_RANGE: RangeInclusive<f64> = 0.0..=1.0;
/// Valid exposure steps.
pub const EXPOSURE_RANGE: RangeInclusive<i32> = -10..=10;
/// Valid aperture f-numbers.
pub const APERTURE_RANGE: RangeInclusive<f64> = 1.6..=16.0;

/// Parameters for a single capture.
///
/// `seed` carries no meaning for the capture itself. Hosts that skip
/// re-execution when inputs are unchanged see a new value on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRequest {
    /// Camera device index.
    pub device_id: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Normalized brightness (0.0 to 1.0).
    pub brightness: f64,
    /// Exposure in device steps.
    pub exposure: i32,
    /// Aperture f-number.
    pub aperture: f64,
    /// Let the device control exposure.
    pub auto_exposure: bool,
    /// Let the device control focus.
    pub autofocus: bool,
    /// Let the device control white balance.
    pub auto_white_balance: bool,
    /// Inert liveness token.
    pub seed: u64,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 720,
            height: 480,
            brightness: 0.5,
            exposure: 0,
            aperture: 1.8,
            auto_exposure: true,
            autofocus: true,
            auto_white_balance: false,
            seed: 0,
        }
    }
}

impl CaptureRequest {
    /// Creates a request for the given device with default parameters.
    pub fn for_device(device_id: u32) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }

    /// Creates a default request with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates every field against its declared range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !DEVICE_ID_RANGE.contains(&self.device_id) {
            return Err(ConfigError::OutOfRange {
                field: "device_id",
                value: self.device_id.to_string(),
            });
        }
        if !WIDTH_RANGE.contains(&self.width) || !HEIGHT_RANGE.contains(&self.height) {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if !BRIGHTNESS_RANGE.contains(&self.brightness) {
            return Err(ConfigError::OutOfRange {
                field: "brightness",
                value: self.brightness.to_string(),
            });
        }
        if !EXPOSURE_RANGE.contains(&self.exposure) {
            return Err(ConfigError::OutOfRange {
                field: "exposure",
                value: self.exposure.to_string(),
            });
        }
        if !APERTURE_RANGE.contains(&self.aperture) {
            return Err(ConfigError::OutOfRange {
                field: "aperture",
                value: self.aperture.to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height outside the supported range.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// A control value outside its declared range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Offending value, formatted.
        value: String,
    },
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Device warm-up behavior applied when a handle is first opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Pause after opening, before the discarded frame.
    pub warmup_ms: u64,
    /// Pause after the discarded frame.
    pub settle_ms: u64,
    /// Frames read and thrown away while auto-exposure and focus converge.
    pub discard_frames: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 500,
            settle_ms: 500,
            discard_frames: 1,
        }
    }
}

impl SourceConfig {
    /// Configuration with no delays, for synthetic devices.
    pub fn immediate() -> Self {
        Self {
            warmup_ms: 0,
            settle_ms: 0,
            ..Default::default()
        }
    }

    /// Warm-up delay as a duration.
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Settle delay as a duration.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Output configuration for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Capture until interrupted (true) or a fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to capture if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 1,
            metrics_port: 0,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Warm-up behavior.
    #[serde(default)]
    pub source: SourceConfig,
    /// Capture settings.
    #[serde(default)]
    pub request: CaptureRequest,
    /// CLI output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.request.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request_valid() {
        let request = CaptureRequest::default();
        assert!(request.validate().is_ok());
        assert_eq!((request.width, request.height), (720, 480));
        assert!(request.auto_exposure);
        assert!(request.autofocus);
        assert!(!request.auto_white_balance);
    }

    #[test]
    fn test_small_dimensions_invalid() {
        let request = CaptureRequest::with_dimensions(128, 480);
        assert!(matches!(
            request.validate(),
            Err(ConfigError::InvalidDimensions { width: 128, .. })
        ));
    }

    #[test]
    fn test_out_of_range_fields() {
        let mut request = CaptureRequest::for_device(11);
        assert!(matches!(
            request.validate(),
            Err(ConfigError::OutOfRange { field: "device_id", .. })
        ));

        request.device_id = 0;
        request.aperture = 1.0;
        assert!(matches!(
            request.validate(),
            Err(ConfigError::OutOfRange { field: "aperture", .. })
        ));
    }

    #[test]
    fn test_seed_is_unrestricted() {
        let mut request = CaptureRequest::default();
        request.seed = u64::MAX;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [source]
            warmup_ms = 0

            [request]
            device_id = 2
            width = 640
            "#,
        )
        .unwrap();

        assert_eq!(config.source.warmup_ms, 0);
        assert_eq!(config.source.settle_ms, 500);
        assert_eq!(config.request.device_id, 2);
        assert_eq!(config.request.width, 640);
        assert_eq!(config.request.height, 480);
        assert_eq!(config.output.frame_count, 1);
    }

    #[test]
    fn test_parse_rejects_invalid_request() {
        let result = FileConfig::from_toml("[request]\nexposure = 20\n");
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange { field: "exposure", .. })
        ));
    }
}

//! Prometheus metrics exporter for capture monitoring.
//!
//! # Metrics Exposed
//!
//! ## Device Metrics
//! - `webcam_capture_device_open` - Whether a camera handle is open
//! - `webcam_capture_device_opens_total` - Camera handles opened
//! - `webcam_capture_device_releases_total` - Camera handles released
//!
//! ## Capture Metrics
//! - `webcam_capture_frames_total` - Frames returned
//! - `webcam_capture_device_unavailable_total` - Captures failed on an unavailable camera
//! - `webcam_capture_frame_read_errors_total` - Captures failed on a frame read
//! - `webcam_capture_resolution_mismatch_total` - Frames at an unrequested size
//! - `webcam_capture_rejected_controls_total` - Controls the camera refused
//! - `webcam_capture_frame_width` / `webcam_capture_frame_height` - Last frame size
//!
//! # Example
//!
//! ```no_run
//! use webcam_capture::capture::{CaptureRequest, MockOpener};
//! use webcam_capture::metrics::{MetricsRegistry, MetricsSnapshot};
//! use webcam_capture::CameraFrameSource;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let mut source = CameraFrameSource::new(MockOpener::new());
//!
//! source.capture(&CaptureRequest::default()).unwrap();
//! registry.update(&MetricsSnapshot::from_source(source.state(), source.stats()));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError, DEFAULT_PORT};

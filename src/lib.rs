//! Webcam Capture Node Library
//!
//! A single-frame webcam capture node for node-based image pipelines.
//! Each execution reads one frame from a local camera, applies the
//! requested capture controls, and returns the frame as a normalized RGB
//! tensor of shape `(1, height, width, 3)`.
//!
//! # Architecture
//!
//! ```text
//! node (host contract) → source (device lifecycle) → capture (device I/O)
//!                                   ↓
//!                          tensor (RGB, [0, 1])
//! ```
//!
//! # Design Principles
//!
//! - **One device at a time**: the handle is opened lazily and released
//!   before a different device is opened
//! - **Best-effort controls**: unsupported controls are logged, never fatal
//! - **No resizing**: frames are returned at the size the device delivers
//!
//! # Example
//!
//! ```no_run
//! use webcam_capture::{
//!     capture::{CaptureRequest, MockOpener},
//!     CameraFrameSource,
//! };
//!
//! let mut source = CameraFrameSource::new(MockOpener::new());
//! let image = source.capture(&CaptureRequest::default()).unwrap();
//!
//! assert_eq!(image.shape()[0], 1);
//! assert_eq!(image.shape()[3], 3);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod metrics;
pub mod node;
pub mod source;
pub mod tensor;

// Re-export commonly used types at crate root
pub use capture::{CaptureRequest, DeviceHandle, DeviceOpener, MockOpener, SourceConfig};
pub use node::{CachePolicy, Node, NodeInputs, NodeRegistry, NodeSchema, WebcamCaptureNode};
pub use source::{CameraFrameSource, CaptureError, DeviceState};
pub use tensor::ImageTensor;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

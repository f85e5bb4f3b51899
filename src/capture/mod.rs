//! Camera input and frame handling.
//!
//! This module provides abstractions for opening camera devices, applying
//! capture controls, and reading raw frames. Real webcams are available
//! behind the `camera` feature.

mod camera;
mod config;
mod controls;
mod frame;
#[cfg(feature = "camera")]
mod native;

pub use camera::{
    CameraError, DeviceEvent, DeviceHandle, DeviceLog, DeviceOpener, MockDevice, MockHandle,
    MockOpener,
};
pub use config::{
    CaptureRequest, ConfigError, FileConfig, OutputConfig, SourceConfig, APERTURE_RANGE,
    BRIGHTNESS_RANGE, DEVICE_ID_RANGE, EXPOSURE_RANGE, HEIGHT_RANGE, WIDTH_RANGE,
};
pub use controls::{apply_controls, CaptureControl, ControlReport, ControlValue};
pub use frame::{ChannelOrder, RawFrame};
#[cfg(feature = "camera")]
pub use native::{NokhwaHandle, NokhwaOpener};

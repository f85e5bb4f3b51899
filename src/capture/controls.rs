//! Capture controls applied to an open device before each read.
//!
//! Consumer webcams differ widely in which controls they expose, so every
//! control is set independently and a rejection never aborts a capture.

use super::{CameraError, CaptureRequest, DeviceHandle};
use std::fmt;

/// A single adjustable device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureControl {
    /// Frame width in pixels.
    Width,
    /// Frame height in pixels.
    Height,
    /// Exposure in device steps.
    Exposure,
    /// Aperture f-number.
    Aperture,
    /// Normalized brightness.
    Brightness,
    /// Automatic exposure switch.
    AutoExposure,
    /// Automatic focus switch.
    Autofocus,
    /// Automatic white balance switch.
    AutoWhiteBalance,
}

impl CaptureControl {
    /// Every control, in the order they are applied.
    pub const ALL: [CaptureControl; 8] = [
        CaptureControl::Width,
        CaptureControl::Height,
        CaptureControl::Exposure,
        CaptureControl::Aperture,
        CaptureControl::Brightness,
        CaptureControl::AutoExposure,
        CaptureControl::Autofocus,
        CaptureControl::AutoWhiteBalance,
    ];

    /// Short lowercase name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            CaptureControl::Width => "width",
            CaptureControl::Height => "height",
            CaptureControl::Exposure => "exposure",
            CaptureControl::Aperture => "aperture",
            CaptureControl::Brightness => "brightness",
            CaptureControl::AutoExposure => "auto_exposure",
            CaptureControl::Autofocus => "autofocus",
            CaptureControl::AutoWhiteBalance => "auto_white_balance",
        }
    }

    /// Reads this control's requested value out of a capture request.
    pub fn value_in(&self, request: &CaptureRequest) -> ControlValue {
        match self {
            CaptureControl::Width => ControlValue::Integer(i64::from(request.width)),
            CaptureControl::Height => ControlValue::Integer(i64::from(request.height)),
            CaptureControl::Exposure => ControlValue::Integer(i64::from(request.exposure)),
            CaptureControl::Aperture => ControlValue::Float(request.aperture),
            CaptureControl::Brightness => ControlValue::Float(request.brightness),
            CaptureControl::AutoExposure => ControlValue::Flag(request.auto_exposure),
            CaptureControl::Autofocus => ControlValue::Flag(request.autofocus),
            CaptureControl::AutoWhiteBalance => ControlValue::Flag(request.auto_white_balance),
        }
    }
}

impl fmt::Display for CaptureControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value written to a control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    /// Integer setting.
    Integer(i64),
    /// Fractional setting.
    Float(f64),
    /// On/off switch.
    Flag(bool),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Integer(v) => write!(f, "{v}"),
            ControlValue::Float(v) => write!(f, "{v}"),
            ControlValue::Flag(v) => write!(f, "{}", u8::from(*v)),
        }
    }
}

/// Outcome of applying a request's controls to a device.
#[derive(Debug, Default)]
pub struct ControlReport {
    /// Controls the device accepted.
    pub applied: Vec<CaptureControl>,
    /// Controls the device rejected, with the reason.
    pub rejected: Vec<(CaptureControl, CameraError)>,
}

impl ControlReport {
    /// Returns true if every control was accepted.
    pub fn all_applied(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Applies every control in `request` to `handle`.
///
/// Rejections are logged and collected in the report, never returned as
/// errors.
pub fn apply_controls<H: DeviceHandle + ?Sized>(
    handle: &mut H,
    request: &CaptureRequest,
) -> ControlReport {
    let mut report = ControlReport::default();

    for control in CaptureControl::ALL {
        let value = control.value_in(request);
        match handle.set_control(control, value) {
            Ok(()) => report.applied.push(control),
            Err(e) => {
                tracing::debug!(%control, %value, error = %e, "device rejected control");
                report.rejected.push((control, e));
            }
        }
    }

    if !report.all_applied() {
        tracing::warn!(
            rejected = report.rejected.len(),
            "some capture controls are not supported by this device"
        );
    }

    report
}

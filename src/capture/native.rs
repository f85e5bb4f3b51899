//! Webcam devices backed by `nokhwa`.

use super::{
    CameraError, CaptureControl, ChannelOrder, ControlValue, DeviceHandle, DeviceOpener, RawFrame,
};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraIndex, ControlValueDescription, ControlValueSetter, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tracing::{debug, info};

// V4L2 control ids without a portable nokhwa equivalent.
const V4L2_CID_EXPOSURE_AUTO: u128 = 0x009a_0901;
const V4L2_CID_FOCUS_AUTO: u128 = 0x009a_090c;
const V4L2_CID_AUTO_WHITE_BALANCE: u128 = 0x0098_090c;

// V4L2_CID_EXPOSURE_AUTO menu entries.
const EXPOSURE_MANUAL: i64 = 1;
const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// Opens local webcams through the platform's native capture API.
#[derive(Debug, Default)]
pub struct NokhwaOpener;

impl NokhwaOpener {
    /// Opener for the platform's default backend.
    pub fn new() -> Self {
        Self
    }

    /// List available webcam devices.
    pub fn list_devices() -> Result<Vec<String>, CameraError> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }
}

impl DeviceOpener for NokhwaOpener {
    type Handle = NokhwaHandle;

    fn open(&mut self, device_id: u32) -> Result<NokhwaHandle, CameraError> {
        info!(device_id, "opening webcam");

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(device_id), requested)
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let resolution = camera.resolution();
        info!(
            device_id,
            width = resolution.width(),
            height = resolution.height(),
            fps = camera.frame_rate(),
            "webcam stream opened"
        );

        Ok(NokhwaHandle { device_id, camera })
    }
}

/// Open `nokhwa` camera stream.
pub struct NokhwaHandle {
    device_id: u32,
    camera: Camera,
}

impl NokhwaHandle {
    fn set_size(
        &mut self,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<(), nokhwa::NokhwaError> {
        let current = self.camera.resolution();
        let target = Resolution::new(
            width.unwrap_or(current.width()),
            height.unwrap_or(current.height()),
        );
        if target == current {
            return Ok(());
        }
        self.camera.set_resolution(target)
    }

    /// Maps a normalized value onto the integer range the device reports
    /// for `control`, falling back to the raw float.
    fn scaled(&self, control: KnownCameraControl, normalized: f64) -> ControlValueSetter {
        match self.camera.camera_control(control).map(|c| c.description().clone()) {
            Ok(ControlValueDescription::IntegerRange { min, max, .. }) => {
                let span = (max - min) as f64;
                ControlValueSetter::Integer(min + (span * normalized).round() as i64)
            }
            _ => ControlValueSetter::Float(normalized),
        }
    }
}

impl DeviceHandle for NokhwaHandle {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn set_control(
        &mut self,
        control: CaptureControl,
        value: ControlValue,
    ) -> Result<(), CameraError> {
        let rejected = |e: nokhwa::NokhwaError| CameraError::ControlRejected {
            control,
            reason: e.to_string(),
        };

        let result = match (control, value) {
            (CaptureControl::Width, ControlValue::Integer(w)) => {
                self.set_size(u32::try_from(w).ok(), None)
            }
            (CaptureControl::Height, ControlValue::Integer(h)) => {
                self.set_size(None, u32::try_from(h).ok())
            }
            (CaptureControl::Exposure, ControlValue::Integer(v)) => self
                .camera
                .set_camera_control(KnownCameraControl::Exposure, ControlValueSetter::Integer(v)),
            (CaptureControl::Aperture, ControlValue::Float(v)) => self
                .camera
                .set_camera_control(KnownCameraControl::Iris, ControlValueSetter::Float(v)),
            (CaptureControl::Brightness, ControlValue::Float(v)) => {
                let setter = self.scaled(KnownCameraControl::Brightness, v);
                self.camera
                    .set_camera_control(KnownCameraControl::Brightness, setter)
            }
            (CaptureControl::AutoExposure, ControlValue::Flag(on)) => {
                let mode = if on {
                    EXPOSURE_APERTURE_PRIORITY
                } else {
                    EXPOSURE_MANUAL
                };
                self.camera.set_camera_control(
                    KnownCameraControl::Other(V4L2_CID_EXPOSURE_AUTO),
                    ControlValueSetter::Integer(mode),
                )
            }
            (CaptureControl::Autofocus, ControlValue::Flag(on)) => self.camera.set_camera_control(
                KnownCameraControl::Other(V4L2_CID_FOCUS_AUTO),
                ControlValueSetter::Boolean(on),
            ),
            (CaptureControl::AutoWhiteBalance, ControlValue::Flag(on)) => {
                self.camera.set_camera_control(
                    KnownCameraControl::Other(V4L2_CID_AUTO_WHITE_BALANCE),
                    ControlValueSetter::Boolean(on),
                )
            }
            (control, value) => {
                return Err(CameraError::ControlRejected {
                    control,
                    reason: format!("unexpected value {value}"),
                })
            }
        };

        result.map_err(rejected)
    }

    fn is_open(&self) -> bool {
        self.camera.is_stream_open()
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        debug!(device_id = self.device_id, width, height, "frame read");

        Ok(RawFrame::new(decoded.into_raw(), width, height, ChannelOrder::Rgb))
    }

    fn release(&mut self) {
        if self.camera.is_stream_open() {
            if let Err(e) = self.camera.stop_stream() {
                tracing::warn!(
                    device_id = self.device_id,
                    error = %e,
                    "failed to stop webcam stream"
                );
            }
        }
        info!(device_id = self.device_id, "webcam released");
    }
}

//! Lazily opened single-device frame source.
//!
//! [`CameraFrameSource`] keeps at most one device open. The handle is
//! opened on the first capture, reused while the requested device id stays
//! the same, and released before a different device is opened.

use crate::capture::{
    apply_controls, CameraError, CaptureRequest, DeviceHandle, DeviceOpener, SourceConfig,
};
use crate::tensor::ImageTensor;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that abort a capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device could not be opened or its stream is gone.
    #[error("camera {device_id} unavailable: {source}")]
    DeviceUnavailable {
        /// Requested device index.
        device_id: u32,
        /// Underlying device error.
        #[source]
        source: CameraError,
    },
    /// The device is open but produced no usable frame.
    #[error("cannot read from camera {device_id}: {reason}")]
    FrameReadError {
        /// Requested device index.
        device_id: u32,
        /// Why the frame was unusable.
        reason: String,
    },
}

/// Lifecycle state of the source's device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No handle is held.
    Closed,
    /// A handle for `device_id` is held.
    Open {
        /// Index of the open device.
        device_id: u32,
    },
}

/// Running counters describing source activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Frames successfully returned.
    pub frames_captured: u64,
    /// Device handles opened.
    pub device_opens: u64,
    /// Device handles released.
    pub device_releases: u64,
    /// Captures that failed with `DeviceUnavailable`.
    pub device_unavailable: u64,
    /// Captures that failed with `FrameReadError`.
    pub frame_read_errors: u64,
    /// Frames whose size differed from the request.
    pub resolution_mismatches: u64,
    /// Individual controls the device refused.
    pub rejected_controls: u64,
    /// Size of the last returned frame.
    pub last_resolution: Option<(u32, u32)>,
}

/// Produces normalized RGB frames from one lazily opened camera.
pub struct CameraFrameSource<O: DeviceOpener> {
    opener: O,
    config: SourceConfig,
    handle: Option<O::Handle>,
    stats: SourceStats,
}

impl<O: DeviceOpener> CameraFrameSource<O> {
    /// Creates a closed source with default warm-up behavior.
    pub fn new(opener: O) -> Self {
        Self::with_config(opener, SourceConfig::default())
    }

    /// Creates a closed source with the given warm-up behavior.
    pub fn with_config(opener: O, config: SourceConfig) -> Self {
        Self {
            opener,
            config,
            handle: None,
            stats: SourceStats::default(),
        }
    }

    /// Current handle state.
    pub fn state(&self) -> DeviceState {
        match &self.handle {
            Some(handle) => DeviceState::Open {
                device_id: handle.device_id(),
            },
            None => DeviceState::Closed,
        }
    }

    /// Id of the open device, if any.
    pub fn current_device_id(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.device_id())
    }

    /// Activity counters.
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Makes sure the device `device_id` is open and warmed up.
    ///
    /// A handle for a different device is released first. Calling this
    /// for the device that is already open does nothing.
    pub fn ensure_ready(&mut self, device_id: u32) -> Result<(), CaptureError> {
        if self.current_device_id().is_some_and(|id| id != device_id) {
            self.release();
        }
        if self.handle.is_some() {
            return Ok(());
        }

        let mut handle = self.opener.open(device_id).map_err(|source| {
            error!(device_id, error = %source, "cannot open webcam");
            CaptureError::DeviceUnavailable { device_id, source }
        })?;
        self.stats.device_opens += 1;

        // Auto-exposure and autofocus converge during warm-up.
        std::thread::sleep(self.config.warmup());
        for _ in 0..self.config.discard_frames {
            let _ = handle.read_frame();
        }
        std::thread::sleep(self.config.settle());

        self.handle = Some(handle);
        info!(device_id, "started webcam");
        Ok(())
    }

    /// Captures one frame according to `request`.
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<ImageTensor, CaptureError> {
        let result = self.capture_inner(request);
        match &result {
            Ok(_) => self.stats.frames_captured += 1,
            Err(CaptureError::DeviceUnavailable { .. }) => self.stats.device_unavailable += 1,
            Err(CaptureError::FrameReadError { .. }) => self.stats.frame_read_errors += 1,
        }
        result
    }

    fn capture_inner(&mut self, request: &CaptureRequest) -> Result<ImageTensor, CaptureError> {
        let device_id = request.device_id;
        self.ensure_ready(device_id)?;

        let handle = self
            .handle
            .as_mut()
            .ok_or(CaptureError::DeviceUnavailable {
                device_id,
                source: CameraError::NotOpen,
            })?;

        let report = apply_controls(handle, request);
        self.stats.rejected_controls += report.rejected.len() as u64;

        if !handle.is_open() {
            error!(device_id, "webcam reports closed");
            // Drop the dead handle so the next capture reopens the device.
            self.release();
            return Err(CaptureError::DeviceUnavailable {
                device_id,
                source: CameraError::NotOpen,
            });
        }

        let frame = handle.read_frame().map_err(|e| {
            error!(device_id, error = %e, "cannot read from webcam");
            CaptureError::FrameReadError {
                device_id,
                reason: e.to_string(),
            }
        })?;

        let (width, height) = (frame.width(), frame.height());
        let tensor = ImageTensor::from_frame(frame).map_err(|e| {
            error!(device_id, error = %e, "malformed frame from webcam");
            CaptureError::FrameReadError {
                device_id,
                reason: e.to_string(),
            }
        })?;

        info!(shape = ?tensor.shape(), "returning image");
        if (width, height) != (request.width, request.height) {
            warn!(
                requested_width = request.width,
                requested_height = request.height,
                width,
                height,
                "requested {}x{} but got {}x{}, the size may not be supported by this webcam",
                request.width,
                request.height,
                width,
                height
            );
            self.stats.resolution_mismatches += 1;
        }
        self.stats.last_resolution = Some((width, height));

        Ok(tensor)
    }

    /// Releases the open handle, if any.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            self.stats.device_releases += 1;
        }
    }
}

impl<O: DeviceOpener> Drop for CameraFrameSource<O> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChannelOrder, DeviceEvent, MockDevice, MockOpener};

    fn source(opener: MockOpener) -> CameraFrameSource<MockOpener> {
        CameraFrameSource::with_config(opener, SourceConfig::immediate())
    }

    #[test]
    fn test_starts_closed() {
        let source = source(MockOpener::new());
        assert_eq!(source.state(), DeviceState::Closed);
        assert_eq!(source.current_device_id(), None);
    }

    #[test]
    fn test_same_device_reuses_handle() {
        let opener = MockOpener::new();
        let log = opener.log();
        let mut source = source(opener);
        let request = CaptureRequest::default();

        source.capture(&request).unwrap();
        source.capture(&request).unwrap();

        assert_eq!(log.opens(), 1);
        assert_eq!(log.releases(), 0);
        // one warm-up discard plus two captures
        assert_eq!(log.reads(), 3);
        assert_eq!(source.stats().device_opens, 1);
        assert_eq!(source.stats().frames_captured, 2);
    }

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let opener = MockOpener::new();
        let log = opener.log();
        let mut source = source(opener);

        source.ensure_ready(4).unwrap();
        source.ensure_ready(4).unwrap();

        assert_eq!(log.opens(), 1);
        assert_eq!(source.state(), DeviceState::Open { device_id: 4 });
    }

    #[test]
    fn test_device_change_releases_before_open() {
        let opener = MockOpener::new();
        let log = opener.log();
        let mut source = source(opener);

        source.capture(&CaptureRequest::for_device(0)).unwrap();
        source.capture(&CaptureRequest::for_device(1)).unwrap();

        assert_eq!(source.current_device_id(), Some(1));
        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::Opened(0),
                DeviceEvent::Read(0),
                DeviceEvent::Read(0),
                DeviceEvent::Released(0),
                DeviceEvent::Opened(1),
                DeviceEvent::Read(1),
                DeviceEvent::Read(1),
            ]
        );
        assert_eq!(log.releases(), 1);
    }

    #[test]
    fn test_open_failure_leaves_closed() {
        let opener = MockOpener::new().with_device(2, MockDevice::default().failing_open());
        let mut source = source(opener);

        let result = source.capture(&CaptureRequest::for_device(2));

        assert!(matches!(
            result,
            Err(CaptureError::DeviceUnavailable { device_id: 2, .. })
        ));
        assert_eq!(source.state(), DeviceState::Closed);
        assert_eq!(source.stats().device_unavailable, 1);
    }

    #[test]
    fn test_open_failure_retried_next_call() {
        let opener = MockOpener::new().with_device(2, MockDevice::default().failing_opens(1));
        let log = opener.log();
        let mut source = source(opener);
        let request = CaptureRequest::for_device(2);

        assert!(matches!(
            source.capture(&request),
            Err(CaptureError::DeviceUnavailable { device_id: 2, .. })
        ));
        assert_eq!(source.state(), DeviceState::Closed);

        source.capture(&request).unwrap();

        assert_eq!(source.state(), DeviceState::Open { device_id: 2 });
        assert_eq!(log.opens(), 1);
        assert_eq!(log.releases(), 0);
        assert_eq!(source.stats().device_unavailable, 1);
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn test_open_failure_after_switch() {
        let opener = MockOpener::new().with_device(1, MockDevice::default().failing_open());
        let log = opener.log();
        let mut source = source(opener);

        source.capture(&CaptureRequest::for_device(0)).unwrap();
        assert!(source.capture(&CaptureRequest::for_device(1)).is_err());

        assert_eq!(source.state(), DeviceState::Closed);
        assert_eq!(log.releases(), 1);
    }

    #[test]
    fn test_missing_frame_is_read_error() {
        let opener = MockOpener::new().with_device(0, MockDevice::default().failing_read());
        let mut source = source(opener);

        let result = source.capture(&CaptureRequest::default());

        assert!(matches!(
            result,
            Err(CaptureError::FrameReadError { device_id: 0, .. })
        ));
        // the handle itself stays open
        assert_eq!(source.state(), DeviceState::Open { device_id: 0 });
        assert_eq!(source.stats().frame_read_errors, 1);
    }

    #[test]
    fn test_closed_stream_is_unavailable() {
        let opener = MockOpener::new().with_device(0, MockDevice::default().dropping_stream());
        let log = opener.log();
        let mut source = source(opener);

        assert!(matches!(
            source.capture(&CaptureRequest::default()),
            Err(CaptureError::DeviceUnavailable { device_id: 0, .. })
        ));
        assert_eq!(source.state(), DeviceState::Closed);
        assert_eq!(log.releases(), 1);

        // same id again: the dead handle is not reused
        assert!(matches!(
            source.capture(&CaptureRequest::default()),
            Err(CaptureError::DeviceUnavailable { device_id: 0, .. })
        ));
        assert_eq!(log.opens(), 2);
        assert_eq!(log.releases(), 2);
        assert_eq!(source.stats().device_releases, 2);
    }

    #[test]
    fn test_unsupported_resolution_is_tolerated() {
        let opener =
            MockOpener::new().with_device(0, MockDevice::default().with_resolution(640, 480));
        let mut source = source(opener);

        let tensor = source
            .capture(&CaptureRequest::with_dimensions(720, 480))
            .unwrap();

        assert_eq!(tensor.shape(), [1, 480, 640, 3]);
        assert_eq!(source.stats().resolution_mismatches, 1);
        assert_eq!(source.stats().last_resolution, Some((640, 480)));
    }

    #[test]
    fn test_requested_resolution_honored() {
        let mut source = source(MockOpener::new());

        let tensor = source
            .capture(&CaptureRequest::with_dimensions(1280, 720))
            .unwrap();

        assert_eq!(tensor.shape(), [1, 720, 1280, 3]);
        assert_eq!(source.stats().resolution_mismatches, 0);
    }

    #[test]
    fn test_normalized_output() {
        let opener = MockOpener::new()
            .with_device(0, MockDevice::default().filled(255))
            .with_device(1, MockDevice::default().filled(0));
        let mut source = source(opener);

        let bright = source.capture(&CaptureRequest::for_device(0)).unwrap();
        let dark = source.capture(&CaptureRequest::for_device(1)).unwrap();

        assert!(bright.as_array().iter().all(|&v| v == 1.0));
        assert!(dark.as_array().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_native_order_converted() {
        let opener = MockOpener::new().with_device(
            0,
            MockDevice::default()
                .with_order(ChannelOrder::Bgr)
                .with_resolution(256, 256),
        );
        let mut source = source(opener);

        let tensor = source
            .capture(&CaptureRequest::with_dimensions(256, 256))
            .unwrap();

        // mock pattern: byte i of read 1 is (i ^ 1) % 256; first pixel BGR = [1, 0, 3]
        assert_eq!(tensor.get(0, 0, 0), Some(3.0 / 255.0));
        assert_eq!(tensor.get(0, 0, 2), Some(1.0 / 255.0));
    }

    #[test]
    fn test_rejected_controls_do_not_fail() {
        let opener = MockOpener::new().with_device(
            0,
            MockDevice::default()
                .without_control(crate::capture::CaptureControl::Aperture)
                .without_control(crate::capture::CaptureControl::AutoWhiteBalance),
        );
        let mut source = source(opener);

        assert!(source.capture(&CaptureRequest::default()).is_ok());
        assert_eq!(source.stats().rejected_controls, 2);
    }

    #[test]
    fn test_release_and_drop() {
        let opener = MockOpener::new();
        let log = opener.log();
        let mut source = source(opener);

        source.ensure_ready(0).unwrap();
        source.release();
        assert_eq!(source.state(), DeviceState::Closed);
        assert_eq!(log.releases(), 1);

        source.ensure_ready(3).unwrap();
        drop(source);
        assert_eq!(log.releases(), 2);
        assert_eq!(log.events().last(), Some(&DeviceEvent::Released(3)));
    }
}

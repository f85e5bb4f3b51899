//! Camera device abstraction.
//!
//! A [`DeviceOpener`] turns a device index into an open [`DeviceHandle`].
//! Real hardware goes through the `nokhwa` backend; [`MockOpener`]
//! produces synthetic devices for tests and dry runs.

use super::{CaptureControl, ChannelOrder, ControlValue, RawFrame};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device exists at the index.
    #[error("camera device not found: {0}")]
    DeviceNotFound(u32),
    /// The device exists but could not be started.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The device refused a control value.
    #[error("control {control} rejected: {reason}")]
    ControlRejected {
        /// Control that was being set.
        control: CaptureControl,
        /// Driver message.
        reason: String,
    },
    /// No frame could be read.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// The handle was already released.
    #[error("camera not open")]
    NotOpen,
}

/// An open camera device.
pub trait DeviceHandle {
    /// Index this handle was opened for.
    fn device_id(&self) -> u32;

    /// Sets a single capture control.
    fn set_control(&mut self, control: CaptureControl, value: ControlValue)
        -> Result<(), CameraError>;

    /// Checks if the device is still delivering frames.
    fn is_open(&self) -> bool;

    /// Reads one frame, blocking until it is available.
    fn read_frame(&mut self) -> Result<RawFrame, CameraError>;

    /// Stops the device and releases its resources.
    fn release(&mut self);
}

/// Opens camera devices by index.
pub trait DeviceOpener {
    /// Handle type produced by this opener.
    type Handle: DeviceHandle;

    /// Opens the device with the given index.
    fn open(&mut self, device_id: u32) -> Result<Self::Handle, CameraError>;
}

/// Lifecycle event recorded by mock devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A handle was opened for the device.
    Opened(u32),
    /// A frame was read from the device.
    Read(u32),
    /// The device's handle was released.
    Released(u32),
}

/// Shared record of mock device events, in order.
#[derive(Debug, Clone, Default)]
pub struct DeviceLog {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl DeviceLog {
    fn lock(&self) -> MutexGuard<'_, Vec<DeviceEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: DeviceEvent) {
        self.lock().push(event);
    }

    /// Returns a copy of every event recorded so far.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.lock().clone()
    }

    /// Number of times any device was opened.
    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Opened(_)))
    }

    /// Number of frames read from any device.
    pub fn reads(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Read(_)))
    }

    /// Number of times any device was released.
    pub fn releases(&self) -> usize {
        self.count(|e| matches!(e, DeviceEvent::Released(_)))
    }

    fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| pred(e)).count()
    }
}

/// Behavior of a synthetic device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    /// Fixed resolution the device clamps every request to.
    native_resolution: Option<(u32, u32)>,
    fail_open: bool,
    /// Number of open attempts that fail before the device becomes available.
    failed_opens: u32,
    fail_read: bool,
    drops_stream: bool,
    order: ChannelOrder,
    fill: Option<u8>,
    unsupported: Vec<CaptureControl>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            native_resolution: None,
            fail_open: false,
            failed_opens: 0,
            fail_read: false,
            drops_stream: false,
            order: ChannelOrder::Bgr,
            fill: None,
            unsupported: Vec::new(),
        }
    }
}

impl MockDevice {
    /// Resolution used before any size is requested.
    pub const INITIAL_RESOLUTION: (u32, u32) = (640, 480);

    /// Device that only delivers frames at `width` x `height`.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.native_resolution = Some((width, height));
        self
    }

    /// Device that cannot be opened.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Device whose first `attempts` opens fail.
    pub fn failing_opens(mut self, attempts: u32) -> Self {
        self.failed_opens = attempts;
        self
    }

    /// Device that opens but never yields frame data.
    pub fn failing_read(mut self) -> Self {
        self.fail_read = true;
        self
    }

    /// Device whose stream reports closed after opening.
    pub fn dropping_stream(mut self) -> Self {
        self.drops_stream = true;
        self
    }

    /// Device that delivers frames in the given channel order.
    pub fn with_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    /// Device whose every sample has the value `value`.
    pub fn filled(mut self, value: u8) -> Self {
        self.fill = Some(value);
        self
    }

    /// Device that rejects `control`.
    pub fn without_control(mut self, control: CaptureControl) -> Self {
        self.unsupported.push(control);
        self
    }
}

/// Opener for synthetic devices.
///
/// Unknown indices open a default [`MockDevice`] unless the opener was
/// created with [`MockOpener::empty`].
#[derive(Debug, Clone)]
pub struct MockOpener {
    devices: HashMap<u32, MockDevice>,
    fallback: Option<MockDevice>,
    attempts: HashMap<u32, u32>,
    log: DeviceLog,
}

impl Default for MockOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOpener {
    /// Opener where every index has a default device.
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            fallback: Some(MockDevice::default()),
            attempts: HashMap::new(),
            log: DeviceLog::default(),
        }
    }

    /// Opener with no devices attached.
    pub fn empty() -> Self {
        Self {
            fallback: None,
            ..Self::new()
        }
    }

    /// Attaches a device at `device_id`.
    pub fn with_device(mut self, device_id: u32, device: MockDevice) -> Self {
        self.devices.insert(device_id, device);
        self
    }

    /// Returns the shared event log.
    pub fn log(&self) -> DeviceLog {
        self.log.clone()
    }
}

impl DeviceOpener for MockOpener {
    type Handle = MockHandle;

    fn open(&mut self, device_id: u32) -> Result<MockHandle, CameraError> {
        let device = self
            .devices
            .get(&device_id)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or(CameraError::DeviceNotFound(device_id))?;

        let attempt = self.attempts.entry(device_id).or_insert(0);
        *attempt += 1;

        if device.fail_open || *attempt <= device.failed_opens {
            return Err(CameraError::OpenFailed(format!(
                "mock device {device_id} is unavailable"
            )));
        }

        let (width, height) = device
            .native_resolution
            .unwrap_or(MockDevice::INITIAL_RESOLUTION);

        self.log.push(DeviceEvent::Opened(device_id));
        tracing::info!(device_id, "mock webcam opened");

        Ok(MockHandle {
            device_id,
            device,
            width,
            height,
            open: true,
            sequence: 0,
            log: self.log.clone(),
        })
    }
}

/// Open synthetic device.
#[derive(Debug)]
pub struct MockHandle {
    device_id: u32,
    device: MockDevice,
    width: u32,
    height: u32,
    open: bool,
    sequence: u64,
    log: DeviceLog,
}

impl DeviceHandle for MockHandle {
    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn set_control(
        &mut self,
        control: CaptureControl,
        value: ControlValue,
    ) -> Result<(), CameraError> {
        if self.device.unsupported.contains(&control) {
            return Err(CameraError::ControlRejected {
                control,
                reason: "not supported by mock device".to_string(),
            });
        }

        let size = match (control, value) {
            (CaptureControl::Width | CaptureControl::Height, ControlValue::Integer(v)) => {
                u32::try_from(v).map_err(|_| CameraError::ControlRejected {
                    control,
                    reason: format!("invalid size {v}"),
                })?
            }
            _ => return Ok(()),
        };

        // Fixed-resolution devices silently keep their native size.
        if self.device.native_resolution.is_none() {
            if control == CaptureControl::Width {
                self.width = size;
            } else {
                self.height = size;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open && !self.device.drops_stream
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        if !self.open {
            return Err(CameraError::NotOpen);
        }
        self.log.push(DeviceEvent::Read(self.device_id));

        if self.device.fail_read {
            return Err(CameraError::CaptureFailed("no frame data".to_string()));
        }

        let len = (self.width as usize) * (self.height as usize) * RawFrame::CHANNELS;
        let pixels: Vec<u8> = match self.device.fill {
            Some(value) => vec![value; len],
            // Deterministic pattern mixed with the read sequence
            None => (0..len)
                .map(|i| ((i as u64 ^ self.sequence) % 256) as u8)
                .collect(),
        };

        self.sequence += 1;
        Ok(RawFrame::new(pixels, self.width, self.height, self.device.order))
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.log.push(DeviceEvent::Released(self.device_id));
            tracing::info!(device_id = self.device_id, "mock webcam released");
        }
    }
}

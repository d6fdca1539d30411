//! Device introspection and control seam
//!
//! The dispatcher only talks to capture hardware through [`DeviceControl`].
//! Implementations exist for V4L2 devices and for the synthetic source.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;

/// Error type for device introspection and control
#[derive(Debug)]
pub enum DeviceError {
    /// No device is currently open
    NotOpen,
    /// Device node does not exist or cannot be opened
    NotFound(String),
    /// Control ID not supported by the device
    UnknownControl(u32),
    /// Value outside the control's range
    OutOfRange { id: u32, value: i32 },
    /// No acceptable capture format
    Format(String),
    /// The stream was opened but delivered no frame in time
    StartTimeout(std::time::Duration),
    /// Startup was interrupted by shutdown
    Cancelled,
    /// Driver call failed
    Io(io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotOpen => write!(f, "no device is currently open"),
            DeviceError::NotFound(path) => write!(f, "device not found: {}", path),
            DeviceError::UnknownControl(id) => write!(f, "unknown control: {}", id),
            DeviceError::OutOfRange { id, value } => {
                write!(f, "value {} out of range for control {}", value, id)
            }
            DeviceError::Format(msg) => write!(f, "format negotiation failed: {}", msg),
            DeviceError::StartTimeout(wait) => {
                write!(f, "no frame delivered within {}s", wait.as_secs())
            }
            DeviceError::Cancelled => write!(f, "capture start cancelled"),
            DeviceError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl DeviceError {
    /// Classify a failure to open the device node at `path`
    ///
    /// Only a missing node is `NotFound`; permission and busy errors keep the
    /// OS error.
    pub fn open(path: impl fmt::Display, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => DeviceError::NotFound(path.to_string()),
            _ => DeviceError::Io(e),
        }
    }
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        DeviceError::Io(e)
    }
}

/// A capture device found on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
    pub bus: String,
}

/// A pixel format the device can produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub fourcc: String,
    pub description: String,
    /// Discrete sizes, or the maximum of a stepwise range
    pub sizes: Vec<FrameSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// An adjustable device control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub minimum: i64,
    pub maximum: i64,
    pub step: u64,
    pub default: i64,
}

/// Full description of the open device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
    pub formats: Vec<FormatDescriptor>,
    pub controls: Vec<ControlDescriptor>,
}

/// Introspection and control of the capture device
///
/// Calls are short driver round-trips and are made directly from the
/// dispatcher task.
pub trait DeviceControl: Send + Sync {
    /// Enumerate capture devices on the system
    fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError>;

    /// Describe the open device
    fn device_info(&self) -> Result<DeviceInfo, DeviceError>;

    /// Controls of the open device
    fn controls(&self) -> Result<Vec<ControlDescriptor>, DeviceError>;

    /// Set a control on the open device
    fn set_control(&self, id: u32, value: i32) -> Result<(), DeviceError>;
}

/// Placeholder used when no device is open
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDevice;

impl DeviceControl for NoDevice {
    fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError> {
        Ok(Vec::new())
    }

    fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        Err(DeviceError::NotOpen)
    }

    fn controls(&self) -> Result<Vec<ControlDescriptor>, DeviceError> {
        Err(DeviceError::NotOpen)
    }

    fn set_control(&self, _id: u32, _value: i32) -> Result<(), DeviceError> {
        Err(DeviceError::NotOpen)
    }
}

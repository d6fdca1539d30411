//! Crate error type and process exit taxonomy
//!
//! Only device loss and unrecoverable infrastructure failures ever reach the
//! process exit status. Per-frame, per-viewer and per-command failures are
//! contained in their own modules and never become an [`Error`].

use std::fmt;
use std::io;
use std::process::ExitCode;

use crate::command::DeviceError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for unrecoverable failures
#[derive(Debug)]
pub enum Error {
    /// I/O failure (socket bind, stdout, ...)
    Io(io::Error),
    /// The capture source closed its frame channel mid-stream
    DeviceLost,
    /// The capture device could not be opened, configured or started
    Device(DeviceError),
    /// Invalid configuration
    Config(String),
}

impl Error {
    /// Exit status an external supervisor should observe for this error
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Error::DeviceLost | Error::Device(_) => ExitStatus::DeviceError,
            Error::Io(_) | Error::Config(_) => ExitStatus::GenericError,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::DeviceLost => write!(f, "Capture device disconnected"),
            Error::Device(e) => write!(f, "Capture device error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::Device(e)
    }
}

/// Process exit statuses
///
/// A supervisor distinguishes "restart the process" (generic error) from
/// "device unplugged, alert operator" (device error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal termination
    Normal,
    /// Unrecoverable error unrelated to the capture device
    GenericError,
    /// Capture device unavailable at startup or lost mid-stream
    DeviceError,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Normal => 0,
            ExitStatus::GenericError => 1,
            ExitStatus::DeviceError => 2,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        assert_eq!(ExitStatus::Normal.code(), 0);
        assert_eq!(ExitStatus::GenericError.code(), 1);
        assert_eq!(ExitStatus::DeviceError.code(), 2);
    }

    #[test]
    fn test_device_errors_map_to_device_status() {
        assert_eq!(Error::DeviceLost.exit_status(), ExitStatus::DeviceError);
        assert_eq!(
            Error::Device(DeviceError::NotFound("/dev/video9".into())).exit_status(),
            ExitStatus::DeviceError
        );
    }

    #[test]
    fn test_other_errors_map_to_generic_status() {
        let io = Error::Io(io::Error::new(io::ErrorKind::AddrInUse, "busy"));
        assert_eq!(io.exit_status(), ExitStatus::GenericError);
        assert_eq!(
            Error::Config("bad".into()).exit_status(),
            ExitStatus::GenericError
        );
    }
}

// Serial link error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Link error code constants
///
/// Error code range: 3001-3008
pub struct LinkErrorCodes {}

impl LinkErrorCodes {
    /// Auto-discovery found no candidate device
    pub const NO_DEVICE_FOUND: i32 = 3001;

    /// Opening the port failed
    pub const OPEN_FAILED: i32 = 3002;

    /// No valid frame arrived during the self-test window
    pub const SELF_TEST_FAILED: i32 = 3003;

    /// Operation requires an open link
    pub const NOT_CONNECTED: i32 = 3004;

    /// Reader thread already running
    pub const ALREADY_READING: i32 = 3005;

    /// Read/write failure on an open link
    pub const TRANSPORT: i32 = 3006;

    /// Reader thread could not be spawned
    pub const THREAD_SPAWN: i32 = 3007;

    /// Port enumeration failed
    pub const ENUMERATION: i32 = 3008;
}

/// Log a link error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_link_error(err: &LinkError, context: &str) {
    error!(
        "Link error in {}: code={}, component=SerialLink, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Serial link errors
///
/// These errors cover link establishment (discovery, open, self-test) and
/// terminal transport failures. They are the only link conditions surfaced
/// to the caller; malformed frames never reach this type.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Auto-discovery found no port matching the vendor/keyword filter
    NoDeviceFound,

    /// The port could not be opened
    OpenFailed { port: String, reason: String },

    /// No valid frame was parsed within the self-test window
    SelfTestFailed { window_ms: u64 },

    /// The link is not open
    NotConnected,

    /// A reader thread is already running on this link
    AlreadyReading,

    /// Read or write failure on the underlying transport
    Transport { details: String },

    /// The reader thread could not be spawned
    ThreadSpawn { reason: String },

    /// Listing serial ports failed
    Enumeration { reason: String },
}

impl ErrorCode for LinkError {
    fn code(&self) -> i32 {
        match self {
            LinkError::NoDeviceFound => LinkErrorCodes::NO_DEVICE_FOUND,
            LinkError::OpenFailed { .. } => LinkErrorCodes::OPEN_FAILED,
            LinkError::SelfTestFailed { .. } => LinkErrorCodes::SELF_TEST_FAILED,
            LinkError::NotConnected => LinkErrorCodes::NOT_CONNECTED,
            LinkError::AlreadyReading => LinkErrorCodes::ALREADY_READING,
            LinkError::Transport { .. } => LinkErrorCodes::TRANSPORT,
            LinkError::ThreadSpawn { .. } => LinkErrorCodes::THREAD_SPAWN,
            LinkError::Enumeration { .. } => LinkErrorCodes::ENUMERATION,
        }
    }

    fn message(&self) -> String {
        match self {
            LinkError::NoDeviceFound => {
                "No sensing device detected. Check the USB cable or set an explicit port.".to_string()
            }
            LinkError::OpenFailed { port, reason } => {
                format!("Failed to open serial port {}: {}", port, reason)
            }
            LinkError::SelfTestFailed { window_ms } => {
                format!("No valid telemetry frame received within {} ms", window_ms)
            }
            LinkError::NotConnected => "Link not connected. Call connect() first.".to_string(),
            LinkError::AlreadyReading => {
                "Reader thread already running. Call disconnect() first.".to_string()
            }
            LinkError::Transport { details } => format!("Transport error: {}", details),
            LinkError::ThreadSpawn { reason } => {
                format!("Failed to spawn reader thread: {}", reason)
            }
            LinkError::Enumeration { reason } => {
                format!("Failed to enumerate serial ports: {}", reason)
            }
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LinkError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Transport {
            details: err.to_string(),
        }
    }
}

impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        LinkError::Transport {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_codes() {
        assert_eq!(
            LinkError::NoDeviceFound.code(),
            LinkErrorCodes::NO_DEVICE_FOUND
        );
        assert_eq!(
            LinkError::OpenFailed {
                port: "/dev/ttyACM0".to_string(),
                reason: "busy".to_string()
            }
            .code(),
            LinkErrorCodes::OPEN_FAILED
        );
        assert_eq!(
            LinkError::SelfTestFailed { window_ms: 3000 }.code(),
            LinkErrorCodes::SELF_TEST_FAILED
        );
        assert_eq!(LinkError::NotConnected.code(), 3004);
        assert_eq!(LinkError::AlreadyReading.code(), 3005);
        assert_eq!(
            LinkError::Transport {
                details: "x".to_string()
            }
            .code(),
            3006
        );
        assert_eq!(
            LinkError::ThreadSpawn {
                reason: "x".to_string()
            }
            .code(),
            3007
        );
        assert_eq!(
            LinkError::Enumeration {
                reason: "x".to_string()
            }
            .code(),
            3008
        );
    }

    #[test]
    fn test_link_error_messages() {
        let err = LinkError::OpenFailed {
            port: "COM3".to_string(),
            reason: "access denied".to_string(),
        };
        assert_eq!(
            err.message(),
            "Failed to open serial port COM3: access denied"
        );

        let err = LinkError::SelfTestFailed { window_ms: 3000 };
        assert!(err.message().contains("3000 ms"));

        let display = format!("{}", LinkError::NotConnected);
        assert!(display.contains("LinkError"));
        assert!(display.contains("3004"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("cable unplugged");
        let link_err: LinkError = io_err.into();
        match link_err {
            LinkError::Transport { details } => assert!(details.contains("cable unplugged")),
            other => panic!("Expected Transport, got {:?}", other),
        }
    }
}

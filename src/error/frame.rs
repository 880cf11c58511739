// Frame parse error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Frame parse error code constants
///
/// Error code range: 4001-4003
pub struct FrameParseErrorCodes {}

impl FrameParseErrorCodes {
    /// Line was empty or whitespace only
    pub const EMPTY: i32 = 4001;

    /// Line carried no KEY:VALUE pair
    pub const NO_FIELDS: i32 = 4002;

    /// A known key carried a non-numeric or non-finite value
    pub const INVALID_VALUE: i32 = 4003;
}

/// A single malformed telemetry line
///
/// Never fatal: the reader counts it as one lost packet and moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameParseError {
    /// Empty line
    Empty,

    /// No `KEY:VALUE` pair in the line
    NoFields,

    /// Value of a known key could not be parsed
    InvalidValue { key: String, value: String },
}

impl ErrorCode for FrameParseError {
    fn code(&self) -> i32 {
        match self {
            FrameParseError::Empty => FrameParseErrorCodes::EMPTY,
            FrameParseError::NoFields => FrameParseErrorCodes::NO_FIELDS,
            FrameParseError::InvalidValue { .. } => FrameParseErrorCodes::INVALID_VALUE,
        }
    }

    fn message(&self) -> String {
        match self {
            FrameParseError::Empty => "Empty frame".to_string(),
            FrameParseError::NoFields => "Frame contains no KEY:VALUE pair".to_string(),
            FrameParseError::InvalidValue { key, value } => {
                format!("Invalid value for {}: {:?}", key, value)
            }
        }
    }
}

impl fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameParseError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for FrameParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_codes() {
        assert_eq!(FrameParseError::Empty.code(), 4001);
        assert_eq!(FrameParseError::NoFields.code(), 4002);
        assert_eq!(
            FrameParseError::InvalidValue {
                key: "AMP".to_string(),
                value: "abc".to_string()
            }
            .code(),
            4003
        );
    }

    #[test]
    fn test_invalid_value_message_names_key() {
        let err = FrameParseError::InvalidValue {
            key: "BASS".to_string(),
            value: "x1".to_string(),
        };
        assert!(err.message().contains("BASS"));
        assert!(err.to_string().contains("4003"));
    }
}

//! Protocol error types and device error codes.

use crate::value::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur while encoding or decoding values and frames.
///
/// None of these are recoverable on a live connection: once the byte stream
/// disagrees with the codec the cipher state can no longer be trusted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected [e3, dc], got {0:02x?}")]
    InvalidMagic([u8; 2]),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid frame control flags: {0:#06x}")]
    InvalidFlags(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("truncated value: need {needed} bytes, {available} available")]
    TruncatedValue { needed: usize, available: usize },

    #[error("unknown data type: {0:#04x}")]
    UnknownType(u8),

    #[error("malformed container {tag:#010x}: {reason}")]
    MalformedContainer { tag: u32, reason: String },

    #[error("type mismatch for tag {tag:#010x}: expected {expected}, got {actual}")]
    TypeMismatch {
        tag: u32,
        expected: DataType,
        actual: DataType,
    },

    #[error("invalid length for {data_type} tag {tag:#010x}: expected {expected}, got {actual}")]
    InvalidLength {
        tag: u32,
        data_type: DataType,
        expected: usize,
        actual: usize,
    },

    #[error("value too large for tag {tag:#010x}: {size} bytes")]
    ValueTooLarge { tag: u32, size: usize },

    #[error("invalid UTF-8 in string tag {tag:#010x}")]
    InvalidUtf8 { tag: u32 },
}

/// Error codes carried in `Error`-typed values sent by the power station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RscpErrorCode {
    NotHandled,
    AccessDenied,
    Format,
    Again,
    OutOfBounds,
    NotAvailable,
    UnknownTag,
    AlreadyInUse,
    Unknown(u32),
}

impl RscpErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x01 => RscpErrorCode::NotHandled,
            0x02 => RscpErrorCode::AccessDenied,
            0x03 => RscpErrorCode::Format,
            0x04 => RscpErrorCode::Again,
            0x05 => RscpErrorCode::OutOfBounds,
            0x06 => RscpErrorCode::NotAvailable,
            0x07 => RscpErrorCode::UnknownTag,
            0x08 => RscpErrorCode::AlreadyInUse,
            other => RscpErrorCode::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            RscpErrorCode::NotHandled => 0x01,
            RscpErrorCode::AccessDenied => 0x02,
            RscpErrorCode::Format => 0x03,
            RscpErrorCode::Again => 0x04,
            RscpErrorCode::OutOfBounds => 0x05,
            RscpErrorCode::NotAvailable => 0x06,
            RscpErrorCode::UnknownTag => 0x07,
            RscpErrorCode::AlreadyInUse => 0x08,
            RscpErrorCode::Unknown(code) => *code,
        }
    }

    /// Returns whether the device asked the client to try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RscpErrorCode::Again)
    }
}

impl From<u32> for RscpErrorCode {
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for RscpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RscpErrorCode::NotHandled => write!(f, "NOT_HANDLED"),
            RscpErrorCode::AccessDenied => write!(f, "ACCESS_DENIED"),
            RscpErrorCode::Format => write!(f, "FORMAT"),
            RscpErrorCode::Again => write!(f, "AGAIN"),
            RscpErrorCode::OutOfBounds => write!(f, "OUT_OF_BOUNDS"),
            RscpErrorCode::NotAvailable => write!(f, "NOT_AVAILABLE"),
            RscpErrorCode::UnknownTag => write!(f, "UNKNOWN_TAG"),
            RscpErrorCode::AlreadyInUse => write!(f, "ALREADY_IN_USE"),
            RscpErrorCode::Unknown(code) => write!(f, "UNKNOWN({:#x})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        for code in 1..=8u32 {
            assert_eq!(RscpErrorCode::from_code(code).code(), code);
        }
        assert_eq!(RscpErrorCode::from(2), RscpErrorCode::AccessDenied);
        assert_eq!(RscpErrorCode::from(0x42), RscpErrorCode::Unknown(0x42));
        assert_eq!(RscpErrorCode::Unknown(0x42).code(), 0x42);
    }

    #[test]
    fn test_error_code_retryable() {
        assert!(RscpErrorCode::Again.is_retryable());
        assert!(!RscpErrorCode::AccessDenied.is_retryable());
        assert!(!RscpErrorCode::Unknown(4).is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", RscpErrorCode::AccessDenied), "ACCESS_DENIED");
        assert_eq!(format!("{}", RscpErrorCode::NotAvailable), "NOT_AVAILABLE");
        assert_eq!(format!("{}", RscpErrorCode::Unknown(0x20)), "UNKNOWN(0x20)");
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&RscpErrorCode::AccessDenied).unwrap();
        assert_eq!(json, "\"ACCESS_DENIED\"");

        let parsed: RscpErrorCode = serde_json::from_str("\"OUT_OF_BOUNDS\"").unwrap();
        assert_eq!(parsed, RscpErrorCode::OutOfBounds);
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidMagic([0xAB, 0xCD]);
        assert!(err.to_string().contains("magic"));

        let err = ProtocolError::UnsupportedVersion(9);
        assert!(err.to_string().contains('9'));

        let err = ProtocolError::CrcMismatch {
            expected: 0xABC,
            actual: 0xDEF,
        };
        let msg = err.to_string();
        assert!(msg.contains("abc") && msg.contains("def"));

        let err = ProtocolError::TypeMismatch {
            tag: 0x0180_0001,
            expected: DataType::Int32,
            actual: DataType::Float32,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x01800001"));
        assert!(msg.contains("Int32") && msg.contains("Float32"));

        let err = ProtocolError::TruncatedValue {
            needed: 12,
            available: 3,
        };
        assert!(err.to_string().contains("12"));
    }
}

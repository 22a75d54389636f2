//! # rscp-protocol
//!
//! Wire protocol implementation for RSCP (Remote Storage Control Protocol),
//! the binary RPC protocol spoken by E3/DC home power stations.
//!
//! This crate provides:
//! - The typed TLV value model with recursive containers
//! - Binary framing with length prefix and CRC-32 validation
//! - Tag constants and device error codes

pub mod error;
pub mod frame;
pub mod tags;
pub mod value;

pub use error::{ProtocolError, RscpErrorCode};
pub use frame::{Frame, FrameFlags, FrameHeader, CRC_SIZE, FRAME_HEADER_SIZE, MAGIC};
pub use value::{ContainerBuilder, DataType, Timestamp, Tlv, Value, ROOT_TAG, TLV_HEADER_SIZE};

/// Protocol version carried in the frame control field.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default RSCP service port of the power station.
pub const DEFAULT_PORT: u16 = 5033;

/// Maximum frame body size; the length field is 16 bits wide.
pub const MAX_BODY_SIZE: usize = u16::MAX as usize;

/// Maximum size of a complete frame on the wire (header + body + CRC).
pub const MAX_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_BODY_SIZE + CRC_SIZE;

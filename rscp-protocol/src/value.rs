//! Typed TLV value model.
//!
//! Every RSCP value on the wire has a 7 byte header followed by its payload:
//!
//! ```text
//! +----------+----------+----------+---------------------+
//! | tag      | type     | length   | payload             |
//! | 4 bytes  | 1 byte   | 2 bytes  | length bytes        |
//! +----------+----------+----------+---------------------+
//! ```
//!
//! All integers are little endian. A container's payload is the concatenation
//! of its fully encoded children.

use crate::error::{ProtocolError, RscpErrorCode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag of the synthetic request root. Never sent on the wire, never emitted by the device.
pub const ROOT_TAG: u32 = 0;

/// Size of the TLV header (4+1+2 = 7).
pub const TLV_HEADER_SIZE: usize = 7;

/// Maximum container nesting accepted by the decoder.
const MAX_NESTING_DEPTH: usize = 32;

/// Wire data type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    None = 0x00,
    Bool = 0x01,
    Int8 = 0x02,
    UInt8 = 0x03,
    Int16 = 0x04,
    UInt16 = 0x05,
    Int32 = 0x06,
    UInt32 = 0x07,
    Int64 = 0x08,
    UInt64 = 0x09,
    Float32 = 0x0A,
    Double64 = 0x0B,
    Bitfield = 0x0C,
    String = 0x0D,
    Container = 0x0E,
    Timestamp = 0x0F,
    Bytes = 0x10,
    Error = 0xFF,
}

impl DataType {
    /// Returns the canonical payload width, or `None` for variable-length types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::None => Some(0),
            DataType::Bool | DataType::Int8 | DataType::UInt8 | DataType::Bitfield => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Error => Some(4),
            DataType::Int64 | DataType::UInt64 | DataType::Double64 => Some(8),
            DataType::Timestamp => Some(Timestamp::SIZE),
            DataType::String | DataType::Container | DataType::Bytes => None,
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x00 => Ok(DataType::None),
            0x01 => Ok(DataType::Bool),
            0x02 => Ok(DataType::Int8),
            0x03 => Ok(DataType::UInt8),
            0x04 => Ok(DataType::Int16),
            0x05 => Ok(DataType::UInt16),
            0x06 => Ok(DataType::Int32),
            0x07 => Ok(DataType::UInt32),
            0x08 => Ok(DataType::Int64),
            0x09 => Ok(DataType::UInt64),
            0x0A => Ok(DataType::Float32),
            0x0B => Ok(DataType::Double64),
            0x0C => Ok(DataType::Bitfield),
            0x0D => Ok(DataType::String),
            0x0E => Ok(DataType::Container),
            0x0F => Ok(DataType::Timestamp),
            0x10 => Ok(DataType::Bytes),
            0xFF => Ok(DataType::Error),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Point in time as carried by RSCP: seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl Timestamp {
    /// Encoded size (8 byte seconds + 4 byte nanoseconds).
    pub const SIZE: usize = 12;

    pub fn new(seconds: i64, nanoseconds: i32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub fn from_secs(seconds: i64) -> Self {
        Self::new(seconds, 0)
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    /// Returns a timestamp shifted by whole seconds.
    pub fn offset_secs(&self, seconds: i64) -> Self {
        Self::new(self.seconds + seconds, self.nanoseconds)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = u32::try_from(self.nanoseconds).ok()?;
        DateTime::from_timestamp(self.seconds, nanos)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos() as i32)
    }
}

/// Decoded payload of a TLV.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Double64(f64),
    Bitfield(u8),
    String(String),
    Container(Vec<Tlv>),
    Timestamp(Timestamp),
    Bytes(Bytes),
    /// Device-signalled failure for the enclosing tag.
    Error(u32),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::None => DataType::None,
            Value::Bool(_) => DataType::Bool,
            Value::Int8(_) => DataType::Int8,
            Value::UInt8(_) => DataType::UInt8,
            Value::Int16(_) => DataType::Int16,
            Value::UInt16(_) => DataType::UInt16,
            Value::Int32(_) => DataType::Int32,
            Value::UInt32(_) => DataType::UInt32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float32(_) => DataType::Float32,
            Value::Double64(_) => DataType::Double64,
            Value::Bitfield(_) => DataType::Bitfield,
            Value::String(_) => DataType::String,
            Value::Container(_) => DataType::Container,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Bytes(_) => DataType::Bytes,
            Value::Error(_) => DataType::Error,
        }
    }

    /// Number of payload bytes this value occupies on the wire.
    pub fn payload_len(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Container(children) => children.iter().map(Tlv::encoded_len).sum(),
            other => other.data_type().fixed_width().unwrap_or(0),
        }
    }

    fn put_payload(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Value::None => {}
            Value::Bool(v) => buf.put_u8(u8::from(*v)),
            Value::Int8(v) => buf.put_i8(*v),
            Value::UInt8(v) | Value::Bitfield(v) => buf.put_u8(*v),
            Value::Int16(v) => buf.put_i16_le(*v),
            Value::UInt16(v) => buf.put_u16_le(*v),
            Value::Int32(v) => buf.put_i32_le(*v),
            Value::UInt32(v) | Value::Error(v) => buf.put_u32_le(*v),
            Value::Int64(v) => buf.put_i64_le(*v),
            Value::UInt64(v) => buf.put_u64_le(*v),
            Value::Float32(v) => buf.put_f32_le(*v),
            Value::Double64(v) => buf.put_f64_le(*v),
            Value::String(s) => buf.put_slice(s.as_bytes()),
            Value::Bytes(b) => buf.put_slice(b),
            Value::Timestamp(ts) => {
                buf.put_i64_le(ts.seconds);
                buf.put_i32_le(ts.nanoseconds);
            }
            Value::Container(children) => {
                for child in children {
                    child.encode(buf)?;
                }
            }
        }
        Ok(())
    }

    fn from_payload(
        tag: u32,
        data_type: DataType,
        payload: &[u8],
        depth: usize,
    ) -> Result<Self, ProtocolError> {
        if let Some(expected) = data_type.fixed_width() {
            if payload.len() != expected {
                return Err(ProtocolError::InvalidLength {
                    tag,
                    data_type,
                    expected,
                    actual: payload.len(),
                });
            }
        }

        let mut p = payload;
        let value = match data_type {
            DataType::None => Value::None,
            DataType::Bool => Value::Bool(p.get_u8() != 0),
            DataType::Int8 => Value::Int8(p.get_i8()),
            DataType::UInt8 => Value::UInt8(p.get_u8()),
            DataType::Int16 => Value::Int16(p.get_i16_le()),
            DataType::UInt16 => Value::UInt16(p.get_u16_le()),
            DataType::Int32 => Value::Int32(p.get_i32_le()),
            DataType::UInt32 => Value::UInt32(p.get_u32_le()),
            DataType::Int64 => Value::Int64(p.get_i64_le()),
            DataType::UInt64 => Value::UInt64(p.get_u64_le()),
            DataType::Float32 => Value::Float32(p.get_f32_le()),
            DataType::Double64 => Value::Double64(p.get_f64_le()),
            DataType::Bitfield => Value::Bitfield(p.get_u8()),
            DataType::Error => Value::Error(p.get_u32_le()),
            DataType::Timestamp => {
                let seconds = p.get_i64_le();
                let nanoseconds = p.get_i32_le();
                Value::Timestamp(Timestamp::new(seconds, nanoseconds))
            }
            DataType::String => Value::String(
                String::from_utf8(payload.to_vec())
                    .map_err(|_| ProtocolError::InvalidUtf8 { tag })?,
            ),
            DataType::Bytes => Value::Bytes(Bytes::copy_from_slice(payload)),
            DataType::Container => Value::Container(decode_children(tag, payload, depth + 1)?),
        };
        Ok(value)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int8(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int16(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

/// A tagged value. Immutable once built; containers are assembled with [`ContainerBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tlv {
    tag: u32,
    value: Value,
}

macro_rules! scalar_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Result<$ty, ProtocolError> {
            match &self.value {
                Value::$variant(v) => Ok(*v),
                _ => Err(self.mismatch(DataType::$variant)),
            }
        }
    };
}

impl Tlv {
    pub fn new(tag: u32, value: impl Into<Value>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Creates a request tag without payload.
    pub fn request(tag: u32) -> Self {
        Self {
            tag,
            value: Value::None,
        }
    }

    pub fn container(tag: u32, children: Vec<Tlv>) -> Self {
        Self {
            tag,
            value: Value::Container(children),
        }
    }

    pub fn error(tag: u32, code: u32) -> Self {
        Self {
            tag,
            value: Value::Error(code),
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn data_type(&self) -> DataType {
        self.value.data_type()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.value, Value::Error(_))
    }

    pub fn is_root(&self) -> bool {
        self.tag == ROOT_TAG && matches!(self.value, Value::Container(_))
    }

    fn mismatch(&self, expected: DataType) -> ProtocolError {
        ProtocolError::TypeMismatch {
            tag: self.tag,
            expected,
            actual: self.data_type(),
        }
    }

    scalar_accessor!(as_bool, Bool, bool);
    scalar_accessor!(as_i8, Int8, i8);
    scalar_accessor!(as_u8, UInt8, u8);
    scalar_accessor!(as_i16, Int16, i16);
    scalar_accessor!(as_u16, UInt16, u16);
    scalar_accessor!(as_i32, Int32, i32);
    scalar_accessor!(as_u32, UInt32, u32);
    scalar_accessor!(as_i64, Int64, i64);
    scalar_accessor!(as_u64, UInt64, u64);
    scalar_accessor!(as_f32, Float32, f32);
    scalar_accessor!(as_f64, Double64, f64);
    scalar_accessor!(as_bitfield, Bitfield, u8);
    scalar_accessor!(as_timestamp, Timestamp, Timestamp);

    pub fn as_str(&self) -> Result<&str, ProtocolError> {
        match &self.value {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(DataType::String)),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], ProtocolError> {
        match &self.value {
            Value::Bytes(b) => Ok(b),
            _ => Err(self.mismatch(DataType::Bytes)),
        }
    }

    pub fn as_container(&self) -> Result<&[Tlv], ProtocolError> {
        match &self.value {
            Value::Container(children) => Ok(children),
            _ => Err(self.mismatch(DataType::Container)),
        }
    }

    pub fn as_error(&self) -> Result<RscpErrorCode, ProtocolError> {
        match &self.value {
            Value::Error(code) => Ok(RscpErrorCode::from_code(*code)),
            _ => Err(self.mismatch(DataType::Error)),
        }
    }

    /// Total encoded size including the TLV header.
    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.value.payload_len()
    }

    /// Appends the encoded value to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload_len = self.value.payload_len();
        if payload_len > u16::MAX as usize {
            return Err(ProtocolError::ValueTooLarge {
                tag: self.tag,
                size: payload_len,
            });
        }

        buf.reserve(TLV_HEADER_SIZE + payload_len);
        buf.put_u32_le(self.tag);
        buf.put_u8(self.data_type() as u8);
        buf.put_u16_le(payload_len as u16);
        self.value.put_payload(buf)
    }

    pub fn to_bytes(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decodes one value from the front of `buf`.
    ///
    /// Returns the value and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        decode_one(buf, 0)
    }

    /// Decodes a run of sibling values that must exactly fill `buf`.
    pub fn decode_all(buf: &[u8]) -> Result<Vec<Self>, ProtocolError> {
        decode_children(ROOT_TAG, buf, 0)
    }
}

fn decode_one(buf: &[u8], depth: usize) -> Result<(Tlv, usize), ProtocolError> {
    if buf.len() < TLV_HEADER_SIZE {
        return Err(ProtocolError::TruncatedValue {
            needed: TLV_HEADER_SIZE,
            available: buf.len(),
        });
    }

    let mut header = &buf[..TLV_HEADER_SIZE];
    let tag = header.get_u32_le();
    let data_type = DataType::try_from(header.get_u8())?;
    let payload_len = header.get_u16_le() as usize;

    let total = TLV_HEADER_SIZE + payload_len;
    if buf.len() < total {
        return Err(ProtocolError::TruncatedValue {
            needed: total,
            available: buf.len(),
        });
    }

    let value = Value::from_payload(tag, data_type, &buf[TLV_HEADER_SIZE..total], depth)?;
    Ok((Tlv { tag, value }, total))
}

fn decode_children(tag: u32, payload: &[u8], depth: usize) -> Result<Vec<Tlv>, ProtocolError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ProtocolError::MalformedContainer {
            tag,
            reason: format!("nesting deeper than {} levels", MAX_NESTING_DEPTH),
        });
    }

    let mut children = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        match decode_one(&payload[offset..], depth) {
            Ok((child, used)) => {
                children.push(child);
                offset += used;
            }
            Err(ProtocolError::TruncatedValue { needed, available }) => {
                return Err(ProtocolError::MalformedContainer {
                    tag,
                    reason: format!(
                        "child at offset {} overruns container by {} bytes",
                        offset,
                        needed - available
                    ),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(children)
}

/// Builds a container value. The builder owns the children until [`build`](Self::build).
#[derive(Debug)]
pub struct ContainerBuilder {
    tag: u32,
    children: Vec<Tlv>,
}

impl ContainerBuilder {
    pub fn new(tag: u32) -> Self {
        Self {
            tag,
            children: Vec::new(),
        }
    }

    /// Starts the synthetic tag-0 request root.
    pub fn root() -> Self {
        Self::new(ROOT_TAG)
    }

    pub fn push(mut self, child: Tlv) -> Self {
        self.children.push(child);
        self
    }

    pub fn value(self, tag: u32, value: impl Into<Value>) -> Self {
        self.push(Tlv::new(tag, value))
    }

    pub fn request(self, tag: u32) -> Self {
        self.push(Tlv::request(tag))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn build(self) -> Tlv {
        Tlv::container(self.tag, self.children)
    }
}

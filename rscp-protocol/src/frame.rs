//! Binary frame format for RSCP.
//!
//! Frame layout (18 bytes header + body + optional CRC), little endian:
//!
//! ```text
//! +--------+---------+------------+-------------+----------+
//! | magic  | control | ts seconds | ts nanosecs | body_len |
//! | 2 bytes| 2 bytes |  8 bytes   |   4 bytes   | 2 bytes  |
//! +--------+---------+------------+-------------+----------+
//! | body (sequence of TLVs)       | [crc32 of header+body] |
//! | body_len bytes                | 4 bytes if flagged     |
//! +-------------------------------+------------------------+
//! ```
//!
//! Frames are padded with zeros to the cipher block size before encryption.
//! The padding is not part of the frame; [`Frame::parse`] reports the
//! consumed length without it.

use crate::error::ProtocolError;
use crate::value::{Timestamp, Tlv};
use crate::{MAX_BODY_SIZE, PROTOCOL_VERSION};
use bytes::{Buf, BufMut, BytesMut};

/// Magic bytes identifying RSCP frames.
pub const MAGIC: [u8; 2] = [0xE3, 0xDC];

/// Size of the fixed frame header in bytes (2+2+8+4+2 = 18).
pub const FRAME_HEADER_SIZE: usize = 18;

/// Size of the optional CRC-32 trailer.
pub const CRC_SIZE: usize = 4;

/// Frame control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// CRC-32 trailer is present.
    pub const CRC_PRESENT: u16 = 0x1000;

    const VERSION_MASK: u16 = 0x0F00;
    const VERSION_SHIFT: u16 = 8;
    const VALID_MASK: u16 = Self::VERSION_MASK | Self::CRC_PRESENT;

    pub fn new() -> Self {
        Self(u16::from(PROTOCOL_VERSION) << Self::VERSION_SHIFT)
    }

    pub fn with_crc(mut self) -> Self {
        self.0 |= Self::CRC_PRESENT;
        self
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn version(&self) -> u8 {
        ((self.0 & Self::VERSION_MASK) >> Self::VERSION_SHIFT) as u8
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        let flags = Self(bits);
        if flags.version() != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(flags.version()));
        }
        if bits & !Self::VALID_MASK != 0 {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(flags)
    }
}

impl Default for FrameFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    pub timestamp: Timestamp,
    /// Declared body size.
    pub body_len: usize,
}

impl FrameHeader {
    /// Reads and validates the header at the front of `buf` without touching the body.
    ///
    /// Returns `Ok(None)` if fewer than [`FRAME_HEADER_SIZE`] bytes are available.
    pub fn peek(buf: &[u8]) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &buf[..FRAME_HEADER_SIZE];
        let magic = [header.get_u8(), header.get_u8()];
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let flags = FrameFlags::from_bits(header.get_u16_le())?;
        let seconds = header.get_i64_le();
        let nanoseconds = header.get_i32_le();
        let body_len = header.get_u16_le() as usize;

        Ok(Some(Self {
            flags,
            timestamp: Timestamp::new(seconds, nanoseconds),
            body_len,
        }))
    }

    /// Size of the whole frame on the wire, excluding cipher padding.
    pub fn frame_len(&self) -> usize {
        let crc = if self.flags.has_crc() { CRC_SIZE } else { 0 };
        FRAME_HEADER_SIZE + self.body_len + crc
    }
}

/// A parsed RSCP frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame control flags.
    pub flags: FrameFlags,
    /// Sender time stamp.
    pub timestamp: Timestamp,
    /// Top-level values carried in the body.
    pub values: Vec<Tlv>,
    /// CRC-32 trailer, if the frame carried one.
    pub crc: Option<u32>,
}

impl Frame {
    /// Creates a CRC-protected frame stamped with the current time.
    pub fn new(values: Vec<Tlv>) -> Self {
        Self {
            flags: FrameFlags::new().with_crc(),
            timestamp: Timestamp::now(),
            values,
            crc: None,
        }
    }

    /// Serializes a request tree into frame bytes.
    ///
    /// The synthetic tag-0 root is unwrapped: its children form the body and
    /// the root itself never reaches the wire. Any other value becomes the
    /// single body element.
    pub fn build(root: &Tlv, with_crc: bool) -> Result<BytesMut, ProtocolError> {
        let mut flags = FrameFlags::new();
        if with_crc {
            flags = flags.with_crc();
        }
        let values = if root.is_root() {
            root.as_container()?
        } else {
            std::slice::from_ref(root)
        };
        encode_parts(values, flags, Timestamp::now())
    }

    /// Declared body size of this frame.
    pub fn body_len(&self) -> usize {
        self.values.iter().map(Tlv::encoded_len).sum()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        encode_parts(&self.values, self.flags, self.timestamp)
    }

    /// Parses one frame from the front of `buf`.
    ///
    /// Returns `Ok(Some((frame, consumed)))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` if the bytes are not a
    /// valid frame. `consumed` excludes any trailing padding.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, ProtocolError> {
        let header = match FrameHeader::peek(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let total_len = header.frame_len();
        if buf.len() < total_len {
            return Ok(None);
        }

        let body_end = FRAME_HEADER_SIZE + header.body_len;
        let crc = if header.flags.has_crc() {
            let mut trailer = &buf[body_end..total_len];
            let expected = trailer.get_u32_le();
            let actual = crc32fast::hash(&buf[..body_end]);
            if actual != expected {
                return Err(ProtocolError::CrcMismatch { expected, actual });
            }
            Some(expected)
        } else {
            None
        };

        let values = Tlv::decode_all(&buf[FRAME_HEADER_SIZE..body_end])?;

        Ok(Some((
            Self {
                flags: header.flags,
                timestamp: header.timestamp,
                values,
                crc,
            },
            total_len,
        )))
    }

    pub fn into_values(self) -> Vec<Tlv> {
        self.values
    }
}

fn encode_parts(
    values: &[Tlv],
    flags: FrameFlags,
    timestamp: Timestamp,
) -> Result<BytesMut, ProtocolError> {
    let body_len: usize = values.iter().map(Tlv::encoded_len).sum();
    if body_len > MAX_BODY_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body_len,
            max: MAX_BODY_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len + CRC_SIZE);

    buf.put_slice(&MAGIC);
    buf.put_u16_le(flags.bits());
    buf.put_i64_le(timestamp.seconds);
    buf.put_i32_le(timestamp.nanoseconds);
    buf.put_u16_le(body_len as u16);

    for value in values {
        value.encode(&mut buf)?;
    }

    if flags.has_crc() {
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
    }

    Ok(buf)
}

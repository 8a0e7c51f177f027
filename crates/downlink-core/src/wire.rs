//! Downlink wire format: the header carried by every transmitted fragment.
//!
//! A receiver must be able to place a fragment without reading its payload:
//! which stream it belongs to, where it sits, how long it is, and whether it
//! is data or parity. Changing a field here changes the frame layout.
//!
//! The header is #[repr(C, packed)] with zerocopy derives for allocation-free
//! serialization. Multi-byte fields are in host byte order. There is no unsafe
//! code in this module.

use bytes::{Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::manifest::StreamId;

// ── Fragment Header ──────────────────────────────────────────────────────────

/// Prefix of every frame on the downlink.
///
/// Wire size: 20 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FragmentHeader {
    /// Identifies the compressed stream this fragment was cut from.
    pub stream_id: [u8; 8],

    /// Data fragments: position in the stream.
    /// Parity fragments: pair number (protects `2 * index` and `2 * index + 1`).
    pub index: u32,

    /// Payload length in bytes, not including this header.
    pub length: u32,

    /// 0x01 = data, 0x02 = parity. See `FragmentKind`.
    pub kind: u8,

    /// Reserved, must be zero.
    pub flags: u8,

    /// Frame format version. Currently 0x01.
    pub version: u8,

    /// Padding, must be zero.
    pub reserved: u8,
}

// Compile-time size guard. If this fails, the frame layout has silently changed.
assert_eq_size!(FragmentHeader, [u8; 20]);

pub const HEADER_LEN: usize = std::mem::size_of::<FragmentHeader>();

/// Current frame format version.
pub const FRAME_VERSION: u8 = 0x01;

// ── Fragment Kind ────────────────────────────────────────────────────────────

/// Marker distinguishing data fragments from parity fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FragmentKind {
    Data = 0x01,
    Parity = 0x02,
}

impl TryFrom<u8> for FragmentKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FragmentKind::Data),
            0x02 => Ok(FragmentKind::Parity),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<FragmentKind> for u8 {
    fn from(k: FragmentKind) -> u8 {
        k as u8
    }
}

// ── Framing ──────────────────────────────────────────────────────────────────

impl FragmentHeader {
    pub fn new(stream_id: StreamId, kind: FragmentKind, index: u32, length: u32) -> Self {
        Self {
            stream_id: stream_id.0,
            index,
            length,
            kind: kind.into(),
            flags: 0,
            version: FRAME_VERSION,
            reserved: 0,
        }
    }

    pub fn kind(&self) -> Result<FragmentKind, WireError> {
        FragmentKind::try_from(self.kind)
    }
}

/// A decoded frame: validated header fields plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: StreamId,
    pub kind: FragmentKind,
    pub index: u32,
    pub payload: Bytes,
}

/// Serialize `header ‖ payload`. The header's length field is taken from the
/// payload, so it cannot disagree with it.
pub fn encode_frame(
    stream_id: StreamId,
    kind: FragmentKind,
    index: u32,
    payload: &[u8],
) -> Result<Bytes, WireError> {
    let length =
        u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge(payload.len()))?;
    let header = FragmentHeader::new(stream_id, kind, index, length);

    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

/// Parse and validate one frame.
pub fn decode_frame(frame: &Bytes) -> Result<Frame, WireError> {
    let header = FragmentHeader::read_from_prefix(&frame[..])
        .ok_or(WireError::Truncated(frame.len()))?;

    // Copy packed fields to locals before use.
    let version = header.version;
    let flags = header.flags;
    let length = header.length as usize;
    let index = header.index;
    let reserved = header.reserved;

    if version != FRAME_VERSION {
        return Err(WireError::UnknownVersion(version));
    }
    if flags != 0 || reserved != 0 {
        return Err(WireError::ReservedBitsSet(flags));
    }
    let kind = header.kind()?;

    let actual = frame.len() - HEADER_LEN;
    if actual != length {
        return Err(WireError::LengthMismatch {
            declared: length,
            actual,
        });
    }

    Ok(Frame {
        stream_id: StreamId(header.stream_id),
        kind,
        index,
        payload: frame.slice(HEADER_LEN..),
    })
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame of {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated(usize),

    #[error("unknown fragment kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedBitsSet(u8),

    #[error("header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload length {0} does not fit the header")]
    PayloadTooLarge(usize),
}

// ── Tests ────────────────────────────────────────────────────────────────────

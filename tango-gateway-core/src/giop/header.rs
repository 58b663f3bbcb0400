use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ProtocolError;

pub const GIOP_HEADER_LEN: usize = 12;
const MAGIC: &[u8; 4] = b"GIOP";

/// GIOP message types, per `spec.md` §3. Values outside this range are
/// preserved as `Unknown` and treated as opaque by callers rather than
/// rejected — the codec never fails on an unrecognized message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Reply,
    CancelRequest,
    LocateRequest,
    LocateReply,
    CloseConnection,
    MessageError,
    Fragment,
    Unknown(u8),
}

impl MessageType {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MessageType::Request,
            1 => MessageType::Reply,
            2 => MessageType::CancelRequest,
            3 => MessageType::LocateRequest,
            4 => MessageType::LocateReply,
            5 => MessageType::CloseConnection,
            6 => MessageType::MessageError,
            7 => MessageType::Fragment,
            other => MessageType::Unknown(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            MessageType::Request => 0,
            MessageType::Reply => 1,
            MessageType::CancelRequest => 2,
            MessageType::LocateRequest => 3,
            MessageType::LocateReply => 4,
            MessageType::CloseConnection => 5,
            MessageType::MessageError => 6,
            MessageType::Fragment => 7,
            MessageType::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GiopHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: u8,
    pub message_type: MessageType,
    pub size: u32,
}

impl GiopHeader {
    /// Bit 0 of `flags`: 0 = big-endian, 1 = little-endian.
    pub fn little_endian(&self) -> bool {
        self.flags & 0x01 != 0
    }

    /// Bit 1 of `flags`: fragment follows. Unsupported by this gateway's
    /// rewrite path (`spec.md` §1 non-goals); frames with this bit set are
    /// forwarded unchanged by callers, never rewritten.
    pub fn is_fragment(&self) -> bool {
        self.flags & 0x02 != 0
    }
}

/// Unpacks the fixed 12-octet GIOP header. Fails with `MalformedHeader` if
/// the magic doesn't match or the buffer is too short.
pub fn unpack_giop_header(bytes: &[u8]) -> Result<GiopHeader, ProtocolError> {
    if bytes.len() < GIOP_HEADER_LEN {
        return Err(ProtocolError::MalformedHeader(format!(
            "header too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[0..4] != MAGIC {
        return Err(ProtocolError::MalformedHeader(format!(
            "bad magic: {:?}",
            &bytes[0..4]
        )));
    }
    let flags = bytes[6];
    let little_endian = flags & 0x01 != 0;
    let size = if little_endian {
        LittleEndian::read_u32(&bytes[8..12])
    } else {
        BigEndian::read_u32(&bytes[8..12])
    };
    Ok(GiopHeader {
        version_major: bytes[4],
        version_minor: bytes[5],
        flags,
        message_type: MessageType::from_u8(bytes[7]),
        size,
    })
}

/// Packs a GIOP header and body back into a single 12+|body| octet frame.
/// The header's `size` field is trusted as given; callers that mutate the
/// body must recompute it first (`spec.md` §4.1).
pub fn pack_giop(header: &GiopHeader, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(GIOP_HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(header.version_major);
    out.push(header.version_minor);
    out.push(header.flags);
    out.push(header.message_type.to_u8());
    let mut size_bytes = [0u8; 4];
    if header.little_endian() {
        LittleEndian::write_u32(&mut size_bytes, body.len() as u32);
    } else {
        BigEndian::write_u32(&mut size_bytes, body.len() as u32);
    }
    out.extend_from_slice(&size_bytes);
    out.extend_from_slice(body);
    out
}

use crate::cdr::CdrReader;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    NoException,
    UserException,
    SystemException,
    LocationForward,
    Unknown(u32),
}

impl ReplyStatus {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => ReplyStatus::NoException,
            1 => ReplyStatus::UserException,
            2 => ReplyStatus::SystemException,
            3 => ReplyStatus::LocationForward,
            other => ReplyStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplyHeader {
    pub request_id: u32,
    pub reply_status: ReplyStatus,
}

/// Unpacks the Reply header that immediately follows the GIOP header in a
/// Reply message's payload (`spec.md` §3). `message_body` is the full
/// GIOP payload (i.e. `raw_data` in the original implementation), not just
/// the reply header's own bytes, because the service context list's length
/// is variable and only discoverable by walking it.
///
/// Returns the parsed header together with the byte offset, relative to
/// `message_body`, at which the reply body begins.
/// Upper bound on a plausible service context count. A genuine reply never
/// carries more than a handful; anything past this is a corrupt length
/// field, not a reply header worth spending a loop iteration on per context.
const MAX_PLAUSIBLE_CONTEXTS: u32 = 1024;

pub fn unpack_reply_header(
    message_body: &[u8],
    little_endian: bool,
) -> Result<(ReplyHeader, usize), ProtocolError> {
    let mut r = CdrReader::new(message_body, little_endian);

    let context_count = r.read_u32()?;
    if context_count > MAX_PLAUSIBLE_CONTEXTS {
        return Err(ProtocolError::MalformedReply(format!(
            "implausible service context count: {context_count}"
        )));
    }
    for _ in 0..context_count {
        let _context_id = r.read_u32()?;
        let context_data_len = r.read_u32()? as usize;
        r.read_octets(context_data_len)?;
    }

    let request_id = r.read_u32()?;
    let reply_status = ReplyStatus::from_u32(r.read_u32()?);

    Ok((ReplyHeader { request_id, reply_status }, r.position()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdr::CdrWriter;

    fn encode_reply_header(request_id: u32, status: u32, contexts: &[(u32, &[u8])]) -> Vec<u8> {
        let mut w = CdrWriter::new(false);
        w.write_u32(contexts.len() as u32);
        for (id, data) in contexts {
            w.write_u32(*id);
            w.write_string(data);
        }
        w.write_u32(request_id);
        w.write_u32(status);
        w.into_inner()
    }

    #[test]
    fn parses_empty_service_context_list() {
        let bytes = encode_reply_header(7, 0, &[]);
        let (header, offset) = unpack_reply_header(&bytes, false).unwrap();
        assert_eq!(header.request_id, 7);
        assert_eq!(header.reply_status, ReplyStatus::NoException);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn parses_with_service_contexts_and_trailing_body() {
        let mut bytes = encode_reply_header(3, 2, &[(1, b"abc"), (9, b"xy")]);
        let header_len = bytes.len();
        bytes.extend_from_slice(b"trailing-body");
        let (header, offset) = unpack_reply_header(&bytes, false).unwrap();
        assert_eq!(header.request_id, 3);
        assert_eq!(header.reply_status, ReplyStatus::SystemException);
        assert_eq!(offset, header_len);
        assert_eq!(&bytes[offset..], b"trailing-body");
    }

    #[test]
    fn truncated_context_list_is_malformed() {
        let bytes = vec![0, 0, 0, 1]; // claims one context, has no data
        assert!(unpack_reply_header(&bytes, false).is_err());
    }

    #[test]
    fn implausible_context_count_is_rejected_without_looping() {
        let bytes = vec![0xff, 0xff, 0xff, 0xff]; // context_count = u32::MAX
        assert!(matches!(
            unpack_reply_header(&bytes, false),
            Err(ProtocolError::MalformedReply(_))
        ));
    }
}

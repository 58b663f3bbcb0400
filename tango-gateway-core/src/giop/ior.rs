//! IOR (Interoperable Object Reference) discovery and rewrite.
//!
//! A Reply body can contain arbitrary CORBA values; the gateway has no IDL
//! type information telling it where, if anywhere, an object reference sits
//! inside that body. `find_ior` therefore scans the body at every CDR-aligned
//! offset, trying to parse a well-formed `{type_id, profiles}` IOR structure
//! whose first tagged profile is IIOP (tag 0). The first such offset that
//! parses cleanly and stays in bounds wins (`spec.md` §4.1, §9 — this is the
//! "first IOR, first profile" policy the design notes call out explicitly;
//! multi-IOR / multi-profile rewriting is a possible extension, not required).

use crate::cdr::{CdrReader, CdrWriter};

const TAG_INTERNET_IOP: u32 = 0;
/// Upper bound on a plausible type_id / host / object_key length while
/// scanning for a candidate IOR. Keeps the scan from wandering into
/// unrelated data and misreading an unrelated length-looking u32 as a huge
/// allocation.
const MAX_PLAUSIBLE_LEN: usize = 4096;
const MAX_PLAUSIBLE_PROFILES: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ior {
    pub type_id: Vec<u8>,
    /// Byte order of the enclosing GIOP message (used for the profile tag
    /// and profile-data length fields, which are not themselves a nested
    /// encapsulation).
    pub message_little_endian: bool,
    /// Byte order declared by the IIOP profile's own encapsulation octet.
    pub profile_little_endian: bool,
    pub version_major: u8,
    pub version_minor: u8,
    /// Host string including the trailing NUL, per IIOP convention.
    pub host: Vec<u8>,
    pub port: u16,
    pub object_key: Vec<u8>,
    /// Any bytes declared as part of the profile body past the object key
    /// (e.g. IIOP 1.1+ tagged components). Opaque; preserved verbatim.
    pub trailer: Vec<u8>,
}

impl Ior {
    pub fn host_str(&self) -> String {
        String::from_utf8_lossy(self.host.strip_suffix(&[0]).unwrap_or(&self.host)).into_owned()
    }
}

fn try_parse_at(body: &[u8], offset: usize, message_little_endian: bool) -> Option<(Ior, usize, usize)> {
    let mut r = CdrReader::new(&body[offset..], message_little_endian);

    let type_id_len = r.read_u32().ok()? as usize;
    if type_id_len == 0 || type_id_len > MAX_PLAUSIBLE_LEN {
        return None;
    }
    let type_id = r.read_octets(type_id_len).ok()?.to_vec();

    let profile_count = r.read_u32().ok()?;
    if profile_count == 0 || profile_count > MAX_PLAUSIBLE_PROFILES {
        return None;
    }

    let profile_start = offset + r.position();
    let tag = r.read_u32().ok()?;
    if tag != TAG_INTERNET_IOP {
        return None;
    }
    let profile_data_len = r.read_u32().ok()? as usize;
    let profile_data_start = offset + r.position();
    if profile_data_len == 0 || profile_data_start + profile_data_len > body.len() {
        return None;
    }
    let profile_data = &body[profile_data_start..profile_data_start + profile_data_len];

    let order_octet = *profile_data.first()?;
    let profile_little_endian = order_octet & 0x01 != 0;
    // The order octet is itself part of the encapsulation, so alignment for
    // everything that follows is relative to `profile_data` offset 0, not
    // offset 1 — consume it through the cursor rather than slicing it off.
    let mut pr = CdrReader::new(profile_data, profile_little_endian);
    let _order_octet = pr.read_u8().ok()?;

    let version_major = pr.read_u8().ok()?;
    let version_minor = pr.read_u8().ok()?;

    let host = pr.read_string().ok()?;
    if host.is_empty() || host.len() > MAX_PLAUSIBLE_LEN || *host.last().unwrap() != 0 {
        return None;
    }

    let port = pr.read_u16().ok()?;

    let object_key_len = pr.read_u32().ok()? as usize;
    if object_key_len > MAX_PLAUSIBLE_LEN {
        return None;
    }
    let object_key = pr.read_octets(object_key_len).ok()?.to_vec();

    let trailer_start = pr.position();
    if trailer_start > profile_data.len() {
        return None;
    }
    let trailer = profile_data[trailer_start..].to_vec();

    let stop = profile_data_start + profile_data_len;

    Some((
        Ior {
            type_id,
            message_little_endian,
            profile_little_endian,
            version_major,
            version_minor,
            host,
            port,
            object_key,
            trailer,
        },
        profile_start,
        stop,
    ))
}

/// Scans `reply_body` for the first well-formed IOR whose first tagged
/// profile is IIOP, returning the parsed `Ior` plus the `(start, stop)`
/// byte range of that profile's `{tag, profile_data}` encoding within
/// `reply_body`. Returns `None` if no such structure is found — this is not
/// an error, most Reply bodies carry no object reference at all.
pub fn find_ior(reply_body: &[u8], message_little_endian: bool) -> Option<(Ior, usize, usize)> {
    let mut offset = 0;
    while offset + 8 <= reply_body.len() {
        if let Some(found) = try_parse_at(reply_body, offset, message_little_endian) {
            return Some(found);
        }
        offset += 4;
    }
    None
}

/// Replaces the `(start, stop)` range of `reply_body` with a freshly encoded
/// `{tag, profile_data}` built from `new_ior`. The new range's length may
/// differ from `stop - start` (a rewritten host string rarely has the same
/// length as the original); callers must recompute the enclosing GIOP
/// header's `size` from the returned body before calling `pack_giop`.
pub fn repack_ior(reply_body: &[u8], new_ior: &Ior, start: usize, stop: usize) -> Vec<u8> {
    let mut profile = CdrWriter::new(new_ior.profile_little_endian);
    profile.write_u8(u8::from(new_ior.profile_little_endian));
    profile.write_u8(new_ior.version_major);
    profile.write_u8(new_ior.version_minor);
    profile.write_string(&new_ior.host);
    profile.write_u16(new_ior.port);
    profile.write_string(&new_ior.object_key);
    profile.write_octets(&new_ior.trailer);
    let profile_data = profile.into_inner();

    let mut outer = CdrWriter::new(new_ior.message_little_endian);
    outer.write_u32(TAG_INTERNET_IOP);
    outer.write_string(&profile_data);
    let rewritten = outer.into_inner();

    let mut new_body = Vec::with_capacity(reply_body.len() - (stop - start) + rewritten.len());
    new_body.extend_from_slice(&reply_body[..start]);
    new_body.extend_from_slice(&rewritten);
    new_body.extend_from_slice(&reply_body[stop..]);
    new_body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdr::CdrWriter;

    fn encode_ior(
        message_little_endian: bool,
        profile_little_endian: bool,
        type_id: &[u8],
        host: &[u8],
        port: u16,
        object_key: &[u8],
    ) -> Vec<u8> {
        let mut profile = CdrWriter::new(profile_little_endian);
        profile.write_u8(u8::from(profile_little_endian));
        profile.write_u8(1);
        profile.write_u8(2);
        profile.write_string(host);
        profile.write_u16(port);
        profile.write_string(object_key);
        let profile_data = profile.into_inner();

        let mut w = CdrWriter::new(message_little_endian);
        w.write_string(type_id);
        w.write_u32(1); // one profile
        w.write_u32(TAG_INTERNET_IOP);
        w.write_string(&profile_data);
        w.into_inner()
    }

    #[test]
    fn finds_ior_at_start_of_body() {
        let body = encode_ior(false, false, b"IDL:Tango/Device:1.0\0", b"10.0.0.5\0", 45678, b"deviceA");
        let (ior, start, stop) = find_ior(&body, false).expect("ior found");
        assert_eq!(ior.host_str(), "10.0.0.5");
        assert_eq!(ior.port, 45678);
        assert_eq!(ior.object_key, b"deviceA");
        assert_eq!(&body[start..stop].len(), &(stop - start));
        assert!(stop <= body.len());
    }

    #[test]
    fn finds_ior_after_leading_opaque_fields() {
        let mut prefix = CdrWriter::new(false);
        prefix.write_u32(0xCAFEBABEu32 as u32);
        prefix.write_u32(7);
        let mut body = prefix.into_inner();
        body.extend_from_slice(&encode_ior(
            false,
            true,
            b"IDL:Tango/Device:1.0\0",
            b"192.168.1.10\0",
            9000,
            b"key",
        ));
        let (ior, _start, _stop) = find_ior(&body, false).expect("ior found past opaque prefix");
        assert_eq!(ior.host_str(), "192.168.1.10");
        assert_eq!(ior.port, 9000);
        assert!(ior.profile_little_endian);
    }

    #[test]
    fn returns_none_when_no_ior_present() {
        let body = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        assert!(find_ior(&body, false).is_none());
    }

    #[test]
    fn repack_identity_when_ior_unchanged() {
        let body = encode_ior(false, false, b"IDL:Tango/Device:1.0\0", b"10.0.0.5\0", 45678, b"deviceA");
        let (ior, start, stop) = find_ior(&body, false).unwrap();
        let rebuilt = repack_ior(&body, &ior, start, stop);
        assert_eq!(rebuilt, body);
    }

    #[test]
    fn repack_rewrites_host_and_port_and_preserves_rest() {
        let body = encode_ior(false, false, b"IDL:Tango/Device:1.0\0", b"10.0.0.5\0", 45678, b"deviceA");
        let (mut ior, start, stop) = find_ior(&body, false).unwrap();
        ior.host = b"192.168.1.10\0".to_vec();
        ior.port = 55000;
        let rewritten = repack_ior(&body, &ior, start, stop);

        let (new_ior, _s, _e) = find_ior(&rewritten, false).unwrap();
        assert_eq!(new_ior.host_str(), "192.168.1.10");
        assert_eq!(new_ior.port, 55000);
        assert_eq!(new_ior.object_key, b"deviceA");
        assert_eq!(new_ior.type_id, b"IDL:Tango/Device:1.0\0");
    }
}

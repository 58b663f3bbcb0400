//! Reads exactly one GIOP message from a byte stream (`spec.md` §4.2).
//!
//! Interpretation of the frame's contents — whether it's a Reply, whether it
//! carries an IOR — is left entirely to the caller; this module only knows
//! how to find a frame's boundaries.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;
use crate::giop::{unpack_giop_header, GIOP_HEADER_LEN};

async fn read_up_to<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Reads one full GIOP frame (header ∥ body) from `reader`.
///
/// - `Ok(None)` — the stream was at EOF before any bytes arrived; a clean
///   close, not an error.
/// - `Err(TruncatedFrame)` — the stream closed partway through a frame.
/// - `Ok(Some(frame))` — exactly `12 + header.size` bytes, unparsed past the
///   header.
pub async fn read_giop_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut header_buf = [0u8; GIOP_HEADER_LEN];
    let got = read_up_to(reader, &mut header_buf)
        .await
        .map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;
    if got == 0 {
        return Ok(None);
    }
    if got < GIOP_HEADER_LEN {
        return Err(ProtocolError::TruncatedFrame { expected: GIOP_HEADER_LEN, got });
    }

    let header = unpack_giop_header(&header_buf)?;
    let size = header.size as usize;

    let mut body = vec![0u8; size];
    let got_body = read_up_to(reader, &mut body)
        .await
        .map_err(|e| ProtocolError::MalformedHeader(e.to_string()))?;
    if got_body < size {
        return Err(ProtocolError::TruncatedFrame { expected: size, got: got_body });
    }

    let mut frame = Vec::with_capacity(GIOP_HEADER_LEN + size);
    frame.extend_from_slice(&header_buf);
    frame.extend_from_slice(&body);
    Ok(Some(frame))
}

//! Inspecting pipe (`spec.md` §4.5): the same two-task relay shape as the
//! transparent pipe, except each direction parses whole GIOP frames and
//! rewrites the IORs carried in NoException Replies before forwarding them.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::frame::read_giop_frame;
use crate::giop::{
    find_ior, pack_giop, repack_ior, unpack_giop_header, unpack_reply_header, GiopHeader,
    MessageType, ReplyStatus, GIOP_HEADER_LEN,
};
use crate::registry::ForwarderRegistry;

/// Runs the inspecting pipe between an already-connected client and
/// database socket until either side closes or `shutdown` fires.
/// Connection-scoped errors (malformed frames, truncated reads) end that
/// connection only; they never propagate to the registry or to other
/// connections (`spec.md` §7).
pub async fn inspecting_pipe(
    client: TcpStream,
    database: TcpStream,
    registry: Arc<ForwarderRegistry>,
    shutdown: watch::Receiver<bool>,
) {
    let (client_r, client_w) = client.into_split();
    let (db_r, db_w) = database.into_split();

    let mut client_to_db = tokio::spawn(relay(client_r, db_w, registry.clone(), shutdown.clone(), "client->database"));
    let mut db_to_client = tokio::spawn(relay(db_r, client_w, registry, shutdown, "database->client"));

    // Either direction ending (EOF, a malformed frame, a write error, or a
    // shutdown signal) tears down the whole connection: abort the other
    // direction so a half-open socket can't leak a task (`spec.md` §5).
    tokio::select! {
        _ = &mut client_to_db => db_to_client.abort(),
        _ = &mut db_to_client => client_to_db.abort(),
    }
}

async fn relay<R, W>(
    mut reader: R,
    mut writer: W,
    registry: Arc<ForwarderRegistry>,
    mut shutdown: watch::Receiver<bool>,
    direction: &'static str,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            read = read_giop_frame(&mut reader) => match read {
                Ok(None) => break,
                Ok(Some(frame)) => frame,
                Err(error) => {
                    warn!(direction, %error, "closing connection after frame error");
                    break;
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(direction, "shutdown signal received, closing connection");
                    break;
                }
                continue;
            }
        };

        let outgoing = rewrite_if_reply(frame, &registry).await;

        if let Err(error) = writer.write_all(&outgoing).await {
            warn!(direction, %error, "write failed, closing connection");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Rewrites `frame` in place if it is a NoException Reply carrying an IOR;
/// otherwise returns it untouched. Bind failures on the dynamic listener
/// fall back to forwarding the original frame unchanged (`spec.md` §4.7).
async fn rewrite_if_reply(frame: Vec<u8>, registry: &ForwarderRegistry) -> Vec<u8> {
    let header = match unpack_giop_header(&frame[..GIOP_HEADER_LEN]) {
        Ok(header) => header,
        Err(_) => return frame,
    };
    if header.message_type != MessageType::Reply {
        return frame;
    }

    let little_endian = header.little_endian();
    let message_body = &frame[GIOP_HEADER_LEN..GIOP_HEADER_LEN + header.size as usize];

    let (reply_header, body_offset) = match unpack_reply_header(message_body, little_endian) {
        Ok(parsed) => parsed,
        Err(_) => return frame,
    };
    if reply_header.reply_status != ReplyStatus::NoException {
        return frame;
    }

    let reply_body = &message_body[body_offset..];
    let Some((ior, start, stop)) = find_ior(reply_body, little_endian) else {
        return frame;
    };

    let entry = match registry.ensure(&ior.host_str(), ior.port).await {
        Ok(entry) => entry,
        Err(error) => {
            warn!(%error, host = %ior.host_str(), port = ior.port, "bind failure on dynamic listener, forwarding reply unchanged");
            return frame;
        }
    };

    let mut new_ior = ior;
    new_ior.host = entry.local_host;
    new_ior.port = entry.local_port;
    let new_reply_body = repack_ior(reply_body, &new_ior, start, stop);

    let mut new_message_body = Vec::with_capacity(body_offset + new_reply_body.len());
    new_message_body.extend_from_slice(&message_body[..body_offset]);
    new_message_body.extend_from_slice(&new_reply_body);

    let new_header = GiopHeader { size: new_message_body.len() as u32, ..header };
    pack_giop(&new_header, &new_message_body)
}

mod header;
mod ior;
mod reply;

pub use header::{pack_giop, unpack_giop_header, GiopHeader, MessageType, GIOP_HEADER_LEN};
pub use ior::{find_ior, repack_ior, Ior};
pub use reply::{unpack_reply_header, ReplyHeader, ReplyStatus};

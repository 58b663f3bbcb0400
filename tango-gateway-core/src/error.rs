use std::net::SocketAddr;

use thiserror::Error;

/// Errors produced while decoding a GIOP message or the IOR embedded in a
/// Reply body. These always terminate the connection they were read from;
/// they never propagate to sibling connections or to the registry.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed GIOP header: {0}")]
    MalformedHeader(String),

    #[error("malformed reply header: {0}")]
    MalformedReply(String),

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },
}

/// Top-level error type for the gateway.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    UpstreamConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

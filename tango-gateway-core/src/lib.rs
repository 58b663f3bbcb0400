#![forbid(unsafe_code)]

pub mod cdr;
pub mod config;
pub mod error;
pub mod frame;
pub mod giop;
pub mod logging;
pub mod metrics;
pub mod pipe;
pub mod registry;
pub mod server;

pub use config::GatewayConfig;
pub use error::{ProtocolError, ProxyError, Result};
pub use server::GatewayServer;

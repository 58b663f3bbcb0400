//! Gateway configuration (`spec.md` §6). Built by the CLI layer; this
//! crate only holds the resolved shape, never parses arguments or
//! environment variables itself.

use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: IpAddr,
    pub server_port: u16,
    pub tango_host: String,
    pub tango_port: u16,
}

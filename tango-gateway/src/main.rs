#![forbid(unsafe_code)]

use std::net::IpAddr;
use std::process::ExitCode;

use clap::Parser;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use tango_gateway_core::{GatewayConfig, GatewayServer, ProxyError};
use tokio::sync::watch;
use tracing::{error, info};

/// Makes a Tango database and the device servers it advertises reachable
/// through one bind address, rewriting device IORs to point back at
/// gateway-local forwarders.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tango GIOP inspecting gateway")]
struct Cli {
    /// IPv4 address to bind the gateway and its dynamic forwarders on.
    /// Mutually exclusive with --interface.
    #[arg(short, long, value_name = "ADDRESS", conflicts_with = "interface")]
    bind: Option<IpAddr>,

    /// Network interface to derive the bind address from, optionally
    /// `name:index` to pick the Nth address on that interface.
    #[arg(short, long, value_name = "IFACE[:INDEX]", conflicts_with = "bind")]
    interface: Option<String>,

    /// Port for the gateway's root listener.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Tango database endpoint as host:port. Falls back to TANGO_HOST.
    #[arg(short, long, value_name = "HOST:PORT")]
    tango: Option<String>,
}

impl Cli {
    fn resolve(self) -> Result<GatewayConfig, ProxyError> {
        let bind_address = match (self.bind, self.interface) {
            (Some(addr), None) => addr,
            (None, Some(spec)) => resolve_interface_address(&spec)?,
            (None, None) => {
                return Err(ProxyError::Configuration(
                    "one of --bind or --interface is required".into(),
                ))
            }
            (Some(_), Some(_)) => unreachable!("clap enforces --bind/--interface mutual exclusion"),
        };

        let tango = self
            .tango
            .or_else(|| std::env::var("TANGO_HOST").ok())
            .ok_or_else(|| {
                ProxyError::Configuration("--tango not set and TANGO_HOST is not in the environment".into())
            })?;
        let (tango_host, tango_port) = split_host_port(&tango)?;

        Ok(GatewayConfig { bind_address, server_port: self.port, tango_host, tango_port })
    }
}

fn split_host_port(value: &str) -> Result<(String, u16), ProxyError> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| ProxyError::Configuration(format!("expected host:port, got '{value}'")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ProxyError::Configuration(format!("invalid port in '{value}'")))?;
    Ok((host.to_string(), port))
}

fn resolve_interface_address(spec: &str) -> Result<IpAddr, ProxyError> {
    let (name, index) = match spec.split_once(':') {
        Some((name, index)) => {
            let index: usize = index
                .parse()
                .map_err(|_| ProxyError::Configuration(format!("invalid interface index in '{spec}'")))?;
            (name, index)
        }
        None => (spec, 0),
    };

    let interfaces = NetworkInterface::show()
        .map_err(|e| ProxyError::Configuration(format!("failed to enumerate network interfaces: {e}")))?;

    let interface = interfaces
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| ProxyError::Configuration(format!("no such interface '{name}'")))?;

    let addresses: Vec<IpAddr> = interface
        .addr
        .unwrap_or_default()
        .into_iter()
        .filter_map(|addr| match addr {
            Addr::V4(v4) => Some(IpAddr::V4(v4.ip)),
            Addr::V6(_) => None,
        })
        .collect();

    addresses.into_iter().nth(index).ok_or_else(|| {
        ProxyError::Configuration(format!("interface '{name}' has no IPv4 address at index {index}"))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = tango_gateway_core::logging::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }

    let config = match Cli::parse().resolve() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "configuration error");
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = GatewayServer::new(config, shutdown_rx);

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, initiating graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(ProxyError::BindFailure { addr, source }) => {
            error!(%addr, %source, "failed to bind root listener");
            ExitCode::from(2)
        }
        Err(error) => {
            error!(%error, "gateway exited with an error");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        let (host, port) = split_host_port("tango-db.local:10000").unwrap();
        assert_eq!(host, "tango-db.local");
        assert_eq!(port, 10000);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(split_host_port("tango-db.local").is_err());
    }

    #[test]
    fn resolve_requires_bind_or_interface() {
        let cli = Cli { bind: None, interface: None, port: 8000, tango: Some("host:1".into()) };
        assert!(matches!(cli.resolve(), Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn resolve_falls_back_to_tango_host_env() {
        std::env::set_var("TANGO_HOST", "fallback-db:10000");
        let cli = Cli {
            bind: Some("127.0.0.1".parse().unwrap()),
            interface: None,
            port: 8000,
            tango: None,
        };
        let config = cli.resolve().unwrap();
        assert_eq!(config.tango_host, "fallback-db");
        assert_eq!(config.tango_port, 10000);
        std::env::remove_var("TANGO_HOST");
    }
}

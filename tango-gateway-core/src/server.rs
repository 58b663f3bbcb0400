//! Gateway server (`spec.md` §4.6): binds the root listener, connects each
//! accepted client to the Tango database, and runs an inspecting pipe
//! between them. Owns the forwarder registry and the shutdown signal that
//! both the root listener and every dynamic listener race against.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::ProxyError;
use crate::metrics::ConnectionCount;
use crate::pipe::inspecting_pipe;
use crate::registry::ForwarderRegistry;

pub struct GatewayServer {
    config: GatewayConfig,
    registry: Arc<ForwarderRegistry>,
    connections: Arc<ConnectionCount>,
    shutdown: watch::Receiver<bool>,
    /// One handle per accepted client's `inspecting_pipe` task, awaited at
    /// shutdown so a still-connected client is drained rather than abandoned.
    client_tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, shutdown: watch::Receiver<bool>) -> Self {
        let registry = Arc::new(ForwarderRegistry::new(config.bind_address, shutdown.clone()));
        Self {
            config,
            registry,
            connections: Arc::new(ConnectionCount::default()),
            shutdown,
            client_tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Runs the accept loop until the shutdown signal fires, then drains
    /// every dynamic forwarder before returning. Only a root `BindFailure`
    /// is fatal; every other failure is connection-scoped (`spec.md` §7).
    pub async fn run(&self) -> Result<(), ProxyError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.server_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::BindFailure { addr, source })?;
        info!(%addr, "gateway listening");

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((client, peer)) => self.spawn_client(client, peer),
                        Err(error) => warn!(%error, "accept failed on root listener"),
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("shutdown signal received, closing root listener");
                        break;
                    }
                }
            }
        }

        self.registry.drain().await;
        let client_handles: Vec<_> = std::mem::take(&mut *self.client_tasks.lock().unwrap());
        for handle in client_handles {
            let _ = handle.await;
        }
        info!("all dynamic forwarders and inspecting pipes drained, exiting");
        Ok(())
    }

    fn spawn_client(&self, client: TcpStream, peer: SocketAddr) {
        self.connections.increment();
        let snapshot = self.connections.snapshot();
        info!(%peer, current = snapshot.current, total = snapshot.total, "accepted client connection");

        let registry = self.registry.clone();
        let connections = self.connections.clone();
        let tango_host = self.config.tango_host.clone();
        let tango_port = self.config.tango_port;
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            match TcpStream::connect((tango_host.as_str(), tango_port)).await {
                Ok(database) => inspecting_pipe(client, database, registry, shutdown).await,
                Err(source) => {
                    connections.increment_errors();
                    let error = ProxyError::UpstreamConnectFailure { addr: format!("{tango_host}:{tango_port}"), source };
                    warn!(%peer, %error, "closing client after database connect failure");
                }
            }
            connections.decrement();
        });

        let mut guard = self.client_tasks.lock().unwrap();
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }
}

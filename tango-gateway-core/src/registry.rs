//! Forwarder registry (`spec.md` §4.3).
//!
//! Maps a backend `(host, port)` discovered in a rewritten IOR to the
//! dynamic listener the gateway advertises in its place. Entries are never
//! evicted (`spec.md` §9 — eviction policy is explicitly out of scope).

use std::net::IpAddr;
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::pipe::transparent_pipe;

/// Pushes `handle` onto `tasks`, first dropping any handle that has already
/// finished so a long-running gateway with many short-lived connections
/// doesn't accumulate a handle per connection forever.
fn track(tasks: &StdMutex<Vec<JoinHandle<()>>>, handle: JoinHandle<()>) {
    let mut guard = tasks.lock().unwrap();
    guard.retain(|h| !h.is_finished());
    guard.push(handle);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderEntry {
    /// `bind_address` encoded as an IIOP host string, trailing NUL included.
    pub local_host: Vec<u8>,
    pub local_port: u16,
}

type Key = (String, u16);

/// Owns every dynamic listener spawned for a backend discovered in an IOR.
/// The only shared mutable state in the gateway (`spec.md` §5); `entries`
/// gives lock-free reads on the hot path (an IOR for an already-registered
/// backend), `bind_lock` serializes the rare "first sighting" path so at
/// most one listener is ever bound per key.
pub struct ForwarderRegistry {
    entries: DashMap<Key, ForwarderEntry>,
    bind_lock: Mutex<()>,
    bind_address: IpAddr,
    shutdown: watch::Receiver<bool>,
    /// One handle per dynamic listener's accept loop (`run_forwarder`).
    listener_tasks: StdMutex<Vec<JoinHandle<()>>>,
    /// One handle per accepted `transparent_pipe`, across every listener.
    /// Shared with `run_forwarder` so it can push into it from outside
    /// `&self` (the accept loop runs detached from the registry itself).
    connection_tasks: Arc<StdMutex<Vec<JoinHandle<()>>>>,
}

impl ForwarderRegistry {
    pub fn new(bind_address: IpAddr, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            entries: DashMap::new(),
            bind_lock: Mutex::new(()),
            bind_address,
            shutdown,
            listener_tasks: StdMutex::new(Vec::new()),
            connection_tasks: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Returns the forwarder entry for `(backend_host, backend_port)`,
    /// binding a fresh dynamic listener on first sighting. Concurrent
    /// callers racing on the same key all observe the same entry
    /// (`spec.md` §8's idempotent-registration property).
    pub async fn ensure(&self, backend_host: &str, backend_port: u16) -> std::io::Result<ForwarderEntry> {
        let key = (backend_host.to_string(), backend_port);
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }

        let _guard = self.bind_lock.lock().await;
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }

        let listener = TcpListener::bind((self.bind_address, 0)).await?;
        let local_port = listener.local_addr()?.port();
        let mut local_host = self.bind_address.to_string().into_bytes();
        local_host.push(0);
        let entry = ForwarderEntry { local_host, local_port };

        info!(backend_host, backend_port, local_port, "registered dynamic forwarder");
        self.entries.insert(key, entry.clone());

        let backend_host = backend_host.to_string();
        let shutdown = self.shutdown.clone();
        let connection_tasks = self.connection_tasks.clone();
        let handle = tokio::spawn(run_forwarder(listener, backend_host, backend_port, shutdown, connection_tasks));
        track(&self.listener_tasks, handle);

        Ok(entry)
    }

    /// All entries currently registered, for introspection at shutdown.
    pub fn snapshot(&self) -> Vec<(Key, ForwarderEntry)> {
        self.entries.iter().map(|kv| (kv.key().clone(), kv.value().clone())).collect()
    }

    /// Waits for every dynamic listener's accept loop to observe shutdown and
    /// exit, then waits for every `transparent_pipe` those listeners accepted
    /// to finish relaying (`spec.md` §4.6). Must be called after the
    /// shutdown signal has been sent.
    pub async fn drain(&self) {
        let listener_handles: Vec<_> = std::mem::take(&mut *self.listener_tasks.lock().unwrap());
        for handle in listener_handles {
            let _ = handle.await;
        }
        let connection_handles: Vec<_> = std::mem::take(&mut *self.connection_tasks.lock().unwrap());
        for handle in connection_handles {
            let _ = handle.await;
        }
    }
}

async fn run_forwarder(
    listener: TcpListener,
    backend_host: String,
    backend_port: u16,
    mut shutdown: watch::Receiver<bool>,
    connection_tasks: Arc<StdMutex<Vec<JoinHandle<()>>>>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((client, peer)) => {
                        let backend_host = backend_host.clone();
                        let handle = tokio::spawn(async move {
                            match TcpStream::connect((backend_host.as_str(), backend_port)).await {
                                Ok(backend) => {
                                    if let Err(error) = transparent_pipe(client, backend).await {
                                        warn!(%peer, backend_host, backend_port, %error, "transparent pipe ended with an error");
                                    }
                                }
                                Err(error) => {
                                    warn!(%peer, backend_host, backend_port, %error, "failed to connect to backend, closing client");
                                }
                            }
                        });
                        track(&connection_tasks, handle);
                    }
                    Err(error) => warn!(%error, "accept failed on dynamic forwarder"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn registry() -> ForwarderRegistry {
        let (_tx, rx) = watch::channel(false);
        ForwarderRegistry::new(IpAddr::V4(Ipv4Addr::LOCALHOST), rx)
    }

    #[tokio::test]
    async fn ensure_creates_one_listener_per_key() {
        let registry = registry();
        let first = registry.ensure("10.0.0.5", 45678).await.unwrap();
        let second = registry.ensure("10.0.0.5", 45678).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn ensure_creates_distinct_listeners_for_distinct_keys() {
        let registry = registry();
        let first = registry.ensure("10.0.0.5", 45678).await.unwrap();
        let second = registry.ensure("10.0.0.6", 45678).await.unwrap();
        assert_ne!(first.local_port, second.local_port);
    }

    #[tokio::test]
    async fn concurrent_ensure_calls_converge_on_one_entry() {
        let registry = std::sync::Arc::new(registry());
        let a = registry.clone();
        let b = registry.clone();
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.ensure("10.0.0.5", 45678).await.unwrap() }),
            tokio::spawn(async move { b.ensure("10.0.0.5", 45678).await.unwrap() }),
        );
        assert_eq!(ra.unwrap().local_port, rb.unwrap().local_port);
        assert_eq!(registry.snapshot().len(), 1);
    }
}

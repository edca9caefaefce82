//! The server: accepts clients, feeds the registry, refreshes on a tick.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use heartwatch_types::{Call, Reply, Timestamp, DEFAULT_HOSTNAME, DEFAULT_PORT};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::endpoint::DEFAULT_PROBE_TIMEOUT;
use crate::error::Result;
use crate::registry::{RegistryEvent, ServerRegistry};
use crate::rpc::{Handler, Peer};
use crate::scheduler::{Scheduler, DEFAULT_TICK_INTERVAL};
use crate::transport::Transport;

/// A running heartwatch server.
///
/// Owns the [`ServerRegistry`]; everything that needs the registry gets it
/// from here by reference, so two servers in one process never share state.
///
/// # Example
///
/// ```rust,no_run
/// use heartwatch_sdk::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), heartwatch_sdk::Error> {
///     let server = Server::builder().port(50555).bind().await?;
///
///     // ... later
///     for record in server.registry().registry_snapshot() {
///         println!("{}: {}", record.name, record.state);
///     }
///
///     server.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    registry: Arc<ServerRegistry>,
    local_addr: SocketAddr,
    start_time: Timestamp,
    last_tick: Arc<Mutex<Timestamp>>,
    scheduler: Scheduler,
    stop_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    sessions: Arc<Mutex<Vec<Weak<Peer>>>>,
    checks: IdentityChecks,
}

/// In-flight identity checks. `None` once the server is shutting down.
type IdentityChecks = Arc<Mutex<Option<JoinSet<()>>>>;

impl Server {
    /// Create a builder for configuring the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The registry of connected clients.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// When the server started.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Time of the most recent tick.
    pub fn last_time(&self) -> Timestamp {
        *self.last_tick.lock()
    }

    /// The interval between refresh ticks.
    pub fn tick_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// A cloneable read-only view of this server, for front ends.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: self.registry.clone(),
            local_addr: self.local_addr,
            start_time: self.start_time,
            last_tick: self.last_tick.clone(),
        }
    }

    /// Stop the server.
    ///
    /// The refresh scheduler is stopped first, then the listener, then every
    /// open session is closed. No probe or identity check is in flight once
    /// this returns.
    pub async fn shutdown(mut self) {
        self.scheduler.stop().await;

        let _ = self.stop_tx.send(true);
        let _ = (&mut self.accept_task).await;

        let sessions: Vec<Arc<Peer>> = self
            .sessions
            .lock()
            .drain(..)
            .filter_map(|session| session.upgrade())
            .collect();
        for session in &sessions {
            session.close();
        }

        // Closing the sessions fails their pending calls, so this is quick.
        let checks = self.checks.lock().take();
        if let Some(mut checks) = checks {
            while let Some(result) = checks.join_next().await {
                if let Err(e) = result {
                    warn!("Identity check task failed: {}", e);
                }
            }
        }

        // Every session's handler holds an event sender; once they are all
        // closed the writer drains and exits.
        drop(sessions);
        if tokio::time::timeout(Duration::from_secs(1), &mut self.writer_task)
            .await
            .is_err()
        {
            self.writer_task.abort();
        }

        info!("Server on {} stopped", self.local_addr);
    }
}

/// Read-only view of a running [`Server`].
///
/// Stays valid after the server shuts down; the registry empties as its
/// sessions close.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    registry: Arc<ServerRegistry>,
    local_addr: SocketAddr,
    start_time: Timestamp,
    last_tick: Arc<Mutex<Timestamp>>,
}

impl ServerHandle {
    /// The registry of connected clients.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// When the server started.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// Time of the most recent tick.
    pub fn last_time(&self) -> Timestamp {
        *self.last_tick.lock()
    }
}

/// Builder for configuring a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    hostname: String,
    port: u16,
    tick_interval: Duration,
    probe_timeout: Duration,
}

impl ServerBuilder {
    /// Create a builder with the default address and timings.
    pub fn new() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Hostname or address to bind.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Port to bind. Zero picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Interval between refresh ticks.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Bound on each client probe during a refresh.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Bind the listener and start serving.
    pub async fn bind(self) -> Result<Server> {
        let listener = TcpListener::bind((self.hostname.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let registry = Arc::new(ServerRegistry::with_probe_timeout(self.probe_timeout));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let checks: IdentityChecks = Arc::new(Mutex::new(Some(JoinSet::new())));

        let writer_registry = registry.clone();
        let writer_task = tokio::spawn(async move {
            writer_registry.run_events(events_rx).await;
        });

        let accept_task = tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            events_tx,
            sessions.clone(),
            checks.clone(),
            stop_rx,
        ));

        let start_time = Utc::now();
        let last_tick = Arc::new(Mutex::new(start_time));
        let tick_registry = registry.clone();
        let tick_clock = last_tick.clone();
        let scheduler = Scheduler::start(self.tick_interval, move || {
            let registry = tick_registry.clone();
            let clock = tick_clock.clone();
            async move {
                *clock.lock() = Utc::now();
                registry.refresh().await;
            }
        });

        Ok(Server {
            registry,
            local_addr,
            start_time,
            last_tick,
            scheduler,
            stop_tx,
            accept_task,
            writer_task,
            sessions,
            checks,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ServerRegistry>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    sessions: Arc<Mutex<Vec<Weak<Peer>>>>,
    checks: IdentityChecks,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let _ = stream.set_nodelay(true);
                    let (reader, writer) = stream.into_split();
                    let service = Arc::new(SessionService::new(
                        registry.clone(),
                        events.clone(),
                        checks.clone(),
                    ));
                    let peer = Peer::spawn(reader, writer, service, addr.to_string());
                    debug!("Accepted connection from {}", addr);

                    let mut sessions = sessions.lock();
                    sessions.retain(|s| s.strong_count() > 0);
                    sessions.push(Arc::downgrade(&peer));
                }
                Err(e) => warn!("Accept failed: {}", e),
            },
            _ = stop_rx.changed() => break,
        }
    }
}

/// Serves the remote surface for one client connection.
///
/// Posts `Connected` after a valid hello and `Disconnected` when a
/// registered connection closes. Both carry this session's handle.
struct SessionService {
    registry: Arc<ServerRegistry>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    checks: IdentityChecks,
    name: Mutex<Option<String>>,
}

impl SessionService {
    fn new(
        registry: Arc<ServerRegistry>,
        events: mpsc::UnboundedSender<RegistryEvent>,
        checks: IdentityChecks,
    ) -> Self {
        Self {
            registry,
            events,
            checks,
            name: Mutex::new(None),
        }
    }

    fn hello(&self, peer: &Arc<Peer>, name: String, compatible: bool) -> Reply {
        if name.trim().is_empty() {
            return Reply::Error("name must not be empty".to_string());
        }
        if !compatible {
            return Reply::Error("unsupported protocol version".to_string());
        }

        let mut registered = self.name.lock();
        if registered.is_some() {
            return Reply::Error("hello already received".to_string());
        }

        let event = RegistryEvent::Connected {
            name: name.clone(),
            handle: session_handle(peer),
        };
        if self.events.send(event).is_err() {
            return Reply::Error("server is shutting down".to_string());
        }

        info!(client = %name, "Hello from {}", peer.label());
        if let Some(checks) = self.checks.lock().as_mut() {
            // Reap finished checks so the set only holds live ones.
            while checks.try_join_next().is_some() {}
            checks.spawn(verify_identity(
                peer.clone(),
                name.clone(),
                self.registry.probe_timeout(),
            ));
        }
        *registered = Some(name);
        Reply::Value(true)
    }
}

fn session_handle(peer: &Arc<Peer>) -> Weak<dyn Transport> {
    let transport: Arc<dyn Transport> = peer.clone();
    Arc::downgrade(&transport)
}

/// Ask a newly registered client to confirm the name it declared.
///
/// A client that denies it is disconnected. Faults and timeouts are left to
/// the regular refresh.
async fn verify_identity(peer: Arc<Peer>, name: String, timeout: Duration) {
    let check = Call::Check { name: name.clone() };
    match tokio::time::timeout(timeout, peer.request(check)).await {
        Ok(Ok(true)) => debug!(client = %name, "Identity confirmed"),
        Ok(Ok(false)) => {
            warn!(client = %name, "Client on {} denied its declared name, closing", peer.label());
            peer.close();
        }
        Ok(Err(e)) => debug!(client = %name, "Identity check failed: {}", e),
        Err(_) => debug!(client = %name, "Identity check timed out"),
    }
}

impl Handler for SessionService {
    fn handle(&self, peer: &Arc<Peer>, call: Call) -> Reply {
        match call {
            Call::Hello { name, version } => self.hello(peer, name, version.is_compatible()),
            Call::Ping { name } => {
                if self.name.lock().is_none() {
                    return Reply::Error("hello required".to_string());
                }
                Reply::Value(self.registry.exposed_liveness_check(&name))
            }
            Call::Check { .. } => Reply::Error("check is served by clients".to_string()),
        }
    }

    fn on_close(&self, peer: &Arc<Peer>) {
        if let Some(name) = self.name.lock().take() {
            info!(client = %name, "Connection from {} closed", peer.label());
            let _ = self.events.send(RegistryEvent::Disconnected {
                name,
                handle: session_handle(peer),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn shutdown_waits_for_identity_checks() {
        let server = Server::builder()
            .hostname("127.0.0.1")
            .port(0)
            .tick_interval(Duration::from_secs(3600))
            .probe_timeout(Duration::from_secs(30))
            .bind()
            .await
            .unwrap();
        let checks = server.checks.clone();

        // Say hello by hand and never answer the check that follows.
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"frame\":\"request\",\"id\":1,\"call\":{\"method\":\"hello\",\"name\":\"Alpha\"}}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let mut saw_check = false;
        for _ in 0..2 {
            let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            saw_check |= line.contains("\"check\"");
        }
        assert!(saw_check);
        assert_eq!(checks.lock().as_ref().map(|c| c.len()), Some(1));

        tokio::time::timeout(Duration::from_secs(5), server.shutdown())
            .await
            .expect("shutdown should not wait out the check timeout");
        assert!(checks.lock().is_none());
    }
}

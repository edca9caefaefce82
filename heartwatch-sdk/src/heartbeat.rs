//! Client-side liveness loop and self-status.

use std::sync::Arc;
use std::time::Duration;

use heartwatch_types::{Call, ClientSelfStatus, ProtocolVersion, Reply, StatusState, Timestamp};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tracing::{debug, error, info};

use crate::endpoint::{ConnectionEndpoint, DEFAULT_PROBE_TIMEOUT};
use crate::error::{Error, Result};
use crate::rpc::{Handler, Peer};
use crate::transport::Transport;

/// Default bound on opening a connection, including the hello handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client-side heartbeat: one connection to the server and the client's own
/// view of it.
///
/// All methods take `&self`, so a heartbeat can be shared between the
/// scheduler driving it and a front end reading it.
///
/// # Example
///
/// ```rust,no_run
/// use heartwatch_sdk::ClientHeartbeat;
///
/// #[tokio::main]
/// async fn main() {
///     let heartbeat = ClientHeartbeat::new("worker-1");
///     heartbeat.connect("localhost", 50555).await;
///
///     heartbeat.on_scheduled_tick().await;
///     println!("{}", heartbeat.status());
/// }
/// ```
#[derive(Debug)]
pub struct ClientHeartbeat {
    name: String,
    endpoint: RwLock<ConnectionEndpoint>,
    status: Mutex<ClientSelfStatus>,
    probe_timeout: Duration,
    connect_timeout: Duration,
}

impl ClientHeartbeat {
    /// Create a heartbeat for a client called `name`. Not yet connected.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: RwLock::new(ConnectionEndpoint::unconnected()),
            status: Mutex::new(ClientSelfStatus::new()),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the bound on each liveness probe.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the bound on opening a connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The identity this client registers under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new connection to the server and register.
    ///
    /// Makes exactly one attempt. A failure is logged and leaves the current
    /// endpoint and state untouched; retrying is up to the caller.
    pub async fn connect(&self, hostname: &str, port: u16) {
        match self.open(hostname, port).await {
            Ok(peer) => {
                info!(client = %self.name, "Connected to {}:{}", hostname, port);
                self.attach(peer);
            }
            Err(e) => {
                error!(client = %self.name, "Connection to {}:{} failed: {}", hostname, port, e);
            }
        }
        self.recompute();
    }

    /// Use an already-open transport as the connection to the server.
    ///
    /// Any previous connection is closed.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        let endpoint = ConnectionEndpoint::to_server(transport, &self.name, self.probe_timeout);
        let previous = std::mem::replace(&mut *self.endpoint.write(), endpoint.clone());
        if !previous.same_transport(&endpoint) {
            previous.close();
        }
    }

    /// One scheduler tick: advance the clock, then probe the server.
    ///
    /// The probe's answer is not used directly. Only the connection check
    /// that follows drives the state, so a failed probe on a channel that
    /// still reports open leaves the client `Connected` until the transport
    /// notices.
    pub async fn on_scheduled_tick(&self) {
        self.status.lock().tick();

        // Clone out of the lock so the probe runs without holding it.
        let endpoint = self.endpoint.read().clone();
        let alive = endpoint.probe_liveness().await;
        debug!(client = %self.name, alive, "Heartbeat probe finished");

        self.recompute();
    }

    /// Recompute and return the connection state.
    pub fn status(&self) -> StatusState {
        self.recompute()
    }

    /// Recompute and return a copy of the full self-status.
    pub fn self_status(&self) -> ClientSelfStatus {
        self.recompute();
        self.status.lock().clone()
    }

    /// When the monitoring loop began.
    pub fn start_time(&self) -> Timestamp {
        self.status.lock().start_time
    }

    /// Time of the most recent tick.
    pub fn last_time(&self) -> Timestamp {
        self.status.lock().current_time
    }

    /// Returns true if no usable connection to the server exists.
    pub fn is_closed(&self) -> bool {
        self.endpoint.read().is_closed()
    }

    /// Answer the server's identity check.
    pub fn check(&self, name: &str) -> bool {
        name == self.name
    }

    /// Close the connection to the server.
    pub fn close(&self) {
        self.endpoint.read().close();
    }

    fn recompute(&self) -> StatusState {
        let closed = self.endpoint.read().is_closed();
        self.status.lock().recompute(closed)
    }

    async fn open(&self, hostname: &str, port: u16) -> Result<Arc<Peer>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((hostname, port)))
            .await
            .map_err(|_| {
                Error::TransportUnavailable(format!("timed out connecting to {}:{}", hostname, port))
            })?
            .map_err(|e| Error::TransportUnavailable(e.to_string()))?;
        let _ = stream.set_nodelay(true);

        let (reader, writer) = stream.into_split();
        let service = Arc::new(ClientService {
            name: self.name.clone(),
        });
        let peer = Peer::spawn(reader, writer, service, format!("{}:{}", hostname, port));

        let hello = Call::Hello {
            name: self.name.clone(),
            version: ProtocolVersion::current(),
        };
        let outcome = match tokio::time::timeout(self.connect_timeout, peer.request(hello)).await {
            Ok(Ok(true)) => return Ok(peer),
            Ok(Ok(false)) => Error::Rejected("server declined".to_string()),
            Ok(Err(Error::Remote(message))) => Error::Rejected(message),
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout,
        };

        peer.close();
        Err(outcome)
    }
}

/// The remote surface a client exposes to the server.
#[derive(Debug)]
struct ClientService {
    name: String,
}

impl Handler for ClientService {
    fn handle(&self, _peer: &Arc<Peer>, call: Call) -> Reply {
        match call {
            Call::Check { name } => Reply::Value(name == self.name),
            other => Reply::Error(format!("{} is not served by clients", other.method())),
        }
    }
}

//! A client process's heartbeat loop.

use std::sync::Arc;
use std::time::Duration;

use heartwatch_types::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use tracing::{debug, info};

use crate::endpoint::DEFAULT_PROBE_TIMEOUT;
use crate::heartbeat::{ClientHeartbeat, DEFAULT_CONNECT_TIMEOUT};
use crate::scheduler::{Scheduler, DEFAULT_TICK_INTERVAL};

/// A running client: a [`ClientHeartbeat`] driven by its own [`Scheduler`].
///
/// # Example
///
/// ```rust,no_run
/// use heartwatch_sdk::Client;
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::builder("worker-1").port(50555).start().await;
///
///     // ... later
///     println!("{}", client.heartbeat().status());
///     client.shutdown().await;
/// }
/// ```
#[derive(Debug)]
pub struct Client {
    heartbeat: Arc<ClientHeartbeat>,
    scheduler: Scheduler,
    hostname: String,
    port: u16,
}

impl Client {
    /// Create a builder for a client called `name`.
    pub fn builder(name: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(name)
    }

    /// The heartbeat, for reading status.
    pub fn heartbeat(&self) -> &Arc<ClientHeartbeat> {
        &self.heartbeat
    }

    /// Make one connection attempt to the configured server.
    ///
    /// On success the new session replaces the current one; the server keeps
    /// the client registered across the swap.
    pub async fn reconnect(&self) {
        self.heartbeat.connect(&self.hostname, self.port).await;
    }

    /// Server address as `host:port`.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Stop the heartbeat loop, then close the connection.
    ///
    /// No probe is in flight once this returns.
    pub async fn shutdown(mut self) {
        self.scheduler.stop().await;
        self.heartbeat.close();
        info!(client = %self.heartbeat.name(), "Client stopped");
    }
}

/// Builder for configuring a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    name: String,
    hostname: String,
    port: u16,
    tick_interval: Duration,
    probe_timeout: Duration,
    connect_timeout: Duration,
    reconnect: bool,
}

impl ClientBuilder {
    /// Create a builder with the default server address and timings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: false,
        }
    }

    /// Server hostname.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Interval between heartbeat ticks.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Bound on each liveness probe.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Bound on each connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Make one connection attempt on every tick that finds the client
    /// disconnected. Off by default: the client connects once at start.
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Connect once, then start the heartbeat loop.
    ///
    /// A failed first connection is logged and the loop starts anyway.
    pub async fn start(self) -> Client {
        let heartbeat = Arc::new(
            ClientHeartbeat::new(self.name)
                .with_probe_timeout(self.probe_timeout)
                .with_connect_timeout(self.connect_timeout),
        );
        heartbeat.connect(&self.hostname, self.port).await;

        let tick_heartbeat = heartbeat.clone();
        let hostname = self.hostname.clone();
        let port = self.port;
        let reconnect = self.reconnect;
        let scheduler = Scheduler::start(self.tick_interval, move || {
            let heartbeat = tick_heartbeat.clone();
            let hostname = hostname.clone();
            async move {
                if reconnect && !heartbeat.status().is_connected() {
                    debug!(client = %heartbeat.name(), "Not connected, retrying");
                    heartbeat.connect(&hostname, port).await;
                }
                heartbeat.on_scheduled_tick().await;
            }
        });

        Client {
            heartbeat,
            scheduler,
            hostname: self.hostname,
            port: self.port,
        }
    }
}

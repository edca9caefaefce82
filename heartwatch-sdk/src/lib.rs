//! # heartwatch-sdk
//!
//! Heartbeat and registry runtime for heartwatch.
//!
//! A server keeps a registry of named client connections and answers their
//! liveness probes. Each client holds one connection to the server, probes
//! it on a fixed interval, and tracks its own connection state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heartwatch_sdk::{Client, Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), heartwatch_sdk::Error> {
//!     // Start a server on a free port
//!     let server = Server::builder().port(0).bind().await?;
//!     let port = server.local_addr().port();
//!
//!     // Start a client that heartbeats every second
//!     let client = Client::builder("worker-1")
//!         .port(port)
//!         .tick_interval(Duration::from_secs(1))
//!         .start()
//!         .await;
//!
//!     // ... later
//!     for record in server.registry().registry_snapshot() {
//!         println!("{} {}", record.name, record.state);
//!     }
//!
//!     client.shutdown().await;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Registry**: Connected clients by name, with start and last-seen times
//! - **Heartbeat**: Three-state client status that never reverts to "never connected"
//! - **Scheduler**: Non-overlapping fixed-interval ticks
//! - **Transport**: Newline-delimited JSON calls over TCP

mod client;
mod endpoint;
mod error;
mod heartbeat;
mod registry;
mod rpc;
mod scheduler;
mod server;
mod transport;

pub use client::{Client, ClientBuilder};
pub use endpoint::{ConnectionEndpoint, DEFAULT_PROBE_TIMEOUT};
pub use error::{Error, Result};
pub use heartbeat::{ClientHeartbeat, DEFAULT_CONNECT_TIMEOUT};
pub use registry::{RegistryEvent, ServerRegistry};
pub use rpc::{Handler, Peer};
pub use scheduler::{Scheduler, DEFAULT_TICK_INTERVAL};
pub use server::{Server, ServerBuilder, ServerHandle};
pub use transport::Transport;

// Re-export types for convenience
pub use heartwatch_types::{
    Call, ClientSelfStatus, ConnectionRecord, Frame, ProtocolVersion, Reply, StatusState,
    Timestamp, DEFAULT_HOSTNAME, DEFAULT_PORT, PROTOCOL_VERSION,
};

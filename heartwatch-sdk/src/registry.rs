//! Server-side registry of connected clients.

use std::collections::BTreeMap;
use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use heartwatch_types::{ConnectionRecord, StatusState, Timestamp};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::endpoint::{ConnectionEndpoint, DEFAULT_PROBE_TIMEOUT};
use crate::transport::Transport;

/// A connection lifecycle event posted by the transport layer.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A client completed its hello under `name`.
    Connected {
        name: String,
        handle: Weak<dyn Transport>,
    },
    /// The session that registered as `name` went away.
    ///
    /// Ignored if `name` has since been registered by another session.
    Disconnected {
        name: String,
        handle: Weak<dyn Transport>,
    },
}

/// One registry entry. The session is owned by the transport layer.
#[derive(Debug)]
struct Entry {
    handle: Weak<dyn Transport>,
    start_time: Timestamp,
    last_time: Timestamp,
}

impl Entry {
    fn state(&self) -> StatusState {
        match self.handle.upgrade() {
            Some(handle) if !handle.is_closed() => StatusState::Connected,
            _ => StatusState::NotConnected,
        }
    }
}

/// Authoritative table of which named clients are attached.
///
/// Every operation takes the same lock and none of them waits while holding
/// it, so the registry can be read and mutated from any task.
///
/// Registering a name that is already present replaces the earlier entry.
/// [`ServerRegistry::on_disconnect`] removes whatever entry holds the name;
/// a [`RegistryEvent::Disconnected`] only removes the entry its own session
/// created.
///
/// # Example
///
/// ```rust
/// use std::sync::Weak;
/// use heartwatch_sdk::{ServerRegistry, Transport};
///
/// let registry = ServerRegistry::new();
/// let nobody: Weak<dyn Transport> = Weak::<heartwatch_sdk::Peer>::new();
///
/// registry.on_connect("Alpha", nobody);
/// assert!(registry.exposed_liveness_check("Alpha"));
///
/// registry.on_disconnect("Alpha");
/// registry.on_disconnect("Alpha"); // absent names are ignored
/// assert_eq!(registry.count(), 0);
/// ```
#[derive(Debug)]
pub struct ServerRegistry {
    entries: Mutex<BTreeMap<String, Entry>>,
    probe_timeout: Duration,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_probe_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Create an empty registry whose refresh probes are bounded by `timeout`.
    pub fn with_probe_timeout(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            probe_timeout: timeout,
        }
    }

    /// Bound on each probe made by [`ServerRegistry::refresh`].
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Register `name`, replacing any existing entry for it.
    pub fn on_connect(&self, name: &str, handle: Weak<dyn Transport>) {
        let now = Utc::now();
        let replaced = self
            .entries
            .lock()
            .insert(
                name.to_string(),
                Entry {
                    handle,
                    start_time: now,
                    last_time: now,
                },
            )
            .is_some();

        if replaced {
            warn!(client = %name, "Duplicate registration replaced the existing entry");
        } else {
            info!(client = %name, "Client registered");
        }
    }

    /// Remove `name`.
    ///
    /// Returns `true` if an entry was removed. An absent name is a no-op.
    pub fn on_disconnect(&self, name: &str) -> bool {
        let removed = self.entries.lock().remove(name).is_some();
        if removed {
            info!(client = %name, "Client unregistered");
        } else {
            debug!(client = %name, "Disconnect for unregistered name ignored");
        }
        removed
    }

    /// Remove `name` if it is still registered by the session behind `handle`.
    ///
    /// Returns `true` if an entry was removed. A newer session under the same
    /// name is left alone.
    pub fn on_session_closed(&self, name: &str, handle: &Weak<dyn Transport>) -> bool {
        let mut entries = self.entries.lock();
        let same_session = entries
            .get(name)
            .map(|entry| Weak::ptr_eq(&entry.handle, handle));
        match same_session {
            Some(true) => {
                entries.remove(name);
                drop(entries);
                info!(client = %name, "Client unregistered");
                true
            }
            Some(false) => {
                debug!(client = %name, "Stale disconnect ignored, name re-registered");
                false
            }
            None => {
                debug!(client = %name, "Disconnect for unregistered name ignored");
                false
            }
        }
    }

    /// Apply one lifecycle event.
    pub fn apply(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::Connected { name, handle } => self.on_connect(&name, handle),
            RegistryEvent::Disconnected { name, handle } => {
                self.on_session_closed(&name, &handle);
            }
        }
    }

    /// Apply events in arrival order until every sender is dropped.
    ///
    /// This is the single writer the transport layer posts to.
    pub async fn run_events(&self, mut events: mpsc::UnboundedReceiver<RegistryEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }
        debug!("Registry event stream ended");
    }

    /// Returns true iff `name` is registered right now. No side effects.
    pub fn exposed_liveness_check(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Number of registered clients.
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Record a successful liveness confirmation for `name`.
    ///
    /// Returns `false` if the name is not registered.
    pub fn touch(&self, name: &str) -> bool {
        match self.entries.lock().get_mut(name) {
            Some(entry) => {
                entry.last_time = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Copy all records, ordered by name.
    pub fn registry_snapshot(&self) -> Vec<ConnectionRecord> {
        self.entries
            .lock()
            .iter()
            .map(|(name, entry)| ConnectionRecord {
                name: name.clone(),
                start_time: entry.start_time,
                last_time: entry.last_time,
                state: entry.state(),
            })
            .collect()
    }

    /// Probe every registered client and touch the ones that answer.
    ///
    /// Probes run concurrently, each bounded by the probe timeout, without
    /// holding the registry lock.
    pub async fn refresh(&self) {
        let endpoints: Vec<(String, ConnectionEndpoint)> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(name, entry)| {
                let handle = entry.handle.upgrade()?;
                Some((
                    name.clone(),
                    ConnectionEndpoint::to_client(handle, name, self.probe_timeout),
                ))
            })
            .collect();

        let mut probes = JoinSet::new();
        for (name, endpoint) in endpoints {
            probes.spawn(async move {
                let alive = endpoint.probe_liveness().await;
                (name, alive)
            });
        }

        while let Some(result) = probes.join_next().await {
            match result {
                Ok((name, true)) => {
                    self.touch(&name);
                }
                Ok((name, false)) => debug!(client = %name, "Client did not confirm liveness"),
                Err(e) => warn!("Liveness probe task failed: {}", e),
            }
        }
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

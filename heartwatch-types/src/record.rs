//! Records describing who is connected and since when.

use chrono::{DateTime, Utc};

use crate::StatusState;

/// Wall-clock timestamp used for start and last-seen times.
pub type Timestamp = DateTime<Utc>;

/// One registered client as seen by the server.
///
/// This is the presentation copy of a registry entry: it carries the derived
/// session state instead of the session handle itself.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionRecord {
    /// Name declared by the client in its hello. Unique within a registry.
    pub name: String,

    /// When this name was registered in the current session.
    pub start_time: Timestamp,

    /// Most recent successful liveness confirmation.
    pub last_time: Timestamp,

    /// `Connected` while the session is open, `NotConnected` once closed.
    pub state: StatusState,
}

impl ConnectionRecord {
    /// Create a record registered at `now`, with `start_time == last_time`.
    pub fn registered_at(name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            name: name.into(),
            start_time: now,
            last_time: now,
            state: StatusState::Connected,
        }
    }

    /// How long this client has been registered, as of `last_time`.
    pub fn uptime(&self) -> chrono::Duration {
        self.last_time - self.start_time
    }
}

/// A client's view of its own connection to the server.
///
/// Exactly one exists per heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientSelfStatus {
    /// When the monitoring loop began.
    pub start_time: Timestamp,

    /// Time of the last scheduler tick.
    pub current_time: Timestamp,

    /// State computed by the most recent recomputation.
    pub state: StatusState,
}

impl ClientSelfStatus {
    /// Create a status starting now, never connected.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a status starting at a specific time.
    pub fn starting_at(start_time: Timestamp) -> Self {
        Self {
            start_time,
            current_time: start_time,
            state: StatusState::NeverConnected,
        }
    }

    /// Advance `current_time` to now.
    pub fn tick(&mut self) {
        self.current_time = Utc::now();
    }

    /// Recompute `state` against the connection check and return it.
    pub fn recompute(&mut self, closed: bool) -> StatusState {
        self.state = self.state.recompute(closed);
        self.state
    }
}

impl Default for ClientSelfStatus {
    fn default() -> Self {
        Self::new()
    }
}

//! Status source abstraction for the front end.
//!
//! The front end never touches the heartbeat core directly. It polls a
//! [`StatusSource`], which copies out whatever the core currently reports.

use std::fmt::Debug;
use std::sync::Arc;

use heartwatch_sdk::{ClientHeartbeat, ServerHandle, StatusState, Timestamp};

/// Which side of the protocol a source reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// One displayed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub name: String,
    pub start_time: Timestamp,
    pub last_time: Timestamp,
    /// `None` for the server's own row.
    pub state: Option<StatusState>,
}

impl StatusRow {
    /// Label for the status column.
    pub fn status_label(&self) -> &'static str {
        match self.state {
            Some(state) => state.label(),
            None => "Running",
        }
    }
}

/// Everything a view needs for one redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub role: Role,
    pub rows: Vec<StatusRow>,
}

impl StatusView {
    /// Rows for connected clients, skipping the server's own row.
    pub fn clients(&self) -> impl Iterator<Item = &StatusRow> {
        self.rows.iter().filter(|row| row.state.is_some())
    }
}

/// Trait for reading status from a running server or client.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use heartwatch::{ClientSource, StatusSource};
/// use heartwatch_sdk::ClientHeartbeat;
///
/// let heartbeat = Arc::new(ClientHeartbeat::new("worker-1"));
/// let mut source = ClientSource::new(heartbeat, "localhost:50555");
/// let view = source.poll();
/// println!("{}", view.rows[0].status_label());
/// ```
pub trait StatusSource: Send + Debug {
    /// Copy the current status. Never blocks on the network.
    fn poll(&mut self) -> StatusView;

    /// Returns a human-readable description of the source.
    ///
    /// Used for display in the status bar.
    fn description(&self) -> &str;

    /// Which side this source reports on.
    fn role(&self) -> Role;
}

/// Reads a server: its own row first, then one row per registered client.
#[derive(Debug)]
pub struct ServerSource {
    server: ServerHandle,
    name: String,
    description: String,
}

impl ServerSource {
    pub fn new(server: ServerHandle) -> Self {
        let description = format!("server: {}", server.local_addr());
        Self {
            server,
            name: "heartwatch server".to_string(),
            description,
        }
    }
}

impl StatusSource for ServerSource {
    fn poll(&mut self) -> StatusView {
        let mut rows = vec![StatusRow {
            name: self.name.clone(),
            start_time: self.server.start_time(),
            last_time: self.server.last_time(),
            state: None,
        }];
        rows.extend(
            self.server
                .registry()
                .registry_snapshot()
                .into_iter()
                .map(|record| StatusRow {
                    name: record.name,
                    start_time: record.start_time,
                    last_time: record.last_time,
                    state: Some(record.state),
                }),
        );

        StatusView {
            role: Role::Server,
            rows,
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn role(&self) -> Role {
        Role::Server
    }
}

/// Reads a client's own status.
#[derive(Debug)]
pub struct ClientSource {
    heartbeat: Arc<ClientHeartbeat>,
    description: String,
}

impl ClientSource {
    /// `server` is only used for display.
    pub fn new(heartbeat: Arc<ClientHeartbeat>, server: &str) -> Self {
        Self {
            heartbeat,
            description: format!("client -> {}", server),
        }
    }
}

impl StatusSource for ClientSource {
    fn poll(&mut self) -> StatusView {
        let status = self.heartbeat.self_status();
        StatusView {
            role: Role::Client,
            rows: vec![StatusRow {
                name: self.heartbeat.name().to_string(),
                start_time: status.start_time,
                last_time: status.current_time,
                state: Some(status.state),
            }],
        }
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn role(&self) -> Role {
        Role::Client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_source_reports_never_connected_before_connecting() {
        let heartbeat = Arc::new(ClientHeartbeat::new("Alpha"));
        let mut source = ClientSource::new(heartbeat, "localhost:50555");

        let view = source.poll();
        assert_eq!(view.role, Role::Client);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].name, "Alpha");
        assert_eq!(view.rows[0].state, Some(StatusState::NeverConnected));
        assert_eq!(view.rows[0].status_label(), "Never Connected");
        assert_eq!(source.description(), "client -> localhost:50555");
    }

    #[tokio::test]
    async fn server_source_lists_itself_first() {
        let server = heartwatch_sdk::Server::builder()
            .hostname("127.0.0.1")
            .port(0)
            .bind()
            .await
            .unwrap();
        let mut source = ServerSource::new(server.handle());

        let view = source.poll();
        assert_eq!(view.role, Role::Server);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].state, None);
        assert_eq!(view.rows[0].status_label(), "Running");
        assert_eq!(view.clients().count(), 0);

        server.shutdown().await;
    }
}

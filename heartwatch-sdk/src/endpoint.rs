//! A connection handle that can prove its peer is alive.

use std::sync::Arc;
use std::time::Duration;

use heartwatch_types::Call;
use tracing::warn;

use crate::transport::Transport;

/// Default bound on a single liveness probe.
///
/// Kept below the default one second tick so a stalled peer reads as
/// "not alive" within one scheduling cycle.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Wraps one transport handle and answers whether it is usable right now.
///
/// An endpoint is directional: one built with [`ConnectionEndpoint::to_server`]
/// probes with `ping(name)`, one built with [`ConnectionEndpoint::to_client`]
/// probes with `check(name)`. Cloning shares the underlying transport.
///
/// The endpoint never changes a [`StatusState`](heartwatch_types::StatusState);
/// that is left to its owner.
#[derive(Debug, Clone)]
pub struct ConnectionEndpoint {
    transport: Option<Arc<dyn Transport>>,
    probe: Call,
    timeout: Duration,
}

impl ConnectionEndpoint {
    /// An endpoint with no connection behind it. Always closed.
    pub fn unconnected() -> Self {
        Self {
            transport: None,
            probe: Call::Ping {
                name: String::new(),
            },
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Client-side endpoint: probes ask the server whether `name` is registered.
    pub fn to_server(transport: Arc<dyn Transport>, name: &str, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            probe: Call::Ping {
                name: name.to_string(),
            },
            timeout,
        }
    }

    /// Server-side endpoint: probes ask the client whether it is `name`.
    pub fn to_client(transport: Arc<dyn Transport>, name: &str, timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            probe: Call::Check {
                name: name.to_string(),
            },
            timeout,
        }
    }

    /// Returns true if no connection was ever established or the transport
    /// reports it closed.
    pub fn is_closed(&self) -> bool {
        self.transport.as_ref().map_or(true, |t| t.is_closed())
    }

    /// Ask the peer to confirm liveness.
    ///
    /// Returns false without touching the transport when closed. Timeouts
    /// and transport faults are logged and read as false.
    pub async fn probe_liveness(&self) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };
        if transport.is_closed() {
            return false;
        }

        match tokio::time::timeout(self.timeout, transport.call(self.probe.clone())).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                warn!("Liveness probe ({}) failed: {}", self.probe.method(), e);
                false
            }
            Err(_) => {
                warn!(
                    "Liveness probe ({}) timed out after {:?}",
                    self.probe.method(),
                    self.timeout
                );
                false
            }
        }
    }

    /// Close the underlying transport, if any.
    pub fn close(&self) {
        if let Some(transport) = &self.transport {
            transport.close();
        }
    }

    /// The probe timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true if both endpoints share the same transport.
    pub fn same_transport(&self, other: &ConnectionEndpoint) -> bool {
        match (&self.transport, &other.transport) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for ConnectionEndpoint {
    fn default() -> Self {
        Self::unconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use std::sync::atomic::Ordering;

    fn endpoint(mock: &Arc<MockTransport>) -> ConnectionEndpoint {
        ConnectionEndpoint::to_server(mock.clone(), "Alpha", Duration::from_millis(50))
    }

    #[tokio::test]
    async fn unconnected_endpoint_is_closed_and_not_alive() {
        let endpoint = ConnectionEndpoint::unconnected();
        assert!(endpoint.is_closed());
        assert!(!endpoint.probe_liveness().await);
    }

    #[tokio::test]
    async fn closed_endpoint_never_touches_transport() {
        let mock = Arc::new(MockTransport::open());
        mock.set_closed(true);
        let endpoint = endpoint(&mock);

        for _ in 0..5 {
            assert!(!endpoint.probe_liveness().await);
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn open_endpoint_returns_peer_answer() {
        let mock = Arc::new(MockTransport::open());
        let endpoint = endpoint(&mock);

        assert!(!endpoint.is_closed());
        assert!(endpoint.probe_liveness().await);

        mock.answer.store(false, Ordering::SeqCst);
        assert!(!endpoint.probe_liveness().await);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn transport_fault_reads_as_not_alive() {
        let mock = Arc::new(MockTransport::open());
        mock.fail.store(true, Ordering::SeqCst);
        let endpoint = endpoint(&mock);

        assert!(!endpoint.probe_liveness().await);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_peer_times_out() {
        let mock = Arc::new(MockTransport::open());
        mock.hang.store(true, Ordering::SeqCst);
        let endpoint = endpoint(&mock);

        assert!(!endpoint.probe_liveness().await);
    }

    #[test]
    fn close_closes_transport() {
        let mock = Arc::new(MockTransport::open());
        let endpoint = endpoint(&mock);
        let copy = endpoint.clone();

        endpoint.close();
        assert!(copy.is_closed());
        assert!(endpoint.same_transport(&copy));
        assert!(!endpoint.same_transport(&ConnectionEndpoint::unconnected()));
    }
}

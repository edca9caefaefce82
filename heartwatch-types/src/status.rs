//! The liveness state machine.

use core::fmt;

/// Liveness state of a connection.
///
/// A connection starts out [`NeverConnected`](StatusState::NeverConnected).
/// The state is never animated forward on a timer; it is recomputed against
/// the live connection check with [`StatusState::recompute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StatusState {
    /// No connection has ever been established.
    #[default]
    NeverConnected,
    /// The connection is open.
    Connected,
    /// The connection was open at some point and has since closed.
    NotConnected,
}

impl StatusState {
    /// Recompute the state against the current connection check.
    ///
    /// Only an open connection can produce `Connected`, and only a
    /// `Connected` state can be demoted to `NotConnected`. A connection that
    /// was never opened stays `NeverConnected` even though it reports closed,
    /// which keeps "never tried" distinct from "tried and lost".
    #[must_use]
    pub fn recompute(self, closed: bool) -> Self {
        match (closed, self) {
            (true, StatusState::Connected) => StatusState::NotConnected,
            (true, other) => other,
            (false, _) => StatusState::Connected,
        }
    }

    /// Returns true if this state is `Connected`.
    pub fn is_connected(&self) -> bool {
        matches!(self, StatusState::Connected)
    }

    /// Returns the display label for this state.
    pub fn label(&self) -> &'static str {
        match self {
            StatusState::NeverConnected => "Never Connected",
            StatusState::Connected => "Connected",
            StatusState::NotConnected => "Not Connected",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_connected_survives_closed_checks() {
        let mut state = StatusState::default();
        for _ in 0..10 {
            state = state.recompute(true);
        }
        assert_eq!(state, StatusState::NeverConnected);
    }

    #[test]
    fn open_check_connects_from_any_state() {
        assert_eq!(StatusState::NeverConnected.recompute(false), StatusState::Connected);
        assert_eq!(StatusState::NotConnected.recompute(false), StatusState::Connected);
        assert_eq!(StatusState::Connected.recompute(false), StatusState::Connected);
    }

    #[test]
    fn connected_demotes_to_not_connected_and_stays() {
        let state = StatusState::Connected.recompute(true);
        assert_eq!(state, StatusState::NotConnected);

        // Further closed checks never revert to NeverConnected.
        assert_eq!(state.recompute(true), StatusState::NotConnected);
    }

    #[test]
    fn labels_match_display() {
        assert_eq!(StatusState::NeverConnected.to_string(), "Never Connected");
        assert_eq!(StatusState::Connected.to_string(), "Connected");
        assert_eq!(StatusState::NotConnected.to_string(), "Not Connected");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&StatusState::NotConnected).unwrap();
        assert_eq!(json, "\"not_connected\"");
    }
}

//! The seam between the heartbeat core and whatever carries the calls.

use std::fmt::Debug;

use async_trait::async_trait;
use heartwatch_types::Call;

use crate::error::Result;

/// A bidirectional connection able to make remote calls to its peer.
///
/// The connection itself is owned by the transport layer. The heartbeat
/// core only ever holds `Arc` (client side) or `Weak` (registry) references
/// to it.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Returns true once the connection can no longer carry calls.
    fn is_closed(&self) -> bool;

    /// Issue a call and wait for its boolean answer.
    ///
    /// No timeout is applied here; callers bound the wait themselves.
    async fn call(&self, call: Call) -> Result<bool>;

    /// Close the connection. Safe to call more than once.
    fn close(&self);
}

//! # heartwatch-types
//!
//! Core types shared by heartwatch clients, servers and front ends.
//!
//! ## Contents
//!
//! - [`StatusState`]: the three-valued liveness state of a connection
//! - [`ConnectionRecord`]: one registered client as seen by the server
//! - [`ClientSelfStatus`]: a client's view of its own connection
//! - [`Frame`], [`Call`], [`Reply`]: the RPC wire protocol (requires `serde`)
//! - [`ProtocolVersion`]: version exchanged during the hello handshake
//!
//! ## Features
//!
//! - `serde`: serialization of all types, and the wire protocol module
//!
//! ## Example
//!
//! ```rust
//! use heartwatch_types::{ClientSelfStatus, StatusState};
//!
//! let mut status = ClientSelfStatus::new();
//! assert_eq!(status.state, StatusState::NeverConnected);
//!
//! // A closed connection never moves a fresh client to NotConnected.
//! status.recompute(true);
//! assert_eq!(status.state, StatusState::NeverConnected);
//!
//! status.recompute(false);
//! assert_eq!(status.state, StatusState::Connected);
//! ```

mod record;
mod status;
mod version;

#[cfg(feature = "serde")]
mod protocol;

pub use record::*;
pub use status::*;
pub use version::*;

#[cfg(feature = "serde")]
pub use protocol::*;

/// Current protocol version.
///
/// Increment this when making breaking changes to the wire format.
/// Servers reject a hello whose major version differs.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default TCP port a heartwatch server listens on.
pub const DEFAULT_PORT: u16 = 50555;

/// Default hostname clients connect to.
pub const DEFAULT_HOSTNAME: &str = "localhost";

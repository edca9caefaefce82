//! Protocol versioning for the hello handshake.

use crate::PROTOCOL_VERSION;

/// Protocol version sent by a client in its hello.
///
/// This allows a server to refuse clients speaking an incompatible format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolVersion {
    /// Major version - breaking changes increment this.
    pub major: u32,

    /// Minor version - backwards-compatible additions increment this.
    pub minor: u32,
}

impl ProtocolVersion {
    /// Create a new protocol version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The protocol version spoken by this library.
    pub const fn current() -> Self {
        Self {
            major: PROTOCOL_VERSION,
            minor: 0,
        }
    }

    /// Returns true if the major version matches (minor differences are OK).
    pub fn is_compatible(&self) -> bool {
        self.major == PROTOCOL_VERSION
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::current()
    }
}

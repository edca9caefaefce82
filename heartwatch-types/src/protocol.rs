//! Wire protocol frames.
//!
//! Every message on a heartwatch connection is one JSON object on one line.
//! Both sides may issue requests; responses are matched by `id`.
//!
//! ```text
//! {"frame":"request","id":1,"call":{"method":"ping","name":"Alpha"}}
//! {"frame":"response","id":1,"reply":{"value":true}}
//! ```

use serde::{Deserialize, Serialize};

use crate::ProtocolVersion;

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    /// A call the receiver should answer.
    Request {
        /// Sender-chosen id, echoed in the response.
        id: u64,
        /// What is being asked.
        call: Call,
    },
    /// The answer to an earlier request.
    Response {
        /// Id of the request being answered.
        id: u64,
        /// The answer.
        reply: Reply,
    },
}

/// Remote-callable operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Call {
    /// Client to server: declare identity. Must be the first call.
    Hello {
        /// Name the client registers under.
        name: String,
        /// Protocol version the client speaks.
        #[serde(default)]
        version: ProtocolVersion,
    },
    /// Client to server: is `name` currently registered?
    Ping {
        /// Name to look up.
        name: String,
    },
    /// Server to client: is `name` this client's identity?
    Check {
        /// Name to compare.
        name: String,
    },
}

impl Call {
    /// The method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Call::Hello { .. } => "hello",
            Call::Ping { .. } => "ping",
            Call::Check { .. } => "check",
        }
    }
}

/// Result of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// The call succeeded with a boolean answer.
    Value(bool),
    /// The call was refused or could not be handled.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_json_shape() {
        let frame = Frame::Request {
            id: 1,
            call: Call::Ping {
                name: "Alpha".to_string(),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"frame":"request","id":1,"call":{"method":"ping","name":"Alpha"}}"#
        );
    }

    #[test]
    fn response_json_shape() {
        let frame = Frame::Response {
            id: 9,
            reply: Reply::Value(true),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"frame":"response","id":9,"reply":{"value":true}}"#);
    }

    #[test]
    fn hello_without_version_defaults_to_current() {
        let json = r#"{"frame":"request","id":1,"call":{"method":"hello","name":"Alpha"}}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        match frame {
            Frame::Request {
                call: Call::Hello { name, version },
                ..
            } => {
                assert_eq!(name, "Alpha");
                assert_eq!(version, ProtocolVersion::current());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let json = r#"{"frame":"request","id":1,"call":{"method":"shutdown"}}"#;
        assert!(serde_json::from_str::<Frame>(json).is_err());
    }
}

//! Envelope type for the Relay protocol.
//!
//! An envelope is the unit every connected client receives: either a message
//! relayed from another peer or a notice generated by the hub itself.

use serde::{Deserialize, Serialize};

/// Notice content sent to existing peers when a new peer registers.
pub const JOINED_NOTICE: &str = "/A new socket has connected.";

/// Notice content sent to remaining peers when a peer is unregistered.
pub const LEFT_NOTICE: &str = "/A socket has disconnected.";

/// A message envelope.
///
/// Empty fields are omitted from the encoded form and default to empty when
/// absent from the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Connection ID of the sending peer. Empty for system notices.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,

    /// Target connection ID. Reserved for directed delivery.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recipient: String,

    /// Message payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
}

impl Envelope {
    /// Create an envelope carrying a message read from a peer.
    #[must_use]
    pub fn from_peer(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: String::new(),
            content: content.into(),
        }
    }

    /// Create a system notice with no sender.
    #[must_use]
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// The "peer joined" system notice.
    #[must_use]
    pub fn joined() -> Self {
        Self::notice(JOINED_NOTICE)
    }

    /// The "peer left" system notice.
    #[must_use]
    pub fn left() -> Self {
        Self::notice(LEFT_NOTICE)
    }
}

//! Connection identity and outbound queues.
//!
//! A [`Connection`] is the hub-side half of a peer: its identifier plus the
//! sending end of its outbox. The receiving end, [`Outbox`], belongs to the
//! peer's outbound pump. Dropping the `Connection` closes the outbox, which is
//! how the hub tells the pump to shut the transport down.

use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default outbox capacity, in envelopes.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, not yet known to the hub.
    Connecting,
    /// Register request submitted.
    Registered,
    /// Both pumps running.
    Active,
    /// Unregister submitted or outbox closed, pumps winding down.
    Unregistering,
    /// Both pumps exited and the transport is closed.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Registered => "registered",
            ConnectionState::Active => "active",
            ConnectionState::Unregistering => "unregistering",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The hub-side handle of a connected peer.
///
/// Not `Clone`: the hub holds the only sender, so removing the
/// membership entry closes the outbox.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbox: mpsc::Sender<Bytes>,
}

impl Connection {
    /// Open a connection with a bounded outbox.
    ///
    /// Returns the hub-side `Connection` and the `Outbox` to hand to the
    /// outbound pump.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn open(id: ConnectionId, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { id, outbox: tx }, Outbox { receiver: rx })
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Try to enqueue an encoded envelope without waiting.
    pub(crate) fn try_deliver(
        &self,
        payload: Bytes,
    ) -> Result<(), mpsc::error::TrySendError<Bytes>> {
        self.outbox.try_send(payload)
    }
}

/// Receiving end of a connection's outbound queue.
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::Receiver<Bytes>,
}

impl Outbox {
    /// Wait for the next payload.
    ///
    /// Returns `None` once the hub has dropped the connection and every queued
    /// payload has been received.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Take a queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }
}

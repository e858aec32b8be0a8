//! Transport abstraction traits for Relay.
//!
//! A connected peer's transport is split into a read half and a write half so
//! the inbound and outbound pumps can own one each.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No message arrived within the idle timeout.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// The read half of a transport.
#[async_trait]
pub trait MessageStream: Send {
    /// Receive the next message unit as text.
    ///
    /// Returns `None` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// The write half of a transport.
#[async_trait]
pub trait MessageSink: Send {
    /// Send one encoded envelope.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Send a close notice and shut the write half down.
    ///
    /// Closing an already closed sink is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

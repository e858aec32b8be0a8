//! # relay-transport
//!
//! Transport abstraction and per-connection pumps for the Relay hub.
//!
//! A transport is split into a [`MessageStream`] (read half) and a
//! [`MessageSink`] (write half). [`serve_connection`] registers the peer with
//! the hub and drives both halves until the connection ends:
//!
//! ```rust,ignore
//! use relay_transport::{serve_connection, split_socket, ConnectionConfig};
//!
//! async fn on_upgrade(socket: WebSocket, hub: HubHandle) {
//!     let (reader, writer) = split_socket(socket);
//!     let id = ConnectionId::generate();
//!     let _ = serve_connection(&hub, id, reader, writer, &ConnectionConfig::default()).await;
//! }
//! ```

pub mod pump;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use pump::{serve_connection, ConnectionConfig};
pub use traits::{MessageSink, MessageStream, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{split_socket, WebSocketReader, WebSocketWriter};

//! # relay-core
//!
//! Connection registry and broadcast coordinator for the Relay hub.
//!
//! - **Connection** - A peer's ID and the sending end of its outbox
//! - **Hub** - Single task that owns membership and fans envelopes out
//! - **HubHandle** - Cloneable request interface to the hub
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  HubCommand   ┌─────────────┐  try_send   ┌─────────────┐
//! │ Inbound pump │──────────────▶│     Hub     │────────────▶│   Outbox    │
//! └──────────────┘   (mpsc)      └─────────────┘  (bounded)  └─────────────┘
//!                                                                   │
//!                                                                   ▼
//!                                                           ┌──────────────┐
//!                                                           │Outbound pump │
//!                                                           └──────────────┘
//! ```

pub mod connection;
pub mod handle;
pub mod hub;

pub use connection::{Connection, ConnectionId, ConnectionState, Outbox, DEFAULT_OUTBOX_CAPACITY};
pub use handle::{spawn_hub, HubError, HubHandle};
pub use hub::{Hub, HubCommand, HubConfig, HubStats};

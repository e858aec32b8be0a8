//! # relay-server
//!
//! Real-time WebSocket broadcast hub. Every message a client sends is relayed
//! to all connected clients, the sender included, as a JSON envelope.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{run_server, serve};

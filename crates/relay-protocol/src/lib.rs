//! # relay-protocol
//!
//! Wire envelope definitions for the Relay broadcast hub.
//!
//! Every message a client receives is an [`Envelope`] encoded as a JSON object
//! with optional string fields `sender`, `recipient` and `content`. Empty
//! fields are left out of the encoded form.
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, Envelope};
//!
//! let envelope = Envelope::from_peer("conn-1", "hello");
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! assert_eq!(&encoded[..], br#"{"sender":"conn-1","content":"hello"}"#);
//!
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(decoded, envelope);
//! ```

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::{Envelope, JOINED_NOTICE, LEFT_NOTICE};

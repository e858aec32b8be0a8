//! Codec for encoding and decoding Relay envelopes.
//!
//! Envelopes travel as JSON text, one envelope per WebSocket message.

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::Envelope;

/// Default maximum encoded envelope size (1 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded envelope exceeds the size limit.
    #[error("Envelope size {size} exceeds maximum {limit}")]
    TooLarge {
        /// Encoded size in bytes.
        size: usize,
        /// Limit that was exceeded.
        limit: usize,
    },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode an envelope to JSON bytes.
///
/// # Errors
///
/// Returns an error if the envelope is larger than [`MAX_ENVELOPE_SIZE`] or
/// encoding fails.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    encode_with_limit(envelope, MAX_ENVELOPE_SIZE)
}

/// Encode an envelope, rejecting output larger than `limit` bytes.
///
/// # Errors
///
/// Returns an error if the encoded form exceeds `limit` or encoding fails.
pub fn encode_with_limit(envelope: &Envelope, limit: usize) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(envelope).map_err(ProtocolError::Encode)?;

    if payload.len() > limit {
        return Err(ProtocolError::TooLarge {
            size: payload.len(),
            limit,
        });
    }

    Ok(Bytes::from(payload))
}

/// Decode an envelope from JSON bytes.
///
/// # Errors
///
/// Returns an error if the data is not a valid envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    serde_json::from_slice(data).map_err(ProtocolError::Decode)
}

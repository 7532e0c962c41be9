//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a packet into JSON).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (the input was not valid JSON).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The `type` discriminator named a kind this registry doesn't know.
    #[error("unknown packet type: {0}")]
    UnknownKind(String),

    /// Valid JSON, but not a packet (missing or malformed `type`).
    #[error("malformed packet: {0}")]
    Malformed(String),
}

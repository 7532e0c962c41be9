//! Error types for the cache adapter.

/// Errors that can occur at the cache boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is not in canonical form. Keys must be spelled identically
    /// by every cooperating process, so a non-canonical key is a
    /// programming error and fails loudly rather than addressing a
    /// duplicate entry.
    #[error("invalid cache key: {reason}")]
    InvalidKey { reason: String },

    /// The backing store reported a failure (connection, protocol,
    /// malformed stored value). Not retried at this layer.
    #[error("cache backend error: {0}")]
    Backend(String),
}

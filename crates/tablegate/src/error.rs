//! Unified error type for the Tablegate meta crate.

use tablegate_cache::CacheError;
use tablegate_protocol::ProtocolError;
use tablegate_session::SessionError;

use crate::FilterError;

/// Top-level error that wraps all crate-specific errors.
///
/// Embedders deal with this single type; the `#[from]` attributes let `?`
/// convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TablegateError {
    /// A packet encode/decode error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A cache-boundary error (invalid key, backend failure).
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A session-layer error (argument type, not found, service).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A filter-chain configuration error.
    #[error(transparent)]
    Filter(#[from] FilterError),
}

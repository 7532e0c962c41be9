//! Error types for the session layer.

use tablegate_cache::CacheError;

use crate::ServiceError;

/// Errors that can occur during session management.
///
/// `InvalidArgumentType` and `NotFound` are explicit failures that must
/// reach the caller (never silently swallowed) and leave the local session
/// expired; cache failures surface untouched — there is no retry here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An identity-id or auth-token was not in canonical form. The message
    /// names which argument is wrong.
    #[error("{argument} is not a canonical cache key: {reason}")]
    InvalidArgumentType { argument: &'static str, reason: String },

    /// A live local session's cache entry vanished — the session was
    /// invalidated by another process. The local session is left expired.
    #[error("session not found for {uid}")]
    NotFound { uid: String },

    /// The cache itself failed (not an absent entry — a backend error).
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The game service failed while refreshing identity state.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_names_the_argument() {
        let err = SessionError::InvalidArgumentType {
            argument: "uid",
            reason: "contains whitespace".into(),
        };
        let text = err.to_string();
        assert!(text.contains("uid"), "got {text}");
        assert!(text.contains("whitespace"), "got {text}");
    }

    #[test]
    fn test_not_found_names_the_uid() {
        let err = SessionError::NotFound { uid: "player-9".into() };
        assert!(err.to_string().contains("player-9"));
    }
}

//! Canonical cache keys.

use std::fmt;

use crate::CacheError;

/// A validated cache key.
///
/// The cache's uniqueness invariant only holds if every cooperating process
/// spells a key exactly the same way. A key that differs in representation —
/// a different text encoding, embedded whitespace, control bytes — would
/// silently address a *different* entry, so construction rejects anything
/// that isn't the one canonical form: non-empty printable ASCII, no
/// whitespace, at most [`CacheKey::MAX_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Maximum key length in bytes, matching the usual memcached limit.
    pub const MAX_LEN: usize = 250;

    /// Validates `raw` and wraps it as a canonical key.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidKey`] naming the violation.
    pub fn new(raw: &str) -> Result<Self, CacheError> {
        if raw.is_empty() {
            return Err(CacheError::InvalidKey { reason: "empty key".into() });
        }
        if raw.len() > Self::MAX_LEN {
            return Err(CacheError::InvalidKey {
                reason: format!(
                    "key is {} bytes, limit is {}",
                    raw.len(),
                    Self::MAX_LEN
                ),
            });
        }
        for byte in raw.bytes() {
            if !byte.is_ascii() {
                return Err(CacheError::InvalidKey {
                    reason: "key contains non-ASCII bytes".into(),
                });
            }
            if byte.is_ascii_whitespace() {
                return Err(CacheError::InvalidKey {
                    reason: "key contains whitespace".into(),
                });
            }
            if byte.is_ascii_control() {
                return Err(CacheError::InvalidKey {
                    reason: "key contains control bytes".into(),
                });
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Session types: the in-process record binding a caller to their avatar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tablegate_protocol::Serial;
use tokio::sync::Mutex as AsyncMutex;

use crate::Avatar;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seconds of inactivity before [`SessionStore::expire_stale`] expires
    /// a session. Long-poll traffic does not count as activity.
    ///
    /// [`SessionStore::expire_stale`]: crate::SessionStore::expire_stale
    pub session_timeout_secs: u64,

    /// Lifetime in seconds of cookie-style session markers handed to
    /// clients that can't carry uid/auth query parameters.
    pub cookie_timeout_secs: u64,

    /// This process's sticky-routing triple, written to the cache under an
    /// identity-id while that caller's session is worth keeping. `None`
    /// disables routing-record writes entirely.
    pub resthost: Option<RestHost>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 600,
            cookie_timeout_secs: 1200,
            resthost: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RestHost
// ---------------------------------------------------------------------------

/// "Where is this player's live connection" — the sticky-routing record
/// other processes resolve to reach the process currently holding a
/// caller's session. Stored in the cache as its JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestHost {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RestHost {
    pub fn new(host: &str, port: u16, path: &str) -> Self {
        Self { host: host.to_string(), port, path: path.to_string() }
    }

    /// The canonical cache-value encoding of this record.
    pub fn to_cache_value(&self) -> String {
        // RestHost serialization cannot fail: all fields are plain strings
        // and an integer.
        serde_json::to_string(self).expect("resthost is always encodable")
    }
}

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// The (identity-id, auth-token) pair a session is registered under.
///
/// Equality is exact string equality — two keys that differ in
/// representation are different keys, and non-canonical text never gets
/// this far (the store rejects it at the boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub uid: String,
    pub auth: String,
}

impl SessionKey {
    pub fn new(uid: &str, auth: &str) -> Self {
        Self { uid: uid.to_string(), auth: auth.to_string() }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Shared handle to a session.
pub type SessionRef = Arc<Session>;

/// The in-process record binding a caller's (uid, auth) pair to an avatar,
/// plus the bookkeeping the reconciliation algorithm needs.
///
/// ## Lifecycle
///
/// ```text
/// make_session() ──→ [live] ──→ expire() ──→ [expired, terminal]
///                      │  ↑
///        get_session reconciles against the cache; a vanished cache
///        entry expires the session and the next lookup starts fresh
/// ```
///
/// `expired` is a one-way flag: once set it is never cleared, and the
/// store never returns an expired session — a new lookup creates a fresh
/// one. Interior mutability is deliberate: requests sharing a session key
/// share the session object, and the flag must stay monotonic no matter
/// which request flips it first.
#[derive(Debug)]
pub struct Session {
    uid: String,
    auth: String,

    /// The bound identity handle. Behind an async mutex because packet
    /// logic holds it across suspension points; unrelated sessions are
    /// never behind the same lock.
    pub avatar: Arc<AsyncMutex<Avatar>>,

    /// Last serial observed in the shared cache for this auth-token.
    cache_serial: Mutex<Option<Serial>>,

    /// Last activity instant; long-poll traffic does not refresh it.
    last_modified: Mutex<Instant>,

    /// One-way expiry flag.
    expired: AtomicBool,

    /// The routing payload this process last wrote under `uid`, used to
    /// suppress redundant cache writes. Never cleared: a stale routing
    /// record is deliberately left resolvable for draining processes.
    routing_written: Mutex<Option<RestHost>>,
}

impl Session {
    pub(crate) fn new(uid: &str, auth: &str, avatar: Avatar) -> Self {
        Self {
            uid: uid.to_string(),
            auth: auth.to_string(),
            avatar: Arc::new(AsyncMutex::new(avatar)),
            cache_serial: Mutex::new(None),
            last_modified: Mutex::new(Instant::now()),
            expired: AtomicBool::new(false),
            routing_written: Mutex::new(None),
        }
    }

    /// The identity-id this session is registered under.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The auth-token this session is registered under.
    pub fn auth(&self) -> &str {
        &self.auth
    }

    /// The registration key.
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.uid, &self.auth)
    }

    /// Whether this session has been expired. Monotonic: once `true`,
    /// never `false` again.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Expires this session. Idempotent; logs only on the first call.
    pub fn expire(&self) {
        if !self.expired.swap(true, Ordering::AcqRel) {
            tracing::info!(uid = %self.uid, "session expired");
        }
    }

    /// Refreshes the activity timestamp. Not called for long-poll kinds.
    pub fn touch(&self) {
        *self.last_modified.lock().expect("session mutex poisoned") =
            Instant::now();
    }

    /// Time since the last (non-long-poll) activity.
    pub fn idle_for(&self) -> Duration {
        self.last_modified
            .lock()
            .expect("session mutex poisoned")
            .elapsed()
    }

    /// Last serial observed in the cache, if any read/write happened yet.
    pub fn cache_serial(&self) -> Option<Serial> {
        *self.cache_serial.lock().expect("session mutex poisoned")
    }

    pub(crate) fn set_cache_serial(&self, serial: Serial) {
        *self.cache_serial.lock().expect("session mutex poisoned") =
            Some(serial);
    }

    pub(crate) fn routing_written(&self) -> Option<RestHost> {
        self.routing_written
            .lock()
            .expect("session mutex poisoned")
            .clone()
    }

    pub(crate) fn set_routing_written(&self, resthost: RestHost) {
        *self.routing_written.lock().expect("session mutex poisoned") =
            Some(resthost);
    }
}

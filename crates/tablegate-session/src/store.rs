//! The session store: the in-process session table and the reconciliation
//! algorithm that keeps it consistent with the shared cache.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating sessions when callers first show up
//! - Reconciling local sessions against the authoritative cache state
//! - Syncing login/logout serial changes back to the cache
//! - Deciding whether a session's routing record should outlive a request
//! - Expiring sessions (explicitly, or by inactivity sweep)
//!
//! # Consistency model
//!
//! The cache is the serialization point between cooperating processes:
//! reads adopt whatever another process wrote (remote wins on read), and
//! [`update_session`](SessionStore::update_session) overwrites
//! unconditionally (local wins on write). No lock spans the two — a racing
//! write is resolved by whoever writes last, and the next reconciling read
//! adopts it. The session table's own mutex is held only for map
//! operations, never across cache I/O or handler suspension points.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tablegate_cache::{CacheClient, CacheError, CacheKey};
use tablegate_protocol::Serial;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    GameService, Role, Session, SessionConfig, SessionError, SessionKey,
    SessionRef,
};

/// The in-process table of live sessions, keyed by (uid, auth).
///
/// ## Lifecycle
///
/// ```text
/// make_session() ──→ [live] ──→ persist_session() == false ──→ [expired]
///                      │ ↑                                         │
///                      │ └── get_session() reconciles ──────────────┤
///                      │        (cache entry vanished → expired)    ▼
///                      └──→ expire_stale() after session_timeout  purged
/// ```
///
/// The store never holds two live sessions for the same key, and never
/// returns an expired session — a lookup that finds one purges it and
/// starts fresh.
pub struct SessionStore<C: CacheClient, S: GameService> {
    /// Live sessions. Purged lazily on lookup and by `expire_stale`.
    sessions: AsyncMutex<HashMap<SessionKey, SessionRef>>,
    cache: C,
    service: Arc<S>,
    config: SessionConfig,
}

impl<C: CacheClient, S: GameService> SessionStore<C, S> {
    /// Creates an empty store over the given cache client and service.
    pub fn new(cache: C, service: Arc<S>, config: SessionConfig) -> Self {
        Self {
            sessions: AsyncMutex::new(HashMap::new()),
            cache,
            service,
            config,
        }
    }

    /// The cache adapter this store reconciles against.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The external game service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocates a fresh session under (uid, auth). No cache I/O.
    ///
    /// The avatar comes from the service's identity pool, gets the explain
    /// projection when requested, and re-exposes (uid, auth) as its
    /// distributed args. If a live session already existed under this key
    /// it is expired first — the store never holds two live sessions for
    /// the same pair.
    ///
    /// # Errors
    /// [`SessionError::InvalidArgumentType`] when either argument is not a
    /// canonical cache key.
    pub async fn make_session(
        &self,
        uid: &str,
        auth: &str,
        explain: bool,
    ) -> Result<SessionRef, SessionError> {
        checked_key("uid", uid)?;
        checked_key("auth", auth)?;

        let mut avatar = self.service.create_avatar();
        if explain {
            avatar.set_explain();
        }
        avatar.bind_distributed_args(uid, auth);

        let session: SessionRef = Arc::new(Session::new(uid, auth, avatar));

        let mut sessions = self.sessions.lock().await;
        if let Some(old) =
            sessions.insert(session.key(), Arc::clone(&session))
        {
            if !old.expired() {
                tracing::debug!(%uid, "replacing live session");
                old.expire();
            }
        }
        tracing::info!(%uid, "session created");
        Ok(session)
    }

    /// Returns the live session for (uid, auth), reconciled against the
    /// cache, or creates one.
    ///
    /// Contract:
    /// 1. Both arguments must be canonical cache keys; anything else fails
    ///    with [`SessionError::InvalidArgumentType`] naming the argument.
    /// 2. If a session already exists, the authoritative serial is read
    ///    from the cache under `auth`. An absent entry means another
    ///    process invalidated the session: it is expired, deregistered,
    ///    and the call fails with [`SessionError::NotFound`]. A present
    ///    entry is adopted as truth — identity, roles and explain
    ///    projection are refreshed even if the serial differs from what
    ///    this process last wrote.
    /// 3. Otherwise a fresh session is made (no cache I/O).
    ///
    /// Never returns an expired session.
    pub async fn get_session(
        &self,
        uid: &str,
        auth: &str,
        explain: bool,
    ) -> Result<SessionRef, SessionError> {
        checked_key("uid", uid)?;
        let auth_key = checked_key("auth", auth)?;

        let key = SessionKey::new(uid, auth);
        let Some(session) = self.lookup(&key).await else {
            return self.make_session(uid, auth, explain).await;
        };

        match self.cache.get(&auth_key).await? {
            None => {
                // Invalidated elsewhere. The local record is now a lie:
                // expire it, drop it, and make the caller start over.
                session.expire();
                self.deregister(&key).await;
                Err(SessionError::NotFound { uid: uid.to_string() })
            }
            Some(value) => {
                let serial = parse_serial(uid, &value)?;
                self.adopt_cache_serial(&session, serial, explain).await?;
                Ok(session)
            }
        }
    }

    /// Returns the live session for (uid, auth) or creates one, *without*
    /// touching the cache.
    ///
    /// This is the attach path for long-poll kinds and cookie re-attach,
    /// where reconciliation side effects (expiry, identity refresh) are
    /// explicitly forbidden.
    pub async fn resolve_session(
        &self,
        uid: &str,
        auth: &str,
        explain: bool,
    ) -> Result<SessionRef, SessionError> {
        checked_key("uid", uid)?;
        checked_key("auth", auth)?;

        let key = SessionKey::new(uid, auth);
        match self.lookup(&key).await {
            Some(session) => Ok(session),
            None => self.make_session(uid, auth, explain).await,
        }
    }

    /// Writes the session's local serial to the cache under `auth`,
    /// unconditionally overwriting whatever is there.
    ///
    /// This is the login/logout/serial-changed sync point: `"0"` means the
    /// caller is logged out. Local wins on write; the next reconciling
    /// read adopts whatever ends up in the cache.
    pub async fn update_session(
        &self,
        session: &Session,
    ) -> Result<(), SessionError> {
        let auth_key = checked_key("auth", session.auth())?;
        let serial = session.avatar.lock().await.serial();
        self.cache.set(&auth_key, &serial.to_string()).await?;
        session.set_cache_serial(serial);
        tracing::debug!(uid = %session.uid(), %serial, "session serial synced");
        Ok(())
    }

    /// Deletes the `auth` cache entry: deliberate sign-out, distinct from
    /// timeout-based expiry.
    pub async fn logout_session(
        &self,
        session: &Session,
    ) -> Result<(), SessionError> {
        let auth_key = checked_key("auth", session.auth())?;
        self.cache.delete(&auth_key).await?;
        tracing::info!(uid = %session.uid(), "session logged out");
        Ok(())
    }

    /// Decides whether the session's routing record should survive past
    /// this request.
    ///
    /// Worth keeping iff the identity has at least one joined table or at
    /// least one tracked explain game. Worth keeping: the (host, port,
    /// path) routing record is written under `uid` — but only when the
    /// avatar carries an explain projection, and only when the payload
    /// differs from what was already written — and the call returns
    /// `true`. Not worth keeping: the session is expired and the call
    /// returns `false`.
    ///
    /// A previously written routing record is never deleted here, even
    /// once the session is torn down: other processes may still be
    /// draining it.
    pub async fn persist_session(
        &self,
        session: &Session,
    ) -> Result<bool, SessionError> {
        let (worth, has_explain) = {
            let avatar = session.avatar.lock().await;
            (avatar.worth_keeping(), avatar.explain.is_some())
        };

        if !worth {
            session.expire();
            self.deregister(&session.key()).await;
            return Ok(false);
        }

        if has_explain {
            if let Some(resthost) = &self.config.resthost {
                if session.routing_written().as_ref() != Some(resthost) {
                    let uid_key = checked_key("uid", session.uid())?;
                    self.cache
                        .set(&uid_key, &resthost.to_cache_value())
                        .await?;
                    session.set_routing_written(resthost.clone());
                    tracing::debug!(
                        uid = %session.uid(),
                        host = %resthost.host,
                        "routing record written"
                    );
                }
            }
        }
        Ok(true)
    }

    /// Expires and purges sessions idle longer than the configured
    /// session timeout. Returns how many were expired.
    ///
    /// Long-poll traffic does not refresh the activity timestamp, so a
    /// caller parked on long polls ages normally here.
    pub async fn expire_stale(&self) -> usize {
        let timeout = Duration::from_secs(self.config.session_timeout_secs);
        let mut sessions = self.sessions.lock().await;
        let mut expired = 0;
        sessions.retain(|_, session| {
            if session.expired() {
                return false;
            }
            if session.idle_for() > timeout {
                session.expire();
                expired += 1;
                return false;
            }
            true
        });
        expired
    }

    /// Mints a random 32-hex-char cookie-style session marker.
    pub fn mint_session_marker(&self) -> String {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Number of registered (non-purged) sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns `true` if no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Looks up a live session, purging an expired registration.
    async fn lookup(&self, key: &SessionKey) -> Option<SessionRef> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(key) {
            Some(session) if !session.expired() => {
                return Some(Arc::clone(session));
            }
            Some(_) => {} // expired registration: purge below
            None => return None,
        }
        sessions.remove(key);
        None
    }

    async fn deregister(&self, key: &SessionKey) {
        self.sessions.lock().await.remove(key);
    }

    /// Adopts a cache-observed serial as authoritative for the session's
    /// identity: profile, roles and explain projection follow the cache,
    /// not whatever this process last saw.
    async fn adopt_cache_serial(
        &self,
        session: &Session,
        serial: Serial,
        explain: bool,
    ) -> Result<(), SessionError> {
        let stale = session.avatar.lock().await.serial() != serial;

        // Fetch outside the avatar lock; player_info may suspend.
        let profile = if stale && !serial.is_anonymous() {
            Some(self.service.player_info(serial).await?)
        } else {
            None
        };

        let mut avatar = session.avatar.lock().await;
        if stale {
            tracing::debug!(
                uid = %session.uid(),
                old = %avatar.serial(),
                new = %serial,
                "adopting cache serial"
            );
            avatar.user = profile.unwrap_or_default();
        }
        if !serial.is_anonymous() {
            avatar.roles.insert(Role::Play);
        }
        if explain {
            avatar.set_explain();
        }
        if let Some(projection) = avatar.explain.as_mut() {
            projection.serial = serial;
        }
        drop(avatar);

        session.set_cache_serial(serial);
        Ok(())
    }
}

/// Validates a store argument as a canonical cache key, naming the
/// argument on failure.
fn checked_key(
    argument: &'static str,
    raw: &str,
) -> Result<CacheKey, SessionError> {
    CacheKey::new(raw).map_err(|err| match err {
        CacheError::InvalidKey { reason } => {
            SessionError::InvalidArgumentType { argument, reason }
        }
        other => SessionError::Cache(other),
    })
}

/// Parses the serial string stored under an auth-token.
fn parse_serial(uid: &str, value: &str) -> Result<Serial, SessionError> {
    value.trim().parse::<u32>().map(Serial).map_err(|_| {
        SessionError::Cache(CacheError::Backend(format!(
            "malformed serial for {uid}: {value:?}"
        )))
    })
}

// =========================================================================
// Tests
// =========================================================================

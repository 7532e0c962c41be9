//! The `Site`: process-wide owner of the session store, filter chain and
//! message sink.

use std::sync::Arc;

use tablegate_cache::CacheClient;
use tablegate_session::{
    GameService, Session, SessionError, SessionRef, SessionStore,
};

use crate::ServerConfig;
use crate::filter::{FilterChain, FilterError, FilterRegistry};

/// Process-wide sink for operator-facing messages (request failures,
/// dispatch traces). Distinct from structured `tracing` output: the sink
/// is where the plain-text server log hangs off.
pub trait MessageSink: Send + Sync + 'static {
    /// Emits one message line.
    fn message(&self, text: &str);
}

/// The default sink: forwards to `tracing` at info level.
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&self, text: &str) {
        tracing::info!(target: "tablegate::site", "{text}");
    }
}

/// One per process: owns the cache-backed session store and the filter
/// chain, and re-exposes session lifecycle operations to the dispatch
/// pipeline and to external callers (e.g. the tournament-start endpoint).
pub struct Site<C: CacheClient, S: GameService> {
    store: SessionStore<C, S>,
    filters: FilterChain,
    sink: Box<dyn MessageSink>,
    config: ServerConfig,
}

impl<C: CacheClient, S: GameService> Site<C, S> {
    /// Builds a site with the built-in filter registry.
    ///
    /// # Errors
    /// [`FilterError::Unknown`] when the configured filter list names an
    /// identifier the registry doesn't know.
    pub fn new(
        config: ServerConfig,
        cache: C,
        service: Arc<S>,
    ) -> Result<Self, FilterError> {
        Self::with_registry(config, cache, service, &FilterRegistry::builtin())
    }

    /// Builds a site resolving filters through a caller-supplied registry.
    pub fn with_registry(
        config: ServerConfig,
        cache: C,
        service: Arc<S>,
        registry: &FilterRegistry,
    ) -> Result<Self, FilterError> {
        let filters = FilterChain::from_config(&config.filters, registry)?;
        let store =
            SessionStore::new(cache, service, config.session_config());
        Ok(Self { store, filters, sink: Box::new(TracingSink), config })
    }

    /// Replaces the message sink (tests capture it; embedders may tee it
    /// into their own logging).
    pub fn set_message_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.sink = sink;
    }

    /// The session store.
    pub fn store(&self) -> &SessionStore<C, S> {
        &self.store
    }

    /// The external game service.
    pub fn service(&self) -> &Arc<S> {
        self.store.service()
    }

    /// The configured filter chain.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// The process configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Emits a line to the process message sink.
    pub fn message(&self, text: &str) {
        self.sink.message(text);
    }

    // -- Session lifecycle, re-exposed for external callers ---------------

    /// See [`SessionStore::make_session`].
    pub async fn make_session(
        &self,
        uid: &str,
        auth: &str,
        explain: bool,
    ) -> Result<SessionRef, SessionError> {
        self.store.make_session(uid, auth, explain).await
    }

    /// See [`SessionStore::get_session`].
    pub async fn get_session(
        &self,
        uid: &str,
        auth: &str,
        explain: bool,
    ) -> Result<SessionRef, SessionError> {
        self.store.get_session(uid, auth, explain).await
    }

    /// See [`SessionStore::update_session`].
    pub async fn update_session(
        &self,
        session: &Session,
    ) -> Result<(), SessionError> {
        self.store.update_session(session).await
    }

    /// See [`SessionStore::logout_session`].
    pub async fn logout_session(
        &self,
        session: &Session,
    ) -> Result<(), SessionError> {
        self.store.logout_session(session).await
    }

    /// See [`SessionStore::persist_session`].
    pub async fn persist_session(
        &self,
        session: &Session,
    ) -> Result<bool, SessionError> {
        self.store.persist_session(session).await
    }

    /// See [`SessionStore::expire_stale`].
    pub async fn expire_stale(&self) -> usize {
        self.store.expire_stale().await
    }
}

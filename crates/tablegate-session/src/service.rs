//! The game-service seam: everything the session and dispatch layers need
//! from the process that actually runs games.
//!
//! Tablegate doesn't implement game logic, player accounts, or tournament
//! scheduling — the embedding service does. This trait is the single
//! extension point: the framework calls it to mint avatars, refresh player
//! info during reconciliation, run packet logic, and relay tournament
//! starts.

use std::sync::Arc;

use tablegate_protocol::{Packet, Serial};
use tokio::sync::Mutex as AsyncMutex;

use crate::{Avatar, UserProfile};

/// A packet-logic failure, carrying the message that gets substituted into
/// the error response.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The external provider of identities and packet logic.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` — the service is shared across request tasks
/// for the life of the process.
pub trait GameService: Send + Sync + 'static {
    /// Mints a fresh identity handle. Called by the session store when a
    /// session is created, and by the dispatch pipeline for anonymous
    /// (session-less) requests.
    fn create_avatar(&self) -> Avatar {
        Avatar::new()
    }

    /// Disposes of an identity handle the service minted. Default: drop.
    fn destroy_avatar(&self, _avatar: Avatar) {}

    /// Supplies the current profile for `serial`. Called during
    /// reconciliation when the cache proves the serial changed under us.
    async fn player_info(&self, serial: Serial)
    -> Result<UserProfile, ServiceError>;

    /// Runs packet logic. May complete synchronously or suspend and
    /// resolve on a later event; either way it eventually yields the
    /// outgoing packets for this request.
    ///
    /// The avatar lock is *not* held by the caller — the handler takes it
    /// as needed, so a suspended handler never blocks other requests.
    ///
    /// # Errors
    /// A failure becomes a single error packet in the response and an
    /// IP-prefixed entry in the process message sink; it never crashes
    /// the process.
    async fn handle_packet(
        &self,
        avatar: Arc<AsyncMutex<Avatar>>,
        packet: Packet,
    ) -> Result<Vec<Packet>, ServiceError>;

    /// Notifies the service that a tournament started. Driven by the
    /// tournament-start endpoint.
    async fn tourney_notify_start(
        &self,
        tourney_serial: u32,
    ) -> Result<(), ServiceError>;
}

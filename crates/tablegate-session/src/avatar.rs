//! The identity handle: a caller's live game-side state.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tablegate_protocol::{GameId, Serial, TableId};

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// Player info supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Integer player id; `Serial(0)` means anonymous/logged out.
    pub serial: Serial,
    /// Display name.
    pub name: String,
    /// Locale tag, e.g. `en_US.UTF-8`.
    pub locale: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            serial: Serial::ANONYMOUS,
            name: String::new(),
            locale: "en_US.UTF-8".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A capability granted to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// May sit at tables and play.
    Play,
    /// May edit server-side state (admin tooling).
    Edit,
}

// ---------------------------------------------------------------------------
// ExplainProjection
// ---------------------------------------------------------------------------

/// Optional diagnostic view of a session's game state, enabled per-request.
///
/// When present, it mirrors the identity's serial and tracks the games the
/// caller is observing. The persist decision (see the session store) treats
/// tracked games as evidence the session is still worth keeping.
#[derive(Debug, Clone, Default)]
pub struct ExplainProjection {
    /// The serial this projection was built for; refreshed on reconcile.
    pub serial: Serial,
    /// Tracked game-id → opaque game reference.
    pub games: HashMap<GameId, String>,
}

impl ExplainProjection {
    /// A fresh projection for `serial` with no tracked games.
    pub fn new(serial: Serial) -> Self {
        Self { serial, games: HashMap::new() }
    }
}

// ---------------------------------------------------------------------------
// DistributedArgs
// ---------------------------------------------------------------------------

/// The (identity-id, auth-token) pair re-exposed on the avatar so other
/// cooperating processes can reconstruct or validate the same session.
///
/// `Display` renders the query-fragment form the processes pass around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedArgs {
    pub uid: String,
    pub auth: String,
}

impl fmt::Display for DistributedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uid={}&auth={}", self.uid, self.auth)
    }
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// The caller's live game-side state, bound to exactly one session.
///
/// The avatar is handed out by the external [`GameService`] and mutated by
/// game logic while a packet handler runs; the session layer only reads it
/// to make lifecycle decisions (reconcile, persist) and refreshes it when
/// the cache proves another process changed the caller's login state.
///
/// [`GameService`]: crate::GameService
#[derive(Debug, Clone, Default)]
pub struct Avatar {
    /// Profile as last supplied by the identity provider.
    pub user: UserProfile,
    /// Currently-joined table-id → opaque table reference.
    pub tables: HashMap<TableId, String>,
    /// Granted capabilities.
    pub roles: HashSet<Role>,
    /// Diagnostic projection, enabled per-request.
    pub explain: Option<ExplainProjection>,
    /// The (uid, auth) pair re-exposed for cooperating processes.
    pub distributed_args: Option<DistributedArgs>,
}

impl Avatar {
    /// A fresh anonymous avatar.
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity's current serial.
    pub fn serial(&self) -> Serial {
        self.user.serial
    }

    /// Enables the explain projection (idempotent), mirroring the current
    /// serial into it.
    pub fn set_explain(&mut self) {
        let serial = self.user.serial;
        self.explain.get_or_insert_with(|| ExplainProjection::new(serial));
    }

    /// Binds the distributed (uid, auth) pair.
    pub fn bind_distributed_args(&mut self, uid: &str, auth: &str) {
        self.distributed_args = Some(DistributedArgs {
            uid: uid.to_string(),
            auth: auth.to_string(),
        });
    }

    /// A session is worth keeping alive past the current request iff its
    /// identity still has at least one joined table or at least one
    /// tracked explain game.
    pub fn worth_keeping(&self) -> bool {
        !self.tables.is_empty()
            || self.explain.as_ref().is_some_and(|e| !e.games.is_empty())
    }
}

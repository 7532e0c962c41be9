//! Session consistency for Tablegate.
//!
//! A caller's identity lives in two places at once: the shared external
//! cache (authoritative, visible to every cooperating process) and this
//! process's session table (fast, local, possibly stale). This crate owns
//! the record binding the two and the algorithm that reconciles them:
//!
//! 1. **Identity handle** — the [`Avatar`]: serial, joined tables, roles,
//!    optional explain projection, and the re-exposed (uid, auth) pair.
//! 2. **Session** — the in-process record keyed by (identity-id,
//!    auth-token), with cache-reconciliation bookkeeping and a one-way
//!    `expired` flag.
//! 3. **Session store** — [`SessionStore`]: lifecycle operations
//!    (make/get/resolve/update/logout/persist) and the reconciliation
//!    step that decides whether a local session is still valid.
//! 4. **Service seam** — the [`GameService`] trait: the external provider
//!    of avatars, player info, packet logic, and tournament notifications.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatch Pipeline (above)  ← attaches sessions to inbound requests
//!     ↕
//! Session Layer (this crate)  ← reconciles local state against cache truth
//!     ↕
//! Cache Adapter (below)  ← get/set/delete on the shared cache
//! ```

#![allow(async_fn_in_trait)]

mod avatar;
mod error;
mod service;
mod session;
mod store;

pub use avatar::{Avatar, DistributedArgs, ExplainProjection, Role, UserProfile};
pub use error::SessionError;
pub use service::{GameService, ServiceError};
pub use session::{RestHost, Session, SessionConfig, SessionKey, SessionRef};
pub use store::SessionStore;

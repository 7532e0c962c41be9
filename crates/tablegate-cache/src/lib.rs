//! Cache client adapter for Tablegate.
//!
//! Cooperating front-end processes share one source of truth about who is
//! logged in and where their live connection rests: an external distributed
//! key-value cache. This crate is the in-process boundary to that cache:
//!
//! 1. **Key discipline** — [`CacheKey`] is the single canonical string
//!    representation a key may have. Anything else fails loudly instead of
//!    silently creating a second entry for "the same" key.
//! 2. **Client seam** — [`CacheClient`] is the uniform get/set/delete
//!    interface; every call is a potential suspension point and every read
//!    may be stale (another process may write at any time — last writer
//!    wins, by policy).
//! 3. **In-memory client** — [`MemoryCache`] backs development and tests,
//!    while recording the configured server pool the way a real pool
//!    client would be constructed.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Store (above)  ← reconciles local sessions against cache truth
//!     ↕
//! Cache Adapter (this crate)  ← canonical keys, get/set/delete
//!     ↕
//! External cache pool (below)  ← wire protocol, server hashing (out of scope)
//! ```

#![allow(async_fn_in_trait)]

mod client;
mod error;
mod key;

pub use client::{CacheClient, MemoryCache};
pub use error::CacheError;
pub use key::CacheKey;

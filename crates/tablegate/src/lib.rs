//! # Tablegate
//!
//! The session front-end of a multi-process multiplayer game backend.
//!
//! A Tablegate process accepts packet-oriented requests over persistent
//! connections, re-attaches each caller's session across process boundaries
//! through a shared external cache, and routes every packet to game logic
//! without serializing unrelated requests. The two hard parts live here and
//! in `tablegate-session`:
//!
//! - **Distributed session consistency** — an authoritative identity in the
//!   shared cache is reconciled against locally cached session state on
//!   every lookup; the cache is the cross-process serialization point
//!   (last writer wins, deliberately).
//! - **Concurrent packet dispatch** — each request is an independent state
//!   machine (`Receiving → Dispatching → Awaiting → Completed`) running a
//!   configurable filter chain and a caller-supplied async packet handler;
//!   a pending handler never blocks any other request.
//!
//! Transport framing, the cache wire protocol, game logic, and packet-shape
//! serialization are external collaborators, reached through the
//! [`ResponseTransport`], [`CacheClient`](tablegate_cache::CacheClient),
//! and [`GameService`](tablegate_session::GameService) seams.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablegate::prelude::*;
//!
//! # struct MyGame;
//! # impl tablegate_session::GameService for MyGame {
//! #     async fn player_info(&self, _serial: tablegate_protocol::Serial)
//! #     -> Result<tablegate_session::UserProfile, tablegate_session::ServiceError> { unimplemented!() }
//! #     async fn handle_packet(&self, _a: Arc<tokio::sync::Mutex<tablegate_session::Avatar>>, _p: Packet)
//! #     -> Result<Vec<Packet>, tablegate_session::ServiceError> { unimplemented!() }
//! #     async fn tourney_notify_start(&self, _t: u32)
//! #     -> Result<(), tablegate_session::ServiceError> { unimplemented!() }
//! # }
//! let config = ServerConfig::default();
//! let cache = MemoryCache::new(config.cache_servers.clone());
//! let site = Site::new(config, cache, Arc::new(MyGame)).expect("filters");
//! // For each inbound request the transport layer builds a `Request`,
//! // feeds it the body, and calls `request_received`.
//! ```

mod config;
mod error;
mod filter;
mod proxy;
mod request;
mod site;
mod tourney;

pub use config::ServerConfig;
pub use error::TablegateError;
pub use filter::{
    DispatchContext, Filter, FilterChain, FilterError, FilterOutcome,
    FilterRegistry, NullFilter,
};
pub use proxy::{
    CLUSTER_CLIENT_IP_HEADER, FORWARDED_FOR_HEADER, find_proxied_ip,
};
pub use request::{
    QueryArgs, Request, RequestState, ResponseTransport, SESSION_COOKIE,
};
pub use site::{MessageSink, Site, TracingSink};

/// The usual imports for embedding Tablegate.
pub mod prelude {
    pub use crate::{
        Filter, FilterOutcome, FilterRegistry, Request, ResponseTransport,
        ServerConfig, Site,
    };
    pub use tablegate_cache::{CacheClient, MemoryCache};
    pub use tablegate_protocol::{Packet, PacketKind, Serial};
    pub use tablegate_session::{
        Avatar, GameService, RestHost, ServiceError, SessionError,
    };
}

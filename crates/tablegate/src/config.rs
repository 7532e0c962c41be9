//! Process configuration.
//!
//! Loading (file format, environment, flags) belongs to the embedding
//! process; this is just the recognized option set, serde-ready so any
//! loader can produce it.

use serde::{Deserialize, Serialize};
use tablegate_session::{RestHost, SessionConfig};

/// The options a Tablegate process recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server verbosity level; higher means chattier dispatch traces
    /// through the message sink. Structured logging via `tracing` is
    /// always on regardless.
    #[serde(default)]
    pub verbose: u8,

    /// Cache server pool addresses, e.g. `["127.0.0.1:11211"]`.
    #[serde(default)]
    pub cache_servers: Vec<String>,

    /// Seconds of inactivity before a session is expired by the sweep.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Lifetime in seconds of cookie-style session markers.
    #[serde(default = "default_cookie_timeout")]
    pub cookie_timeout_secs: u64,

    /// Ordered filter identifiers, resolved through a
    /// [`FilterRegistry`](crate::FilterRegistry) at site construction.
    #[serde(default)]
    pub filters: Vec<String>,

    /// This process's sticky-routing triple, if it participates in
    /// distributed routing.
    #[serde(default)]
    pub resthost: Option<RestHost>,
}

fn default_session_timeout() -> u64 {
    600
}

fn default_cookie_timeout() -> u64 {
    1200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            cache_servers: Vec::new(),
            session_timeout_secs: default_session_timeout(),
            cookie_timeout_secs: default_cookie_timeout(),
            filters: Vec::new(),
            resthost: None,
        }
    }
}

impl ServerConfig {
    /// The slice of this config the session store consumes.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            session_timeout_secs: self.session_timeout_secs,
            cookie_timeout_secs: self.cookie_timeout_secs,
            resthost: self.resthost.clone(),
        }
    }
}

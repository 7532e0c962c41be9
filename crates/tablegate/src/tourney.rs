//! The tournament-start endpoint: a degenerate dispatch variant.
//!
//! Cooperating processes poke a front-end with
//! `GET /tourney?tourney_serial=N` when a tournament starts. There is no
//! packet body and no filter chain — the request relays the notification
//! to the owning service, answers with a plain-text `OK` line, and
//! immediately expires whatever session it rode in on.

use tablegate_cache::CacheClient;
use tablegate_session::GameService;

use crate::request::{Request, RequestState};
use crate::Site;

impl Request {
    /// Handles a tournament-start request.
    pub async fn tourney_start_received<C: CacheClient, S: GameService>(
        &mut self,
        site: &Site<C, S>,
        method: &str,
        uri: &str,
    ) {
        self.state = RequestState::Dispatching;
        if let Some((_, query)) = uri.split_once('?') {
            self.args_mut().extend_from_query(query);
        }
        tracing::debug!(%method, %uri, "tournament start received");

        let serial = self
            .args()
            .first("tourney_serial")
            .and_then(|raw| raw.parse::<u32>().ok());
        let Some(serial) = serial else {
            self.fail(site, "missing or malformed tourney_serial", None);
            return;
        };

        self.state = RequestState::Awaiting;
        if let Err(err) = site.service().tourney_notify_start(serial).await {
            self.fail(site, &err.to_string(), None);
            return;
        }
        self.respond("text/plain", "OK\n");

        // This endpoint's session, if any, has served its purpose.
        let uid = self.args().first("uid").map(str::to_string);
        let auth = self.args().first("auth").map(str::to_string);
        let resolved = match (uid, auth) {
            (Some(uid), Some(auth)) => {
                site.store().resolve_session(&uid, &auth, false).await.ok()
            }
            _ => match self.session_marker() {
                Some(marker) => site
                    .store()
                    .resolve_session(&marker, &marker, false)
                    .await
                    .ok(),
                None => None,
            },
        };
        if let Some(session) = resolved {
            session.expire();
        }
    }
}

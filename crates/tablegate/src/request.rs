//! The per-request dispatch pipeline.
//!
//! Each inbound request is its own little state machine:
//!
//! ```text
//! Receiving ──→ Dispatching ──→ Awaiting ──→ Completed
//! (body chunks)  (session +      (handler      (response
//!                 filters)        pending)      written)
//! ```
//!
//! The transport layer feeds body bytes in with [`Request::got_length`] and
//! [`Request::handle_content_chunk`], then hands control to
//! [`Request::request_received`]. From there the pipeline parses the
//! packet, attaches a session, runs the filter chain, awaits the
//! caller-supplied packet handler, and frames the response.
//!
//! Requests are driven as independent tasks: a handler that suspends parks
//! only its own request. There is no lock spanning sessions or
//! connections, so a later-arrived request is free to complete and write
//! its response while an earlier one is still awaiting its handler.

use std::collections::HashMap;
use std::sync::Arc;

use tablegate_cache::{CacheClient, CacheKey};
use tablegate_protocol::{Packet, Serial, frame_response};
use tablegate_session::{GameService, SessionRef};
use tokio::sync::Mutex as AsyncMutex;

use crate::Site;
use crate::filter::{DispatchContext, FilterOutcome};
use crate::proxy::find_proxied_ip;

/// Name of the cookie-style session marker the transport layer may supply
/// for clients that can't carry uid/auth query parameters.
pub const SESSION_COOKIE: &str = "TG_SESSION";

// ---------------------------------------------------------------------------
// ResponseTransport
// ---------------------------------------------------------------------------

/// The boundary to the transport/connection framework.
///
/// The pipeline writes the status line, the header/body boundary, and the
/// body through [`write`](Self::write); header parsing, chunked reads and
/// socket I/O stay on the transport's side of the seam.
pub trait ResponseTransport: Send + Sync + 'static {
    /// Writes raw response bytes to the peer.
    fn write(&self, data: &[u8]);

    /// The raw peer address, if the transport knows it.
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

/// Writes the header/body boundary (once) followed by `body`.
pub(crate) fn write_response(
    transport: &dyn ResponseTransport,
    head_written: &mut bool,
    content_type: &str,
    body: &str,
) {
    if !*head_written {
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}; \
             charset=UTF-8\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        transport.write(head.as_bytes());
        *head_written = true;
    }
    transport.write(body.as_bytes());
}

// ---------------------------------------------------------------------------
// QueryArgs
// ---------------------------------------------------------------------------

/// Parsed query parameters, multi-valued like the wire allows.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    map: HashMap<String, Vec<String>>,
}

impl QueryArgs {
    /// Parses a raw query string (`a=1&b=two`).
    pub fn parse(query: &str) -> Self {
        let mut args = Self::default();
        args.extend_from_query(query);
        args
    }

    /// Parses `query` into this set, appending to existing keys.
    pub fn extend_from_query(&mut self, query: &str) {
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.insert(&percent_decode(key), &percent_decode(value));
        }
    }

    /// Adds a value under `key`.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.map
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// The first value under `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// Whether `key` is present at all.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
}

/// Minimal percent-decoding (`%XX` and `+`).
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // Only decode when both hex digits are actually present;
            // anything else passes through untouched.
            b'%' if i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit() =>
            {
                let hex = &raw[i + 1..i + 3];
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accumulating body content.
    Receiving,
    /// Session resolved, filter chain running.
    Dispatching,
    /// Packet handler invoked; its result may still be pending.
    Awaiting,
    /// Response written, request closed.
    Completed,
}

/// A single inbound request moving through the dispatch pipeline.
pub struct Request {
    transport: Arc<dyn ResponseTransport>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    expected_len: usize,
    content: Vec<u8>,
    args: QueryArgs,
    annotations: HashMap<String, String>,
    session: Option<SessionRef>,
    pub(crate) state: RequestState,
    head_written: bool,
}

impl Request {
    /// A fresh request bound to its transport.
    pub fn new(transport: Arc<dyn ResponseTransport>) -> Self {
        Self {
            transport,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            expected_len: 0,
            content: Vec::new(),
            args: QueryArgs::default(),
            annotations: HashMap::new(),
            session: None,
            state: RequestState::Receiving,
            head_written: false,
        }
    }

    // -- Transport-side ingestion -----------------------------------------

    /// Announces the body length the transport will deliver.
    pub fn got_length(&mut self, length: usize) {
        self.expected_len = length;
        self.content = Vec::with_capacity(length);
    }

    /// Appends a chunk of body content.
    pub fn handle_content_chunk(&mut self, data: &[u8]) {
        self.content.extend_from_slice(data);
    }

    /// Whether the announced body length has fully arrived. The transport
    /// layer polls this to know when to hand over to
    /// [`request_received`](Self::request_received).
    pub fn content_complete(&self) -> bool {
        self.content.len() >= self.expected_len
    }

    /// Records a request header (name is normalized to lowercase).
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Reads a request header by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Records a cookie received with the request.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    /// The cookie-style session marker, if the client sent one.
    pub fn session_marker(&self) -> Option<String> {
        self.cookies.get(SESSION_COOKIE).cloned()
    }

    // -- Observation -------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// The parsed query arguments.
    pub fn args(&self) -> &QueryArgs {
        &self.args
    }

    /// Mutable access to the query arguments (the transport layer may
    /// pre-seed them).
    pub fn args_mut(&mut self) -> &mut QueryArgs {
        &mut self.args
    }

    /// Annotations left by pass-through filters.
    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    /// The session attached during dispatch, if any.
    pub fn session(&self) -> Option<&SessionRef> {
        self.session.as_ref()
    }

    /// Resolves the client address behind any proxies, in strict priority
    /// order: cluster header, forwarded-for header, raw peer.
    pub fn find_proxied_ip(&self) -> (String, String) {
        find_proxied_ip(&self.headers, self.transport.peer_addr())
    }

    // -- Dispatch ----------------------------------------------------------

    /// Runs the full dispatch pipeline for this request.
    ///
    /// 1. Parse the packet from the accumulated body, or from the `packet`
    ///    query parameter; the `type` field is a numeric code or symbolic
    ///    name.
    /// 2. When `uid`/`auth` query parameters are present, resolve or
    ///    create a session (reconciling for normal packets,
    ///    non-reconciling for long-poll kinds). Absent parameters are
    ///    legal — anonymous ping-style requests — and a cookie marker can
    ///    re-attach a session instead.
    /// 3. Run the filter chain; abort or finish stops here.
    /// 4. Await the caller-supplied packet handler.
    /// 5. On handler failure, respond with a single error packet carrying
    ///    the failure message and log it IP-prefixed to the message sink.
    /// 6. Frame the outgoing packets as a JSON array (JSONP-wrapped when a
    ///    `jsonp` callback was given) and mark the request `Completed`.
    pub async fn request_received<C: CacheClient, S: GameService>(
        &mut self,
        site: &Site<C, S>,
        method: &str,
        uri: &str,
    ) {
        self.state = RequestState::Dispatching;
        if let Some((_, query)) = uri.split_once('?') {
            self.args.extend_from_query(query);
        }
        let jsonp = self.args.first("jsonp").map(str::to_string);
        tracing::debug!(%method, %uri, "request received");

        // Step 1: locate and parse the packet.
        let raw = if self.content.is_empty() {
            self.args.first("packet").map(str::to_string)
        } else {
            Some(String::from_utf8_lossy(&self.content).into_owned())
        };
        let Some(raw) = raw else {
            self.fail(site, "no packet in request", jsonp.as_deref());
            return;
        };
        let packet = match Packet::from_json(&raw) {
            Ok(packet) => packet,
            Err(err) => {
                self.fail(
                    site,
                    &format!("invalid packet: {err}"),
                    jsonp.as_deref(),
                );
                return;
            }
        };

        if site.config().verbose >= 3 {
            let (_, ip) = self.find_proxied_ip();
            site.message(&format!("{ip}: dispatch {}", packet.kind()));
        }

        // Step 2: attach a session.
        //
        // Long-poll kinds take the non-reconciling path and skip the
        // activity touch: receiving or answering a long poll is not
        // evidence of anything about the session's identity, and must not
        // expire it or demand a fully bound handle.
        let long_poll = packet.kind().is_long_poll();
        let explain = self.args.first("explain") == Some("yes");
        let uid = self.args.first("uid").map(str::to_string);
        let auth = self.args.first("auth").map(str::to_string);

        if let (Some(uid), Some(auth)) = (uid, auth) {
            let resolved = if long_poll {
                site.store().resolve_session(&uid, &auth, explain).await
            } else {
                site.store().get_session(&uid, &auth, explain).await
            };
            match resolved {
                Ok(session) => {
                    if !long_poll {
                        session.touch();
                    }
                    self.session = Some(session);
                }
                Err(err) => {
                    self.fail(site, &err.to_string(), jsonp.as_deref());
                    return;
                }
            }
        } else if let Some(marker) = self.session_marker() {
            self.reattach_from_marker(site, &marker, explain).await;
        }

        // Step 3: the filter chain.
        let outcome = {
            let mut ctx = DispatchContext {
                packet: &packet,
                args: &self.args,
                annotations: &mut self.annotations,
                transport: self.transport.as_ref(),
                head_written: &mut self.head_written,
            };
            site.filters().apply(&mut ctx)
        };
        match outcome {
            FilterOutcome::Continue => {}
            FilterOutcome::Abort(message) => {
                self.fail(site, &message, jsonp.as_deref());
                return;
            }
            FilterOutcome::Finish => {
                self.state = RequestState::Completed;
                return;
            }
        }

        // Step 4: packet logic. Anonymous requests get a throwaway avatar.
        self.state = RequestState::Awaiting;
        let (avatar, anonymous) = match &self.session {
            Some(session) => (Arc::clone(&session.avatar), false),
            None => (
                Arc::new(AsyncMutex::new(site.service().create_avatar())),
                true,
            ),
        };

        let result = site
            .service()
            .handle_packet(Arc::clone(&avatar), packet.clone())
            .await;

        // Steps 5/6: frame the result.
        match result {
            Ok(packets) => {
                match frame_response(&packets, jsonp.as_deref()) {
                    Ok(body) => self.respond("application/json", &body),
                    Err(err) => {
                        self.fail(
                            site,
                            &format!("encode failed: {err}"),
                            None,
                        );
                    }
                }
            }
            Err(err) => {
                self.fail(site, &err.to_string(), jsonp.as_deref());
            }
        }

        if anonymous {
            // Hand the avatar back if the handler didn't keep a clone.
            if let Ok(mutex) = Arc::try_unwrap(avatar) {
                site.service().destroy_avatar(mutex.into_inner());
            }
        }

        // Long-poll kinds are exempt from the post-dispatch persist
        // decision; everything else settles whether the session survives.
        if !long_poll {
            if let Some(session) = self.session.clone() {
                if let Err(err) = site.store().persist_session(&session).await
                {
                    tracing::warn!(
                        error = %err,
                        "persist after dispatch failed"
                    );
                }
            }
        }
    }

    /// Re-attaches a session from a cookie-style marker, best-effort. An
    /// unknown or invalid marker leaves the request anonymous.
    async fn reattach_from_marker<C: CacheClient, S: GameService>(
        &mut self,
        site: &Site<C, S>,
        marker: &str,
        explain: bool,
    ) {
        let Ok(marker_key) = CacheKey::new(marker) else {
            tracing::debug!("ignoring non-canonical session marker");
            return;
        };
        let serial = match site.store().cache().get(&marker_key).await {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "marker lookup failed");
                return;
            }
        };
        match site.store().resolve_session(marker, marker, explain).await {
            Ok(session) => {
                if let Ok(parsed) = serial.trim().parse::<u32>() {
                    session.avatar.lock().await.user.serial = Serial(parsed);
                }
                session.touch();
                self.session = Some(session);
            }
            Err(err) => {
                tracing::debug!(error = %err, "marker re-attach failed");
            }
        }
    }

    /// Writes an error response (same framing as a normal one, with a
    /// single error packet) and records the failure IP-prefixed in the
    /// process message sink.
    pub(crate) fn fail<C: CacheClient, S: GameService>(
        &mut self,
        site: &Site<C, S>,
        message: &str,
        jsonp: Option<&str>,
    ) {
        let (_, ip) = self.find_proxied_ip();
        site.message(&format!("{ip}: {message}"));
        let body = frame_response(&[Packet::error(message)], jsonp)
            .unwrap_or_else(|_| "[]".to_string());
        self.respond("application/json", &body);
    }

    /// Writes the response and marks the request completed.
    pub(crate) fn respond(&mut self, content_type: &str, body: &str) {
        write_response(
            self.transport.as_ref(),
            &mut self.head_written,
            content_type,
            body,
        );
        self.state = RequestState::Completed;
    }
}

// =========================================================================
// Tests
// =========================================================================

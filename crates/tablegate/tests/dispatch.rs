//! Integration tests for the dispatch pipeline, filter chain, session
//! attach/persist behavior, and the tournament-start endpoint.
//!
//! The transport is a recording mock (everything the pipeline writes is
//! captured as bytes) and the game service is scripted per test, so each
//! scenario drives the real pipeline end to end and asserts on the exact
//! bytes a client would see.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::Duration;

use tablegate::{
    DispatchContext, Filter, FilterOutcome, FilterRegistry, MessageSink,
    Request, RequestState, ResponseTransport, SESSION_COOKIE, ServerConfig,
    Site,
};
use tablegate_cache::{CacheClient, CacheKey, MemoryCache};
use tablegate_protocol::{Packet, PacketKind, Serial, TableId};
use tablegate_session::{
    Avatar, GameService, ServiceError, UserProfile,
};
use tokio::sync::{Mutex as AsyncMutex, oneshot};

// =========================================================================
// Mock transport, sink, and scripted game service
// =========================================================================

/// Records everything the pipeline writes.
#[derive(Default)]
struct MockTransport {
    peer: Option<String>,
    written: StdMutex<Vec<u8>>,
}

impl MockTransport {
    fn with_peer(peer: &str) -> Self {
        Self { peer: Some(peer.to_string()), written: StdMutex::default() }
    }

    fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }
}

impl ResponseTransport for MockTransport {
    fn write(&self, data: &[u8]) {
        self.written.lock().unwrap().extend_from_slice(data);
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer.clone()
    }
}

/// Captures message-sink lines for assertions.
struct CapturingSink {
    lines: Arc<StdMutex<Vec<String>>>,
}

impl MessageSink for CapturingSink {
    fn message(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// One scripted handler reply.
enum Scripted {
    Now(Result<Vec<Packet>, String>),
    Wait(oneshot::Receiver<Vec<Packet>>),
}

/// A game service whose packet handler replays a per-test script. With an
/// empty script every packet yields no outgoing packets, like a ping.
#[derive(Default)]
struct TestService {
    script: StdMutex<VecDeque<Scripted>>,
    handled: StdMutex<Vec<PacketKind>>,
    tourney: StdMutex<Option<u32>>,
}

impl TestService {
    fn push_now(&self, packets: Vec<Packet>) {
        self.script.lock().unwrap().push_back(Scripted::Now(Ok(packets)));
    }

    fn push_fail(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Now(Err(message.to_string())));
    }

    fn push_wait(&self, gate: oneshot::Receiver<Vec<Packet>>) {
        self.script.lock().unwrap().push_back(Scripted::Wait(gate));
    }

    fn handled(&self) -> Vec<PacketKind> {
        self.handled.lock().unwrap().clone()
    }

    fn tourney(&self) -> Option<u32> {
        *self.tourney.lock().unwrap()
    }
}

impl GameService for TestService {
    async fn player_info(
        &self,
        serial: Serial,
    ) -> Result<UserProfile, ServiceError> {
        Ok(UserProfile {
            serial,
            name: "hans".into(),
            locale: "en_US.UTF-8".into(),
        })
    }

    async fn handle_packet(
        &self,
        _avatar: Arc<AsyncMutex<Avatar>>,
        packet: Packet,
    ) -> Result<Vec<Packet>, ServiceError> {
        self.handled.lock().unwrap().push(packet.kind());
        let next = { self.script.lock().unwrap().pop_front() };
        match next {
            None => Ok(Vec::new()),
            Some(Scripted::Now(Ok(packets))) => Ok(packets),
            Some(Scripted::Now(Err(message))) => {
                Err(ServiceError::new(message))
            }
            Some(Scripted::Wait(gate)) => {
                gate.await.map_err(|_| ServiceError::new("gate dropped"))
            }
        }
    }

    async fn tourney_notify_start(
        &self,
        tourney_serial: u32,
    ) -> Result<(), ServiceError> {
        *self.tourney.lock().unwrap() = Some(tourney_serial);
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Fixture {
    site: Site<MemoryCache, TestService>,
    cache: MemoryCache,
    service: Arc<TestService>,
    sink: Arc<StdMutex<Vec<String>>>,
}

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env(),
            )
            .try_init();
    });
}

fn verbose_config() -> ServerConfig {
    ServerConfig { verbose: 6, ..ServerConfig::default() }
}

fn fixture_with(config: ServerConfig, registry: &FilterRegistry) -> Fixture {
    init_tracing();
    let cache = MemoryCache::new(config.cache_servers.clone());
    let service = Arc::new(TestService::default());
    let mut site = Site::with_registry(
        config,
        cache.clone(),
        Arc::clone(&service),
        registry,
    )
    .expect("filters should resolve");
    let sink = Arc::new(StdMutex::new(Vec::new()));
    site.set_message_sink(Box::new(CapturingSink {
        lines: Arc::clone(&sink),
    }));
    Fixture { site, cache, service, sink }
}

fn fixture() -> Fixture {
    fixture_with(verbose_config(), &FilterRegistry::builtin())
}

fn body_request(transport: &Arc<MockTransport>, body: &str) -> Request {
    let mut request = Request::new(transport.clone());
    request.got_length(body.len());
    request.handle_content_chunk(body.as_bytes());
    request
}

fn ping_request(transport: &Arc<MockTransport>) -> Request {
    body_request(transport, r#"{"type": 1}"#)
}

fn key(raw: &str) -> CacheKey {
    CacheKey::new(raw).unwrap()
}

// =========================================================================
// Basic rendering
// =========================================================================

#[tokio::test]
async fn test_request_received_ping_writes_empty_array() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request.request_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("\r\n\r\n[]"));
    assert_eq!(request.state(), RequestState::Completed);
    assert_eq!(fx.service.handled(), vec![PacketKind::Ping]);
}

#[tokio::test]
async fn test_request_received_packet_in_query_param() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);

    request
        .request_received(&fx.site, "GET", r#"/?packet={"type":"Ping"}"#)
        .await;

    assert!(transport.written().contains("\r\n\r\n[]"));
}

#[tokio::test]
async fn test_request_received_jsonp_wraps_callback() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);

    request
        .request_received(
            &fx.site,
            "GET",
            r#"/?jsonp=FUN&packet={"type":"Ping"}"#,
        )
        .await;

    assert!(transport.written().contains("\r\n\r\nFUN([])"));
}

#[tokio::test]
async fn test_request_received_without_packet_writes_error() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);

    request.request_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("no packet"));
    assert_eq!(request.state(), RequestState::Completed);
    assert!(fx.service.handled().is_empty());
}

#[tokio::test]
async fn test_request_received_unknown_packet_type_writes_error() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = body_request(&transport, r#"{"type": 999}"#);

    request.request_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("invalid packet"));
    assert!(fx.service.handled().is_empty());
}

// =========================================================================
// Handler failures
// =========================================================================

#[tokio::test]
async fn test_handler_failure_message_appears_in_response() {
    let fx = fixture();
    fx.service.push_fail("UNLIKELY");
    let transport = Arc::new(MockTransport::with_peer("127.0.0.1"));
    let mut request = ping_request(&transport);

    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    // The failure message is substituted into a single error packet.
    let written = transport.written();
    assert!(written.contains("UNLIKELY"), "got {written}");
    assert!(written.contains("\"type\":3"), "got {written}");
}

#[tokio::test]
async fn test_handler_failure_is_logged_with_client_ip_prefix() {
    let fx = fixture();
    fx.service.push_fail("boom");
    let transport = Arc::new(MockTransport::with_peer("127.0.0.1"));
    let mut request = ping_request(&transport);

    request.request_received(&fx.site, "GET", "/").await;

    let lines = fx.sink.lock().unwrap().clone();
    assert!(
        lines.iter().any(|l| l.contains("127.0.0.1") && l.contains("boom")),
        "got {lines:?}"
    );
}

// =========================================================================
// Concurrency: completion order is unconstrained
// =========================================================================

#[tokio::test]
async fn test_simultaneous_requests_complete_independently() {
    let fx = fixture();
    // The second request reconciles against the cache, so the serial must
    // already be there.
    fx.cache.set(&key("auth"), "111").await.unwrap();

    let (gate_tx, gate_rx) = oneshot::channel();
    fx.service.push_wait(gate_rx);
    fx.service.push_now(vec![Packet::Ack]);

    let site = Arc::new(fx.site);

    // First request parks inside its handler.
    let t1 = Arc::new(MockTransport::default());
    let mut r1 = ping_request(&t1);
    let site1 = Arc::clone(&site);
    let pending = tokio::spawn(async move {
        r1.request_received(&site1, "GET", "/?uid=uid&auth=auth").await;
        r1
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(t1.written().is_empty(), "r1 must still be pending");

    // Second request on the same session completes immediately.
    let t2 = Arc::new(MockTransport::default());
    let mut r2 = ping_request(&t2);
    r2.request_received(&site, "GET", "/?uid=uid&auth=auth").await;

    assert!(t2.written().contains("\"type\":2"), "r2 response visible");
    assert!(t1.written().is_empty(), "r1 still not completed");

    // Releasing the gate completes the first request, independently.
    gate_tx.send(vec![Packet::Ack]).unwrap();
    let r1 = pending.await.unwrap();
    assert!(t1.written().contains("\"type\":2"));
    assert_eq!(r1.state(), RequestState::Completed);
}

// =========================================================================
// Session attach, reconcile, persist
// =========================================================================

#[tokio::test]
async fn test_dispatch_expires_session_not_worth_keeping() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    // No joined tables, no explain games: the post-dispatch persist
    // decision lets the session die.
    let session = request.session().expect("session attached").clone();
    assert!(session.expired());
}

#[tokio::test]
async fn test_dispatch_keeps_session_with_joined_table() {
    let fx = fixture();
    fx.cache.set(&key("auth"), "111").await.unwrap();
    let session =
        fx.site.store().make_session("uid", "auth", false).await.unwrap();
    session
        .avatar
        .lock()
        .await
        .tables
        .insert(TableId(1), "table".into());

    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);
    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    assert!(!session.expired());
    assert!(transport.written().contains("\r\n\r\n[]"));
}

#[tokio::test]
async fn test_ping_after_out_of_band_invalidation_writes_error() {
    // A live local session whose cache entry vanished: normal dispatch
    // reconciles, fails loudly, and the session ends expired.
    let fx = fixture();
    let session =
        fx.site.store().make_session("uid", "auth", false).await.unwrap();

    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);
    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    assert!(transport.written().contains("session not found"));
    assert!(session.expired());
}

#[tokio::test]
async fn test_explain_arg_enables_projection() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth&explain=yes")
        .await;

    let session = request.session().expect("session attached").clone();
    assert!(session.avatar.lock().await.explain.is_some());
}

// =========================================================================
// Long-poll exemptions
// =========================================================================

#[tokio::test]
async fn test_long_poll_return_on_fresh_session_does_not_expire() {
    // The very first request for a freshly created session is a long-poll
    // return, with nothing in the cache: it must neither reconcile-fail
    // nor leave the session expired.
    let fx = fixture();
    let session =
        fx.site.store().make_session("uid", "auth", false).await.unwrap();

    let transport = Arc::new(MockTransport::default());
    let mut request =
        body_request(&transport, r#"{"type": "LongPollReturn"}"#);
    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    assert!(!session.expired());
    let written = transport.written();
    assert!(written.contains("\r\n\r\n[]"), "got {written}");
}

#[tokio::test]
async fn test_long_poll_does_not_touch_activity_clock() {
    let fx = fixture();
    let session =
        fx.site.store().make_session("uid", "auth", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let transport = Arc::new(MockTransport::default());
    let mut request = body_request(&transport, r#"{"type": "LongPoll"}"#);
    request
        .request_received(&fx.site, "GET", "/?uid=uid&auth=auth")
        .await;

    // Had the long poll touched the session, idle time would have reset.
    assert!(session.idle_for() >= Duration::from_millis(25));
    assert!(!session.expired());
}

// =========================================================================
// Cookie-marker re-attach
// =========================================================================

#[tokio::test]
async fn test_cookie_marker_reattaches_session() {
    let fx = fixture();
    fx.cache.set(&key("marker123"), "5").await.unwrap();

    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);
    request.set_cookie(SESSION_COOKIE, "marker123");

    request.request_received(&fx.site, "GET", "/").await;

    let session = request.session().expect("marker attached a session");
    assert_eq!(session.avatar.lock().await.serial(), Serial(5));
    assert!(transport.written().contains("\r\n\r\n[]"));
}

#[tokio::test]
async fn test_unknown_cookie_marker_stays_anonymous() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);
    request.set_cookie(SESSION_COOKIE, "never-seen");

    request.request_received(&fx.site, "GET", "/").await;

    assert!(request.session().is_none());
    assert!(transport.written().contains("\r\n\r\n[]"));
}

// =========================================================================
// Client IP resolution and message prefixes
// =========================================================================

#[tokio::test]
async fn test_message_prefix_uses_forwarded_ip() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);
    request.set_header("x-forwarded-for", "1.2.3.4");

    request.request_received(&fx.site, "GET", "/").await;

    let lines = fx.sink.lock().unwrap().clone();
    assert!(
        lines.iter().any(|l| l.contains("1.2.3.4")),
        "got {lines:?}"
    );
}

#[tokio::test]
async fn test_find_proxied_ip_precedence_on_request() {
    let transport = Arc::new(MockTransport::with_peer("proxy.example.org"));
    let mut request = Request::new(transport.clone());

    assert_eq!(
        request.find_proxied_ip(),
        ("client-ip".to_string(), "proxy.example.org".to_string())
    );

    request.set_header("x-forwarded-for", "forward-player.example.com");
    assert_eq!(
        request.find_proxied_ip(),
        (
            "x-forwarded-for".to_string(),
            "forward-player.example.com".to_string()
        )
    );

    // The cluster-assigned header outranks forwarded-for.
    request.set_header("x-cluster-client-ip", "cluster-player.example.com");
    assert_eq!(
        request.find_proxied_ip(),
        (
            "x-cluster-client-ip".to_string(),
            "cluster-player.example.com".to_string()
        )
    );
}

// =========================================================================
// Filter chain
// =========================================================================

struct AnnotatingFilter;

impl Filter for AnnotatingFilter {
    fn apply(&self, ctx: &mut DispatchContext<'_>) -> FilterOutcome {
        ctx.annotate("HERE", "yes");
        FilterOutcome::Continue
    }
}

struct AbortingFilter;

impl Filter for AbortingFilter {
    fn apply(&self, _ctx: &mut DispatchContext<'_>) -> FilterOutcome {
        FilterOutcome::Abort("UNLIKELY".into())
    }
}

struct FinishingFilter;

impl Filter for FinishingFilter {
    fn apply(&self, ctx: &mut DispatchContext<'_>) -> FilterOutcome {
        ctx.finish_with("text/html", "FINISHED");
        FilterOutcome::Finish
    }
}

fn filter_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::builtin();
    registry.register("annotate", || Box::new(AnnotatingFilter));
    registry.register("abort", || Box::new(AbortingFilter));
    registry.register("finish", || Box::new(FinishingFilter));
    registry
}

fn filter_config(filters: &[&str]) -> ServerConfig {
    ServerConfig {
        filters: filters.iter().map(|f| f.to_string()).collect(),
        ..verbose_config()
    }
}

#[tokio::test]
async fn test_pass_through_filter_annotation_survives_dispatch() {
    let fx =
        fixture_with(filter_config(&["annotate", "null"]), &filter_registry());
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request.request_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("\r\n\r\n[]"));
    assert_eq!(
        request.annotations().get("HERE").map(String::as_str),
        Some("yes")
    );
    // Default dispatch still ran.
    assert_eq!(fx.service.handled(), vec![PacketKind::Ping]);
}

#[tokio::test]
async fn test_aborting_filter_error_text_reaches_response() {
    let fx = fixture_with(filter_config(&["abort"]), &filter_registry());
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request.request_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("UNLIKELY"));
    // Default packet handling never ran.
    assert!(fx.service.handled().is_empty());
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_finishing_filter_owns_the_response() {
    let fx = fixture_with(
        filter_config(&["finish", "annotate"]),
        &filter_registry(),
    );
    let transport = Arc::new(MockTransport::default());
    let mut request = ping_request(&transport);

    request.request_received(&fx.site, "GET", "/").await;

    let written = transport.written();
    assert!(written.contains("\r\n\r\nFINISHED"), "got {written}");
    // Nothing else wrote: no packet array, no later filter, no handler.
    assert!(!written.contains("[]"));
    assert!(request.annotations().is_empty());
    assert!(fx.service.handled().is_empty());
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_unknown_filter_identifier_fails_site_construction() {
    let config = filter_config(&["no-such-filter"]);
    let cache = MemoryCache::new(vec![]);
    let err = Site::new(config, cache, Arc::new(TestService::default()))
        .err()
        .expect("construction must fail");
    assert!(err.to_string().contains("no-such-filter"));
}

// =========================================================================
// Tournament start
// =========================================================================

#[tokio::test]
async fn test_tourney_start_notifies_and_replies_ok() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);

    request
        .tourney_start_received(&fx.site, "GET", "/?tourney_serial=666")
        .await;

    assert_eq!(fx.service.tourney(), Some(666));
    assert!(transport.written().contains("\r\n\r\nOK"));
    assert_eq!(request.state(), RequestState::Completed);
}

#[tokio::test]
async fn test_tourney_start_expires_attached_session() {
    let fx = fixture();
    let session =
        fx.site.store().make_session("uid", "auth", false).await.unwrap();

    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);
    request
        .tourney_start_received(
            &fx.site,
            "GET",
            "/?tourney_serial=7&uid=uid&auth=auth",
        )
        .await;

    assert!(session.expired());
    assert!(transport.written().contains("\r\n\r\nOK"));
}

#[tokio::test]
async fn test_tourney_start_missing_serial_writes_error() {
    let fx = fixture();
    let transport = Arc::new(MockTransport::default());
    let mut request = Request::new(transport.clone());
    request.got_length(0);

    request.tourney_start_received(&fx.site, "GET", "/").await;

    assert!(transport.written().contains("tourney_serial"));
    assert_eq!(fx.service.tourney(), None);
}

// =========================================================================
// Cache server pool plumbing
// =========================================================================

#[tokio::test]
async fn test_site_cache_records_configured_server_pool() {
    let config = ServerConfig {
        cache_servers: vec!["127.0.0.1:11211".to_string()],
        ..verbose_config()
    };
    let fx = fixture_with(config, &FilterRegistry::builtin());
    assert_eq!(
        fx.site.store().cache().servers(),
        ["127.0.0.1:11211".to_string()]
    );
}

#![allow(clippy::unwrap_used)]
// Integration tests for `StreamSession` against a wiremock bridge and an
// in-memory encrypted transport.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huesync_api::{
    AreaStatus, BridgeConfig, BridgeGateway, Channel, EntertainmentArea, EventBus, Position,
    RequestKind,
};
use huesync_core::codec::PROTOCOL_NAME;
use huesync_core::{
    CoreError, CursorSync, DtlsTarget, EncryptedTransport, PointerSampler, Rgb, SessionState,
    StreamSession, SyncEngine, SyncMode, SyncParameters, TransportEvent,
};

// ── Helpers ─────────────────────────────────────────────────────────

const AREA_ID: &str = "area-1";
const AREA_PATH: &str = "/clip/v2/resource/entertainment_configuration/area-1";

#[derive(Default)]
struct MemoryTransport {
    frames: Mutex<Vec<Vec<u8>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    events: EventBus<TransportEvent>,
}

impl MemoryTransport {
    fn sent(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl EncryptedTransport for MemoryTransport {
    fn connect_bridge(&self, target: &DtlsTarget) {
        assert_eq!(target.port, 2100);
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.events.emit(&TransportEvent::Connected);
    }

    fn close_bridge(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.emit(&TransportEvent::Disconnected);
    }

    fn send_encrypted(&self, frame: &[u8]) -> io::Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn events(&self) -> &EventBus<TransportEvent> {
        &self.events
    }
}

struct SolidPointer(Rgb);

impl PointerSampler for SolidPointer {
    async fn pixel_under_pointer(&self) -> Option<Rgb> {
        Some(self.0)
    }
}

fn area() -> EntertainmentArea {
    EntertainmentArea {
        id: AREA_ID.into(),
        name: "TV".into(),
        status: AreaStatus::Inactive,
        channels: vec![
            Channel {
                channel_id: 0,
                position: Position { x: -1.0, y: 0.0, z: 0.0 },
            },
            Channel {
                channel_id: 1,
                position: Position { x: 1.0, y: 0.0, z: 0.0 },
            },
        ],
    }
}

fn cursor_engine(color: Rgb) -> Arc<dyn SyncEngine> {
    Arc::new(CursorSync::new(
        &area(),
        SyncParameters::new(1.0, 1.0),
        SolidPointer(color),
    ))
}

struct Harness {
    server: MockServer,
    gateway: Arc<BridgeGateway>,
    transport: Arc<MemoryTransport>,
    session: StreamSession,
}

async fn setup_with(client_key: Option<&str>) -> Harness {
    let server = MockServer::start().await;
    let key: SecretString = "test-application-key".to_string().into();
    let mut config = BridgeConfig::new(server.uri()).unwrap().with_application_key(key);
    if let Some(client_key) = client_key {
        config = config.with_client_key(client_key.to_string().into());
    }
    let gateway = Arc::new(BridgeGateway::with_client(config, reqwest::Client::new()));
    let transport = Arc::new(MemoryTransport::default());
    let session = StreamSession::new(
        Arc::clone(&gateway),
        Arc::clone(&transport) as Arc<dyn EncryptedTransport>,
        None,
    );
    Harness {
        server,
        gateway,
        transport,
        session,
    }
}

async fn setup() -> Harness {
    setup_with(Some("00112233445566778899AABBCCDDEEFF")).await
}

async fn mount_action(server: &MockServer, action: &str, status: u16, expected: u64) {
    Mock::given(method("PUT"))
        .and(path(AREA_PATH))
        .and(body_partial_json(json!({ "action": action })))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(json!({ "errors": [], "data": [{ "rid": AREA_ID }] })),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn wait_for_state(session: &StreamSession, state: SessionState) {
    let mut rx = session.watch_state();
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("session never reached {state}"))
        .unwrap();
}

// ── Start ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_streams_after_handshake() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;

    tokio_test::assert_ok!(h.session.start(cursor_engine(Rgb::new(10, 200, 30))).await);
    wait_for_state(&h.session, SessionState::Streaming).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.active_area().as_deref(), Some(AREA_ID));
    assert_eq!(h.session.active_mode(), Some(SyncMode::Cursor));
    assert!(h.transport.sent() >= 2);

    let frame = h.transport.frames.lock().unwrap()[0].clone();
    assert_eq!(&frame[..9], PROTOCOL_NAME);
    assert_eq!(&frame[16..16 + AREA_ID.len()], AREA_ID.as_bytes());
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    let err = h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap_err();

    assert!(matches!(err, CoreError::AlreadyStreaming { ref area_id } if area_id == AREA_ID));
}

#[tokio::test]
async fn test_missing_client_key_fails_without_requests() {
    let h = setup_with(None).await;
    mount_action(&h.server, "start", 200, 0).await;

    let err = h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap_err();

    assert!(matches!(err, CoreError::NoStreamingCredentials));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_enable_failure_leaves_session_idle() {
    let h = setup().await;
    mount_action(&h.server, "start", 503, 1).await;

    let err = h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap_err();

    assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.session.active_area(), None);
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_enable_never_closes_or_disables() {
    for _ in 0..25 {
        let h = setup().await;
        mount_action(&h.server, "start", 503, 1).await;
        mount_action(&h.server, "stop", 200, 0).await;

        let err = h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.transport.closes.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.state(), SessionState::Idle);
    }
}

#[tokio::test]
async fn test_bridge_error_payload_rejects_start() {
    let h = setup().await;
    Mock::given(method("PUT"))
        .and(path(AREA_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "description": "area already in use" }],
            "data": []
        })))
        .mount(&h.server)
        .await;

    let err = h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap_err();

    assert!(matches!(err, CoreError::Rejected { ref message } if message.contains("in use")));
    assert_eq!(h.session.state(), SessionState::Idle);
}

// ── Stop ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_sends_no_further_frames() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;
    mount_action(&h.server, "stop", 200, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    h.session.stop().await;
    let sent = h.transport.sent();
    wait_for_state(&h.session, SessionState::Idle).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(sent > 0);
    assert_eq!(h.transport.sent(), sent);
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.active_area(), None);
}

#[tokio::test]
async fn test_stop_without_confirmation_still_resets() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;
    mount_action(&h.server, "stop", 500, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;
    h.session.stop().await;

    wait_for_state(&h.session, SessionState::Idle).await;
}

#[tokio::test]
async fn test_stop_when_idle_is_a_no_op() {
    let h = setup().await;
    mount_action(&h.server, "stop", 200, 0).await;

    h.session.stop().await;

    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_problem_tears_down_stream() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;
    mount_action(&h.server, "stop", 200, 1).await;
    Mock::given(method("GET"))
        .and(path("/clip/v2/resource"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;

    h.gateway.fetch_all_resources().await;

    wait_for_state(&h.session, SessionState::Idle).await;
    assert_eq!(h.transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.active_area(), None);
}

#[tokio::test]
async fn test_inactive_area_event_stops_stream() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;
    mount_action(&h.server, "stop", 200, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;

    let record = json!([{
        "id": "batch-1",
        "type": "update",
        "data": [{ "id": AREA_ID, "type": "entertainment_configuration", "status": "inactive" }]
    }]);
    h.gateway
        .dispatch_response(RequestKind::EventStreamPayload, &record.to_string());

    wait_for_state(&h.session, SessionState::Idle).await;
    assert_eq!(h.session.active_area(), None);
}

#[tokio::test]
async fn test_other_area_events_are_ignored() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;

    let record = json!([{
        "id": "batch-1",
        "type": "update",
        "data": [{ "id": "area-2", "type": "entertainment_configuration", "status": "inactive" }]
    }]);
    h.gateway
        .dispatch_response(RequestKind::EventStreamPayload, &record.to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.session.state(), SessionState::Streaming);
}

// ── Mode switching and parameters ───────────────────────────────────

#[tokio::test]
async fn test_switch_mode_starts_queued_engine_after_confirmation() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 2).await;
    mount_action(&h.server, "stop", 200, 1).await;

    let first = cursor_engine(Rgb::WHITE);
    let second = cursor_engine(Rgb::new(255, 0, 0));
    h.session.start(Arc::clone(&first)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;

    h.session.switch_mode(Arc::clone(&second)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(3), async {
        while !second.is_streaming() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!first.is_streaming());
    assert_eq!(h.transport.connects.load(Ordering::SeqCst), 2);
    wait_for_state(&h.session, SessionState::Streaming).await;
}

#[tokio::test]
async fn test_switch_mode_when_idle_starts_directly() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;

    h.session.switch_mode(cursor_engine(Rgb::WHITE)).await.unwrap();

    wait_for_state(&h.session, SessionState::Streaming).await;
}

#[tokio::test]
async fn test_parameters_reach_active_engine() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;

    let engine = cursor_engine(Rgb::WHITE);
    h.session.start(Arc::clone(&engine)).await.unwrap();
    h.session.set_parameters(SyncParameters::new(0.4, 0.2));

    assert_eq!(engine.parameters(), SyncParameters::new(0.4, 0.2));
}

#[tokio::test]
async fn test_shutdown_stops_and_refuses_restart() {
    let h = setup().await;
    mount_action(&h.server, "start", 200, 1).await;
    mount_action(&h.server, "stop", 200, 1).await;

    h.session.start(cursor_engine(Rgb::WHITE)).await.unwrap();
    wait_for_state(&h.session, SessionState::Streaming).await;

    h.session.shutdown().await;

    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.start(cursor_engine(Rgb::WHITE)).await.is_err());
}

//! Push-event stream reader.
//!
//! Holds one long-lived `GET /eventstream/clip/v2` open against the bridge,
//! splits the chunked body into `field: value` records and hands every
//! `data` value to [`BridgeGateway::dispatch_response`] as an
//! [`RequestKind::EventStreamPayload`]. Consumers observe the result as
//! [`BridgeEvent::EventStreamData`](crate::BridgeEvent::EventStreamData).
//!
//! A read failure ends the loop and fires [`ReaderEvent::Stopped`]. By
//! default the reader then stays idle until [`EventStreamReader::start`] is
//! called again; a [`ReconnectPolicy`] with `max_retries > 0` adds bounded
//! automatic reconnection with exponential backoff.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use huesync_api::{BridgeGateway, EventStreamReader, ReconnectPolicy};
//!
//! let reader = EventStreamReader::new(Arc::clone(&gateway), ReconnectPolicy::default());
//! let _sub = gateway.events().subscribe(|event| println!("{event:?}"));
//! reader.start();
//! // ...
//! reader.stop();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::gateway::{APPLICATION_KEY_HEADER, BridgeGateway, RequestKind};

const EVENT_STREAM_MIME: &str = "text/event-stream";
const DATA_FIELD: &str = "data";

/// Longest incomplete line kept while waiting for its line break.
pub const MAX_PENDING_LINE: usize = 64 * 1024;

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Backoff configuration for restarting a failed stream.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Automatic restarts before giving up. `0` leaves restarts to the caller.
    pub max_retries: u32,

    /// Delay before the first restart. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Bounded automatic reconnection.
    pub fn retrying(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before restart number `attempt` (0-based): the doubled,
    /// capped delay with random jitter down to half of it.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self
            .initial_delay
            .saturating_mul(1 << attempt.min(16))
            .min(self.max_delay);
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms))
    }
}

// ── States and events ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReaderState {
    Idle,
    Connecting,
    Streaming,
}

/// Why a read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// [`EventStreamReader::stop`] was called.
    Requested,
    /// The bridge answered with a non-200 status.
    Status(u16),
    /// Connecting or reading a chunk failed.
    ReadFailed(String),
    /// The bridge closed the response body.
    Ended,
    /// No bridge address configured.
    MissingAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    Stopped { reason: StopReason },
}

// ── Record parsing ───────────────────────────────────────────────────

/// Split one record into `(field, value)` at the first colon.
pub fn parse_record(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
}

/// Incremental line splitter for the event-stream body.
///
/// Chunks may end anywhere, including mid-line; the trailing fragment is
/// kept until its line break arrives. A fragment longer than
/// [`MAX_PENDING_LINE`] is discarded together with the rest of its line.
#[derive(Debug, Default)]
pub struct RecordParser {
    buffer: BytesMut,
    discarding: bool,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the trimmed `data` values of every line it
    /// completes, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(end + 1);
            if self.discarding {
                self.discarding = false;
                continue;
            }
            let line = &line[..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let line = String::from_utf8_lossy(line);

            match parse_record(&line) {
                Some((DATA_FIELD, value)) => payloads.push(value.trim().to_owned()),
                Some((field, _)) => trace!(field, "ignoring event-stream field"),
                None => {}
            }
        }

        if self.buffer.len() > MAX_PENDING_LINE {
            warn!(len = self.buffer.len(), "event-stream line too long, dropping it");
            self.buffer.clear();
            self.discarding = true;
        }
        payloads
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

// ── EventStreamReader ────────────────────────────────────────────────

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ReaderInner {
    gateway: Arc<BridgeGateway>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ReaderState>,
    events: EventBus<ReaderEvent>,
    generation: AtomicU64,
    run: Mutex<Option<RunHandle>>,
}

/// Reader for the bridge's push-event stream.
///
/// Cheaply cloneable; all clones drive the same underlying connection.
#[derive(Clone)]
pub struct EventStreamReader {
    inner: Arc<ReaderInner>,
}

impl EventStreamReader {
    pub fn new(gateway: Arc<BridgeGateway>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ReaderState::Idle);
        Self {
            inner: Arc::new(ReaderInner {
                gateway,
                policy,
                state_tx,
                events: EventBus::new(),
                generation: AtomicU64::new(0),
                run: Mutex::new(None),
            }),
        }
    }

    /// Open the stream. No-op while a read loop is already live.
    pub fn start(&self) {
        let mut run = self.lock_run();
        if let Some(ref current) = *run {
            if !current.cancel.is_cancelled() && !current.task.is_finished() {
                debug!("event stream already running");
                return;
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reader_loop(
            Arc::clone(&self.inner),
            cancel.clone(),
            generation,
        ));
        *run = Some(RunHandle { cancel, task });
    }

    /// Cancel the in-flight read and drop the connection.
    pub fn stop(&self) {
        if let Some(run) = self.lock_run().take() {
            debug!("stopping event stream");
            run.cancel.cancel();
        }
    }

    pub fn state(&self) -> ReaderState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ReaderState> {
        self.inner.state_tx.subscribe()
    }

    pub fn events(&self) -> &EventBus<ReaderEvent> {
        &self.inner.events
    }

    pub fn is_running(&self) -> bool {
        self.lock_run()
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.task.is_finished())
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<RunHandle>> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReaderInner {
    /// State updates from a superseded run are ignored.
    fn set_state(&self, generation: u64, state: ReaderState) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state_tx.send_replace(state);
        }
    }
}

// ── Background read loop ─────────────────────────────────────────────

/// connect → read → on failure, optionally back off and reconnect.
async fn reader_loop(inner: Arc<ReaderInner>, cancel: CancellationToken, generation: u64) {
    let mut attempt: u32 = 0;

    let reason = loop {
        let (reason, streamed) = tokio::select! {
            biased;
            () = cancel.cancelled() => (StopReason::Requested, false),
            outcome = connect_and_read(&inner, generation) => outcome,
        };

        if matches!(reason, StopReason::Requested | StopReason::MissingAddress) {
            break reason;
        }
        if streamed {
            attempt = 0;
        }
        if attempt >= inner.policy.max_retries {
            break reason;
        }

        let delay = inner.policy.delay_for(attempt);
        warn!(?reason, attempt, ?delay, "event stream dropped, reconnecting");
        inner.set_state(generation, ReaderState::Connecting);

        tokio::select! {
            biased;
            () = cancel.cancelled() => break StopReason::Requested,
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    };

    info!(?reason, "event stream stopped");
    inner.set_state(generation, ReaderState::Idle);
    inner.events.emit(&ReaderEvent::Stopped { reason });
}

/// One connection lifetime. Returns why it ended and whether it got as far
/// as streaming.
async fn connect_and_read(inner: &ReaderInner, generation: u64) -> (StopReason, bool) {
    let config = inner.gateway.config();
    let Some(urls) = config.urls() else {
        warn!("no bridge address configured, event stream not started");
        return (StopReason::MissingAddress, false);
    };

    inner.set_state(generation, ReaderState::Connecting);
    debug!(url = %urls.events, "opening event stream");

    let mut request = inner
        .gateway
        .stream_http()
        .get(urls.events.clone())
        .header(ACCEPT, EVENT_STREAM_MIME);
    if let Some(key) = config.application_key() {
        request = request.header(APPLICATION_KEY_HEADER, key.expose_secret());
    }

    let mut response = match request.send().await {
        Ok(response) => response,
        Err(e) => return (StopReason::ReadFailed(e.to_string()), false),
    };
    if response.status() != StatusCode::OK {
        return (StopReason::Status(response.status().as_u16()), false);
    }

    inner.set_state(generation, ReaderState::Streaming);
    info!("event stream connected");

    let mut parser = RecordParser::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                for payload in parser.feed(&chunk) {
                    inner
                        .gateway
                        .dispatch_response(RequestKind::EventStreamPayload, &payload);
                }
            }
            Ok(None) => return (StopReason::Ended, true),
            Err(e) => return (StopReason::ReadFailed(e.to_string()), true),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_leaves_restart_to_caller() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(ReconnectPolicy::retrying(5).max_retries, 5);
    }

    #[test]
    fn restart_delay_doubles_with_jitter_and_caps() {
        let policy = ReconnectPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };

        for _ in 0..100 {
            let first = policy.delay_for(0).as_millis();
            assert!((100..=200).contains(&first), "attempt 0 took {first}ms");
            let third = policy.delay_for(2).as_millis();
            assert!((400..=800).contains(&third), "attempt 2 took {third}ms");
            let late = policy.delay_for(40).as_millis();
            assert!((500..=1000).contains(&late), "attempt 40 took {late}ms");
        }
    }

    #[test]
    fn records_split_on_first_colon() {
        assert_eq!(
            parse_record(r#"data: {"url":"https://x"}"#),
            Some(("data", r#" {"url":"https://x"}"#))
        );
        assert_eq!(parse_record("no separator"), None);
    }

    #[test]
    fn partial_lines_wait_for_their_break() {
        let mut parser = RecordParser::new();

        let first = parser.feed(b"data: {\"a\":1}\nda");
        assert_eq!(first, vec![r#"{"a":1}"#.to_string()]);
        assert_eq!(parser.pending(), 2);

        let second = parser.feed(b"ta: {\"b\":2}\n");
        assert_eq!(second, vec![r#"{"b":2}"#.to_string()]);
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn non_data_fields_and_crlf_are_handled() {
        let mut parser = RecordParser::new();
        let payloads = parser.feed(b": hi\r\nid: 1700000000:0\r\ndata: [1]\r\n\r\n");
        assert_eq!(payloads, vec!["[1]".to_string()]);
    }

    #[test]
    fn oversized_line_is_dropped_without_losing_the_next() {
        let mut parser = RecordParser::new();
        let mut flood = b"data: ".to_vec();
        flood.resize(MAX_PENDING_LINE + 10, b'x');

        assert!(parser.feed(&flood).is_empty());
        assert_eq!(parser.pending(), 0);
        assert!(parser.feed(b"xxxx").is_empty());

        let payloads = parser.feed(b"tail of flood\ndata: [2]\n");
        assert_eq!(payloads, vec!["[2]".to_string()]);
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn utf8_split_across_chunks_survives() {
        let mut parser = RecordParser::new();
        let text = "data: \"Küche\"\n".as_bytes();
        let (head, tail) = text.split_at(9);
        assert!(parser.feed(head).is_empty());
        assert_eq!(parser.feed(tail), vec!["\"Küche\"".to_string()]);
    }
}

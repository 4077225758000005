// Bridge HTTP gateway
//
// Wraps `reqwest::Client` with CLIP v2 URL construction, rate-limit retry,
// JSON decoding and typed completion events. Failures never cross this
// boundary as `Err`: every call resolves to a `RequestOutcome`, and
// consumers react to the `BridgeEvent`s fired on the gateway's bus.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use rand::Rng;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;

use crate::bus::EventBus;
use crate::config::BridgeConfig;
use crate::error::Error;
use crate::models::{self, EntertainmentArea};
use crate::timer::TimerSet;
use crate::transport::TransportConfig;

/// Header carrying the bridge-issued application key.
pub const APPLICATION_KEY_HEADER: &str = "hue-application-key";

/// Initial attempt plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

const RETRY_DELAY_MS: Range<u64> = 100..400;
const DEVICE_TYPE_PREFIX: &str = "huesync#";
const DEVICE_NAME_LIMIT: usize = 10;

// ── Request descriptors ──────────────────────────────────────────────

/// What a response means, and therefore which event it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RequestKind {
    /// Fire-and-forget: no event, no connection-problem signal.
    NoOp,
    Changed,
    FullDataset,
    NewUser,
    EntertainmentDataset,
    StreamEnabled,
    StreamDisabled,
    EventStreamPayload,
}

impl RequestKind {
    /// Whether a failure of this request should be reported.
    pub fn expects_response(self) -> bool {
        self != Self::NoOp
    }
}

/// One outgoing call. Lives until completion or until the retry ceiling.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: Url,
    pub kind: RequestKind,
    pub payload: Option<Value>,
    /// Attempts made so far.
    pub attempt: u32,
    /// Attach the application key header.
    pub authenticated: bool,
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// HTTP 200. `None` when the body was not valid JSON.
    Completed(Option<Arc<Value>>),
    /// Still rate limited after [`MAX_ATTEMPTS`]. Deliberately silent.
    Dropped,
    /// Non-200 status or transport failure.
    Failed,
    /// The gateway was torn down while the request was in flight.
    Cancelled,
    /// No bridge address configured.
    Skipped,
}

impl RequestOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Typed completion signals fired on the gateway's bus.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Changed(Arc<Value>),
    AllData(Arc<Value>),
    NewUser {
        username: String,
        client_key: Option<SecretString>,
    },
    EntertainmentData(Arc<Vec<EntertainmentArea>>),
    StreamEnabled(Arc<Value>),
    StreamDisabled(Arc<Value>),
    EventStreamData(Arc<Value>),
    /// Connectivity was lost. Fired once per loss.
    ConnectionProblem,
}

// ── Gateway ──────────────────────────────────────────────────────────

/// HTTP gateway to one bridge's CLIP v2 surface.
pub struct BridgeGateway {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    config: ArcSwap<BridgeConfig>,
    connected: AtomicBool,
    data: ArcSwap<Value>,
    areas: ArcSwap<Vec<EntertainmentArea>>,
    events: EventBus<BridgeEvent>,
    timers: TimerSet,
}

impl BridgeGateway {
    /// Create a gateway from a `TransportConfig`.
    pub fn new(config: BridgeConfig, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let stream_http = transport.build_stream_client()?;
        Ok(Self::with_clients(config, http, stream_http))
    }

    /// Create a gateway with a pre-built `reqwest::Client`, shared by
    /// control calls and the event stream.
    pub fn with_client(config: BridgeConfig, http: reqwest::Client) -> Self {
        Self::with_clients(config, http.clone(), http)
    }

    fn with_clients(
        config: BridgeConfig,
        http: reqwest::Client,
        stream_http: reqwest::Client,
    ) -> Self {
        Self {
            http,
            stream_http,
            config: ArcSwap::from_pointee(config),
            // Optimistic: the first failure after start-up is reported.
            connected: AtomicBool::new(true),
            data: ArcSwap::from_pointee(Value::Null),
            areas: ArcSwap::from_pointee(Vec::new()),
            events: EventBus::new(),
            timers: TimerSet::new(),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<BridgeConfig> {
        self.config.load_full()
    }

    /// Rebind the gateway to another bridge address.
    pub fn reconfigure(&self, address: &str) -> Result<(), Error> {
        let mut next = (*self.config.load_full()).clone();
        next.reconfigure(address)?;
        self.config.store(Arc::new(next));
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The gateway's event bus.
    pub fn events(&self) -> &EventBus<BridgeEvent> {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Last successfully decoded payload, `Null` after a decode failure.
    pub fn data(&self) -> Arc<Value> {
        self.data.load_full()
    }

    /// Areas from the most recent entertainment listing.
    pub fn areas(&self) -> Arc<Vec<EntertainmentArea>> {
        self.areas.load_full()
    }

    pub fn area(&self, id: &str) -> Option<EntertainmentArea> {
        self.areas.load().iter().find(|a| a.id == id).cloned()
    }

    /// Cancel every pending retry and abort in-flight requests.
    pub fn cancel_all_timers(&self) {
        self.timers.cancel_all();
    }

    /// Tear the gateway down. In-flight requests resolve to `Cancelled`.
    pub fn shutdown(&self) {
        debug!("bridge gateway shutting down");
        self.cancel_all_timers();
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream_http
    }

    // ── Operations ───────────────────────────────────────────────────

    /// `GET /resource` -- the full dataset.
    pub async fn fetch_all_resources(&self) -> RequestOutcome {
        self.request(Method::GET, "resource", RequestKind::FullDataset, None)
            .await
    }

    /// `GET /resource/entertainment_configuration`.
    pub async fn fetch_entertainment_configurations(&self) -> RequestOutcome {
        self.request(
            Method::GET,
            "resource/entertainment_configuration",
            RequestKind::EntertainmentDataset,
            None,
        )
        .await
    }

    /// Register this application with the bridge (link button must be pressed).
    ///
    /// On success the minted credentials replace the configured ones and a
    /// [`BridgeEvent::NewUser`] fires.
    pub async fn create_new_user(&self) -> RequestOutcome {
        let config = self.config.load_full();
        let Some(urls) = config.urls() else {
            warn!("cannot register with bridge: no address configured");
            return RequestOutcome::Skipped;
        };

        let payload = json!({
            "devicetype": device_type(),
            "generateclientkey": true,
        });

        self.execute(RequestDescriptor {
            method: Method::POST,
            url: urls.plain.clone(),
            kind: RequestKind::NewUser,
            payload: Some(payload),
            attempt: 0,
            authenticated: false,
        })
        .await
    }

    pub async fn set_light(
        &self,
        id: &str,
        state: Value,
        suppress_response: bool,
    ) -> RequestOutcome {
        self.put_resource("light", id, state, suppress_response).await
    }

    pub async fn set_group(
        &self,
        id: &str,
        state: Value,
        suppress_response: bool,
    ) -> RequestOutcome {
        self.put_resource("grouped_light", id, state, suppress_response)
            .await
    }

    pub async fn set_scene(
        &self,
        id: &str,
        state: Value,
        suppress_response: bool,
    ) -> RequestOutcome {
        self.put_resource("scene", id, state, suppress_response).await
    }

    /// Ask the bridge to start accepting frames for `area_id`.
    pub async fn enable_stream(&self, area_id: &str) -> RequestOutcome {
        self.request(
            Method::PUT,
            &format!("resource/entertainment_configuration/{area_id}"),
            RequestKind::StreamEnabled,
            Some(json!({ "action": "start" })),
        )
        .await
    }

    /// Ask the bridge to stop streaming for `area_id`.
    pub async fn disable_stream(&self, area_id: &str) -> RequestOutcome {
        self.request(
            Method::PUT,
            &format!("resource/entertainment_configuration/{area_id}"),
            RequestKind::StreamDisabled,
            Some(json!({ "action": "stop" })),
        )
        .await
    }

    async fn put_resource(
        &self,
        resource: &str,
        id: &str,
        state: Value,
        suppress_response: bool,
    ) -> RequestOutcome {
        let kind = if suppress_response {
            RequestKind::NoOp
        } else {
            RequestKind::Changed
        };
        self.request(Method::PUT, &format!("resource/{resource}/{id}"), kind, Some(state))
            .await
    }

    // ── Request pipeline ─────────────────────────────────────────────

    /// Issue an authenticated request against the control API.
    ///
    /// `path` is relative to `/clip/v2/`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        kind: RequestKind,
        payload: Option<Value>,
    ) -> RequestOutcome {
        let config = self.config.load_full();
        let Some(urls) = config.urls() else {
            warn!(%method, path, "no bridge address configured, skipping request");
            return RequestOutcome::Skipped;
        };

        let url = match urls.control.join(path.trim_start_matches('/')) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, path, "invalid request path");
                return RequestOutcome::Skipped;
            }
        };

        self.execute(RequestDescriptor {
            method,
            url,
            kind,
            payload,
            attempt: 0,
            authenticated: true,
        })
        .await
    }

    async fn execute(&self, mut desc: RequestDescriptor) -> RequestOutcome {
        let token = self.timers.token();

        loop {
            desc.attempt += 1;
            debug!(
                method = %desc.method,
                url = %desc.url,
                kind = %desc.kind,
                attempt = desc.attempt,
                "bridge request"
            );

            let sent = tokio::select! {
                biased;
                () = token.cancelled() => return RequestOutcome::Cancelled,
                result = self.send(&desc) => result,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, url = %desc.url, "bridge request failed");
                    return self.handle_failure(desc.kind);
                }
            };

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => {
                    if desc.attempt >= MAX_ATTEMPTS {
                        debug!(
                            url = %desc.url,
                            attempts = desc.attempt,
                            "still rate limited, dropping request"
                        );
                        return RequestOutcome::Dropped;
                    }
                    let delay = retry_delay();
                    debug!(delay = ?delay, "rate limited, scheduling retry");
                    // Token taken when the request began, so a shutdown
                    // between attempts is still seen here.
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return RequestOutcome::Cancelled,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                StatusCode::OK => {
                    let body = tokio::select! {
                        biased;
                        () = token.cancelled() => return RequestOutcome::Cancelled,
                        body = response.text() => body,
                    };
                    return match body {
                        Ok(body) => self.dispatch_response(desc.kind, &body),
                        Err(e) => {
                            warn!(error = %e, url = %desc.url, "failed to read response body");
                            self.handle_failure(desc.kind)
                        }
                    };
                }
                status => {
                    warn!(
                        status = status.as_u16(),
                        url = %desc.url,
                        "bridge returned error status"
                    );
                    return self.handle_failure(desc.kind);
                }
            }
        }
    }

    async fn send(&self, desc: &RequestDescriptor) -> Result<reqwest::Response, Error> {
        let mut builder = self.http.request(desc.method.clone(), desc.url.clone());

        if desc.authenticated {
            if let Some(key) = self.config.load().application_key() {
                builder = builder.header(APPLICATION_KEY_HEADER, key.expose_secret());
            }
        }
        if let Some(ref payload) = desc.payload {
            builder = builder.json(payload);
        }

        Ok(builder.send().await?)
    }

    /// Decode a successful response body and fire the event for `kind`.
    ///
    /// Shared by HTTP responses and event-stream `data:` records.
    pub fn dispatch_response(&self, kind: RequestKind, body: &str) -> RequestOutcome {
        let payload: Value = match serde_json::from_str(body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, %kind, "response is not JSON, clearing data");
                self.data.store(Arc::new(Value::Null));
                return RequestOutcome::Completed(None);
            }
        };

        self.connected.store(true, Ordering::SeqCst);
        for description in models::clip_errors(&payload) {
            warn!(%kind, error = %description, "bridge reported an error");
        }

        let payload = Arc::new(payload);
        self.data.store(Arc::clone(&payload));

        match kind {
            RequestKind::NoOp => trace!("fire-and-forget response"),
            RequestKind::Changed => self.events.emit(&BridgeEvent::Changed(Arc::clone(&payload))),
            RequestKind::FullDataset => {
                self.events.emit(&BridgeEvent::AllData(Arc::clone(&payload)));
            }
            RequestKind::NewUser => self.capture_new_user(&payload),
            RequestKind::EntertainmentDataset => self.store_areas(&payload),
            RequestKind::StreamEnabled => {
                self.events.emit(&BridgeEvent::StreamEnabled(Arc::clone(&payload)));
            }
            RequestKind::StreamDisabled => {
                self.events.emit(&BridgeEvent::StreamDisabled(Arc::clone(&payload)));
            }
            RequestKind::EventStreamPayload => {
                self.events.emit(&BridgeEvent::EventStreamData(Arc::clone(&payload)));
            }
        }

        RequestOutcome::Completed(Some(payload))
    }

    fn capture_new_user(&self, payload: &Value) {
        let success = payload
            .get(0)
            .and_then(|first| first.get("success"))
            .and_then(|s| s.get("username").and_then(Value::as_str).map(|u| (u, s)));

        let Some((username, success)) = success else {
            let reason = payload
                .get(0)
                .and_then(|first| first.pointer("/error/description"))
                .and_then(Value::as_str)
                .unwrap_or("unexpected response");
            warn!(reason, "bridge refused to register application");
            self.events.emit(&BridgeEvent::ConnectionProblem);
            return;
        };

        let client_key = success
            .get("clientkey")
            .and_then(Value::as_str)
            .map(|k| SecretString::from(k.to_owned()));

        self.config.rcu(|current| {
            let mut next = (**current).clone();
            next.set_credentials(SecretString::from(username.to_owned()), client_key.clone());
            next
        });

        debug!(username, "registered new application key");
        self.events.emit(&BridgeEvent::NewUser {
            username: username.to_owned(),
            client_key,
        });
    }

    fn store_areas(&self, payload: &Value) {
        let areas = match models::parse_areas(payload) {
            Ok(areas) => areas,
            Err(e) => {
                warn!(error = %e, "could not decode entertainment configurations");
                Vec::new()
            }
        };
        let areas = Arc::new(areas);
        self.areas.store(Arc::clone(&areas));
        self.events.emit(&BridgeEvent::EntertainmentData(areas));
    }

    fn handle_failure(&self, kind: RequestKind) -> RequestOutcome {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected && kind.expects_response() {
            self.events.emit(&BridgeEvent::ConnectionProblem);
        }
        RequestOutcome::Failed
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn retry_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(RETRY_DELAY_MS))
}

/// `huesync#<host>` with the host name cut to ten characters.
pub fn device_type() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    device_type_for(&host)
}

fn device_type_for(host: &str) -> String {
    let device: String = host.chars().take(DEVICE_NAME_LIMIT).collect();
    format!("{DEVICE_TYPE_PREFIX}{device}")
}

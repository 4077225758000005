// ── Stream session ──
//
// Binds one sync engine to a live entertainment stream. Bridge-side
// streaming is enabled before the encrypted transport opens and disabled
// after it closes. Transport and bridge events are funnelled into one
// driver task so every reaction runs in arrival order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use huesync_api::models::{clip_errors, inactive_areas};
use huesync_api::{
    BridgeEvent, BridgeGateway, EntertainmentArea, EventStreamReader, RequestOutcome,
    Subscription, SubscriptionSet,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::params::SyncParameters;
use crate::sync::{SyncEngine, SyncMode};
use crate::transport::{DtlsTarget, EncryptedTransport, FrameSink, TransportEvent};

// ── SessionState ─────────────────────────────────────────────────────

/// Session lifecycle, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    /// Waiting for the bridge to accept the stream.
    Enabling,
    /// Waiting for the encrypted transport handshake.
    Connecting,
    Streaming,
    /// Waiting for the bridge to confirm the stream stopped.
    Stopping,
}

#[derive(Debug)]
enum Signal {
    Transport(TransportEvent),
    Bridge(BridgeEvent),
    /// Stop finished without a confirmation event from the bridge.
    StreamReset,
}

// ── StreamSession ────────────────────────────────────────────────────

/// Owner of the encrypted transport and the active engine.
///
/// Cheaply cloneable via `Arc<SessionInner>`.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    gateway: Arc<BridgeGateway>,
    transport: Arc<dyn EncryptedTransport>,
    reader: Option<EventStreamReader>,
    state: watch::Sender<SessionState>,
    active: Mutex<Option<Arc<dyn SyncEngine>>>,
    /// Engine queued by `switch_mode`, started once the bridge confirms
    /// the previous stream stopped.
    pending: Mutex<Option<Arc<dyn SyncEngine>>>,
    transport_subs: Mutex<SubscriptionSet>,
    bridge_sub: Mutex<Option<Subscription>>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl StreamSession {
    /// Create a session. Pass an event-stream reader to have the session
    /// stop when the bridge reports the area inactive.
    pub fn new(
        gateway: Arc<BridgeGateway>,
        transport: Arc<dyn EncryptedTransport>,
        reader: Option<EventStreamReader>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let forward = signal_tx.clone();
        let bridge_sub = gateway.events().subscribe(move |event| {
            if matches!(
                event,
                BridgeEvent::StreamDisabled(_)
                    | BridgeEvent::ConnectionProblem
                    | BridgeEvent::EventStreamData(_)
            ) {
                // Closed channel means the session is gone
                let _ = forward.send(Signal::Bridge(event.clone()));
            }
        });

        Self {
            inner: Arc::new(SessionInner {
                gateway,
                transport,
                reader,
                state,
                active: Mutex::new(None),
                pending: Mutex::new(None),
                transport_subs: Mutex::new(SubscriptionSet::new()),
                bridge_sub: Mutex::new(Some(bridge_sub)),
                signal_tx,
                signal_rx: Mutex::new(Some(signal_rx)),
                driver: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Start streaming `engine` on its area.
    ///
    /// Fails with [`CoreError::AlreadyStreaming`] while another stream is
    /// active. The engine begins producing frames once the transport
    /// reports the handshake complete.
    pub async fn start(&self, engine: Arc<dyn SyncEngine>) -> Result<(), CoreError> {
        self.inner.start(engine).await
    }

    /// Stop the active stream, if any.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    /// Replace the running engine with `engine`.
    ///
    /// While streaming, the new engine is queued and started once the
    /// bridge confirms the old stream stopped.
    pub async fn switch_mode(&self, engine: Arc<dyn SyncEngine>) -> Result<(), CoreError> {
        let streaming = lock(&self.inner.active).is_some();
        if streaming {
            info!(mode = %engine.mode(), "queueing mode switch");
            *lock(&self.inner.pending) = Some(engine);
            self.inner.stop().await;
            Ok(())
        } else {
            self.inner.start(engine).await
        }
    }

    /// Forward new brightness/intensity to the active engine.
    pub fn set_parameters(&self, params: SyncParameters) {
        if let Some(engine) = lock(&self.inner.active).as_ref() {
            engine.set_parameters(params);
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn active_area(&self) -> Option<String> {
        lock(&self.inner.active)
            .as_ref()
            .map(|engine| engine.area_id().to_owned())
    }

    pub fn active_mode(&self) -> Option<SyncMode> {
        lock(&self.inner.active).as_ref().map(|engine| engine.mode())
    }

    /// Stop streaming and detach from the gateway. The session cannot be
    /// restarted afterwards.
    pub async fn shutdown(&self) {
        lock(&self.inner.pending).take();
        self.inner.stop().await;
        self.inner.cancel.cancel();
        lock(&self.inner.bridge_sub).take();
        if let Some(handle) = lock(&self.inner.driver).take() {
            handle.abort();
        }
        if let Some(ref reader) = self.inner.reader {
            reader.stop();
        }
        self.inner.state.send_replace(SessionState::Idle);
        debug!("stream session shut down");
    }
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        debug!(%state, "session state");
        self.state.send_replace(state);
    }

    fn is_active(&self, engine: &Arc<dyn SyncEngine>) -> bool {
        lock(&self.active)
            .as_ref()
            .is_some_and(|current| same_engine(current, engine))
    }

    fn ensure_driver(self: &Arc<Self>) {
        let Some(rx) = lock(&self.signal_rx).take() else {
            return;
        };
        let handle = tokio::spawn(drive(Arc::downgrade(self), rx, self.cancel.clone()));
        *lock(&self.driver) = Some(handle);
    }

    async fn start(self: &Arc<Self>, engine: Arc<dyn SyncEngine>) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Internal("session has been shut down".into()));
        }
        let target = DtlsTarget::from_config(&self.gateway.config())?;
        let area_id = engine.area_id().to_owned();
        if engine.core().channels().is_empty() {
            return Err(CoreError::EmptyArea { area_id });
        }

        {
            let mut active = lock(&self.active);
            if let Some(current) = active.as_ref() {
                return Err(CoreError::AlreadyStreaming {
                    area_id: current.area_id().to_owned(),
                });
            }
            *active = Some(Arc::clone(&engine));
        }
        self.ensure_driver();

        info!(area = %area_id, mode = %engine.mode(), "starting stream");
        self.set_state(SessionState::Enabling);

        let outcome = self.gateway.enable_stream(&area_id).await;
        if let Err(e) = enable_result(outcome, self.gateway.config().address()) {
            warn!(area = %area_id, error = %e, "bridge did not enable streaming");
            lock(&self.active).take();
            self.set_state(SessionState::Idle);
            return Err(e);
        }
        if !self.is_active(&engine) {
            debug!(area = %area_id, "stream stopped while enabling");
            return Ok(());
        }

        self.set_state(SessionState::Connecting);
        let forward = self.signal_tx.clone();
        let sub = self.transport.events().subscribe(move |event| {
            let _ = forward.send(Signal::Transport(*event));
        });
        lock(&self.transport_subs).push(sub);

        if let Some(ref reader) = self.reader {
            reader.start();
        }
        debug!(host = %target.host, port = target.port, "opening encrypted transport");
        self.transport.connect_bridge(&target);
        Ok(())
    }

    async fn stop(self: &Arc<Self>) {
        let Some(engine) = lock(&self.active).take() else {
            debug!("no active stream to stop");
            return;
        };
        let area_id = engine.area_id().to_owned();
        info!(area = %area_id, "stopping stream");
        self.set_state(SessionState::Stopping);

        engine.stop();
        self.transport.close_bridge();
        lock(&self.transport_subs).release_all();
        if let Some(ref reader) = self.reader {
            reader.stop();
        }

        let outcome = self.gateway.disable_stream(&area_id).await;
        if !matches!(outcome, RequestOutcome::Completed(Some(_))) {
            debug!(?outcome, "no stream-disabled confirmation, resetting locally");
            let _ = self.signal_tx.send(Signal::StreamReset);
        }
    }

    async fn handle(self: &Arc<Self>, signal: Signal) {
        match signal {
            Signal::Transport(TransportEvent::Connected) => {
                let engine = lock(&self.active).clone();
                if let Some(engine) = engine {
                    info!(
                        area = %engine.area_id(),
                        mode = %engine.mode(),
                        "transport connected, streaming"
                    );
                    self.set_state(SessionState::Streaming);
                    engine.start(FrameSink::new(Arc::clone(&self.transport)));
                }
            }
            Signal::Transport(TransportEvent::Disconnected) => {
                let engine = lock(&self.active).clone();
                if let Some(engine) = engine {
                    warn!(area = %engine.area_id(), "transport disconnected");
                    engine.stop();
                    self.set_state(SessionState::Connecting);
                }
            }
            Signal::Bridge(BridgeEvent::StreamDisabled(_)) | Signal::StreamReset => {
                self.on_stream_disabled().await;
            }
            Signal::Bridge(BridgeEvent::ConnectionProblem) => {
                // A failed enable is unwound by `start` itself. State is read
                // before `active` since `start` clears `active` first.
                let state = *self.state.borrow();
                if matches!(state, SessionState::Idle | SessionState::Enabling) {
                    debug!(%state, "connection problem while not streaming, ignoring");
                    return;
                }
                let streaming = lock(&self.active).is_some();
                if streaming {
                    warn!("bridge connection problem, tearing down stream");
                    self.stop().await;
                }
            }
            Signal::Bridge(BridgeEvent::EventStreamData(payload)) => {
                let active = lock(&self.active).as_ref().map(|e| e.area_id().to_owned());
                let Some(area_id) = active else { return };
                let watching = matches!(
                    *self.state.borrow(),
                    SessionState::Connecting | SessionState::Streaming
                );
                if watching && inactive_areas(&payload).contains(&area_id) {
                    info!(area = %area_id, "bridge reports area inactive, stopping");
                    self.stop().await;
                }
            }
            Signal::Bridge(_) => {}
        }
    }

    async fn on_stream_disabled(self: &Arc<Self>) {
        let restarted = lock(&self.active).is_some();
        if restarted {
            return;
        }
        self.set_state(SessionState::Idle);

        let next = lock(&self.pending).take();
        if let Some(engine) = next {
            info!(mode = %engine.mode(), "starting queued mode");
            if let Err(e) = self.start(engine).await {
                warn!(error = %e, "queued mode failed to start");
            }
        }
    }
}

/// Process session signals in arrival order until the session goes away.
async fn drive(
    session: Weak<SessionInner>,
    mut rx: mpsc::UnboundedReceiver<Signal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = rx.recv() => signal,
        };
        let Some(signal) = signal else { break };
        let Some(inner) = session.upgrade() else { break };
        inner.handle(signal).await;
    }
    debug!("session driver exiting");
}

fn enable_result(outcome: RequestOutcome, address: &str) -> Result<(), CoreError> {
    match outcome {
        RequestOutcome::Completed(Some(payload)) => {
            let errors = clip_errors(&payload);
            if errors.is_empty() {
                Ok(())
            } else {
                Err(CoreError::Rejected {
                    message: errors.join("; "),
                })
            }
        }
        RequestOutcome::Completed(None) => Ok(()),
        RequestOutcome::Dropped => Err(CoreError::Rejected {
            message: "rate limited by the bridge".into(),
        }),
        RequestOutcome::Failed => Err(CoreError::ConnectionFailed {
            address: address.to_owned(),
            reason: "bridge did not accept the stream request".into(),
        }),
        RequestOutcome::Cancelled => Err(CoreError::Internal("gateway shut down".into())),
        RequestOutcome::Skipped => Err(CoreError::Config {
            message: "no bridge address configured".into(),
        }),
    }
}

fn same_engine(a: &Arc<dyn SyncEngine>, b: &Arc<dyn SyncEngine>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Area lookup ──────────────────────────────────────────────────────

/// Find an area by id, or by name ignoring case.
pub fn resolve_area(
    areas: &[EntertainmentArea],
    key: &str,
) -> Result<EntertainmentArea, CoreError> {
    areas
        .iter()
        .find(|area| area.id == key)
        .or_else(|| areas.iter().find(|area| area.name.eq_ignore_ascii_case(key)))
        .cloned()
        .ok_or_else(|| CoreError::AreaNotFound {
            identifier: key.to_owned(),
        })
}

// ── Sync engines ──
//
// Each engine samples one signal source, maps it to per-channel colors and
// pushes frames to a `FrameSink`. `EngineCore` holds everything the three
// variants share: parameters, channel list, liveness flag and timers.

pub mod cursor;
pub mod music;
pub mod screen;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use huesync_api::{Channel, EntertainmentArea, TimerSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::codec::{ColorSpace, build_frame};
use crate::color::Rgb;
use crate::params::SyncParameters;
use crate::transport::FrameSink;

pub use cursor::CursorSync;
pub use music::MusicSync;
pub use screen::ScreenSync;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncMode {
    Screen,
    Music,
    Cursor,
}

/// A frame producer bound to one entertainment area.
pub trait SyncEngine: Send + Sync {
    fn mode(&self) -> SyncMode;

    fn core(&self) -> &Arc<EngineCore>;

    /// Begin producing frames into `sink`. No-op while already streaming.
    fn start(&self, sink: FrameSink);

    /// Stop producing frames and release sampling resources. No frame is
    /// sent once this returns.
    fn stop(&self) {
        self.core().halt();
    }

    fn area_id(&self) -> &str {
        self.core().area_id()
    }

    fn parameters(&self) -> SyncParameters {
        self.core().parameters()
    }

    fn set_parameters(&self, params: SyncParameters) {
        self.core().set_parameters(params);
    }

    fn is_streaming(&self) -> bool {
        self.core().is_streaming()
    }

    /// Cancel the frame loop and any pending tick without touching the
    /// streaming flag.
    fn cancel_all_timers(&self) {
        self.core().timers().cancel_all();
    }
}

// ── EngineCore ───────────────────────────────────────────────────────

/// State shared by an engine and its frame loop.
pub struct EngineCore {
    area_id: String,
    channels: Vec<Channel>,
    params: ArcSwap<SyncParameters>,
    streaming: AtomicBool,
    sequence: AtomicU8,
    sink: Mutex<Option<FrameSink>>,
    timers: TimerSet,
}

impl EngineCore {
    pub fn new(area: &EntertainmentArea, params: SyncParameters) -> Self {
        Self {
            area_id: area.id.clone(),
            channels: area.channels.clone(),
            params: ArcSwap::from_pointee(params),
            streaming: AtomicBool::new(false),
            sequence: AtomicU8::new(0),
            sink: Mutex::new(None),
            timers: TimerSet::new(),
        }
    }

    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn parameters(&self) -> SyncParameters {
        **self.params.load()
    }

    pub fn set_parameters(&self, params: SyncParameters) {
        debug!(
            area = %self.area_id,
            brightness = params.brightness,
            intensity = params.intensity,
            "updating sync parameters"
        );
        self.params.store(Arc::new(params));
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Install `sink` and mark the engine live. `false` if it already was.
    pub fn begin(&self, sink: FrameSink) -> bool {
        let mut slot = self.lock_sink();
        if self.streaming.swap(true, Ordering::SeqCst) {
            return false;
        }
        *slot = Some(sink);
        debug!(area = %self.area_id, channels = self.channels.len(), "engine started");
        true
    }

    /// Mark the engine stopped, drop the sink and cancel every timer.
    pub fn halt(&self) {
        let was_streaming = {
            let mut slot = self.lock_sink();
            let was = self.streaming.swap(false, Ordering::SeqCst);
            slot.take();
            was
        };
        self.timers.cancel_all();
        if was_streaming {
            debug!(area = %self.area_id, "engine stopped");
        }
    }

    /// Sleep for the current frame interval. `false` once stopped.
    pub async fn wait_next_tick(&self) -> bool {
        let interval = self.parameters().interval();
        self.timers.sleep(interval).await && self.is_streaming()
    }

    /// Sleep for an explicit delay. `false` once stopped.
    pub async fn wait(&self, delay: Duration) -> bool {
        self.timers.sleep(delay).await && self.is_streaming()
    }

    /// Build and send a frame with one color per channel, in channel order.
    ///
    /// Returns `false` without sending when the engine has been stopped,
    /// including a stop that raced with this tick.
    pub fn push(&self, colors: &[Rgb]) -> bool {
        let blocks: Vec<(u8, Rgb)> = self
            .channels
            .iter()
            .zip(colors.iter().copied())
            .map(|(channel, color)| (channel.channel_id, color))
            .collect();

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = build_frame(ColorSpace::Rgb, sequence, &self.area_id, &blocks);

        let slot = self.lock_sink();
        if !self.is_streaming() {
            return false;
        }
        let Some(sink) = slot.as_ref() else {
            return false;
        };
        trace!(area = %self.area_id, len = frame.len(), "sending frame");
        sink.send(&frame)
    }

    /// Send the same color to every channel.
    pub fn push_uniform(&self, color: Rgb) -> bool {
        let colors = vec![color; self.channels.len()];
        self.push(&colors)
    }

    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Option<FrameSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Test doubles ─────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::io;
    use std::sync::{Arc, Mutex};

    use huesync_api::{AreaStatus, Channel, EntertainmentArea, EventBus, Position};

    use crate::transport::{DtlsTarget, EncryptedTransport, FrameSink, TransportEvent};

    /// Records every frame it is asked to send.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub frames: Mutex<Vec<Vec<u8>>>,
        events: EventBus<TransportEvent>,
    }

    impl RecordingTransport {
        pub fn sent(&self) -> usize {
            self.frames.lock().unwrap().len()
        }

        pub fn last(&self) -> Option<Vec<u8>> {
            self.frames.lock().unwrap().last().cloned()
        }
    }

    impl EncryptedTransport for RecordingTransport {
        fn connect_bridge(&self, _target: &DtlsTarget) {
            self.events.emit(&TransportEvent::Connected);
        }

        fn close_bridge(&self) {
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

    pub fn sink() -> (Arc<RecordingTransport>, FrameSink) {
        let transport = Arc::new(RecordingTransport::default());
        let sink = FrameSink::new(Arc::clone(&transport) as Arc<dyn EncryptedTransport>);
        (transport, sink)
    }

    pub fn area(positions: &[(f64, f64, f64)]) -> EntertainmentArea {
        EntertainmentArea {
            id: "1a8d99cc-967b-44f2-9202-43f976c0fa6b".into(),
            name: "Test".into(),
            status: AreaStatus::Inactive,
            channels: positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z))| Channel {
                    channel_id: u8::try_from(i).unwrap(),
                    position: Position { x, y, z },
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testing::{area, sink};
    use super::*;
    use crate::codec::{HEADER_LEN, build_channel_block};

    #[test]
    fn mode_names_round_trip() {
        assert_eq!(SyncMode::Music.to_string(), "music");
        assert_eq!("cursor".parse::<SyncMode>().unwrap(), SyncMode::Cursor);
    }

    #[tokio::test]
    async fn push_respects_liveness() {
        let core = EngineCore::new(&area(&[(0.0, 0.0, 0.0)]), SyncParameters::default());
        let (transport, sink) = sink();

        assert!(!core.push_uniform(Rgb::WHITE), "not started yet");
        assert!(core.begin(sink.clone()));
        assert!(!core.begin(sink), "second begin is a no-op");
        assert!(core.push_uniform(Rgb::WHITE));

        core.halt();
        assert!(!core.push_uniform(Rgb::WHITE));
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test]
    async fn frame_blocks_follow_channel_order() {
        let area = area(&[(1.0, 0.0, 0.0), (-1.0, 0.0, 0.0)]);
        let core = EngineCore::new(&area, SyncParameters::default());
        let (transport, sink) = sink();
        core.begin(sink);

        core.push(&[Rgb::new(10, 20, 30), Rgb::new(40, 50, 60)]);

        let frame = transport.last().unwrap();
        let blocks = &frame[HEADER_LEN + area.id.len()..];
        let mut expected = build_channel_block(0, 10, 20, 30).to_vec();
        expected.extend_from_slice(&build_channel_block(1, 40, 50, 60));
        assert_eq!(blocks, &expected[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_timers_ends_the_frame_loop() {
        let area = area(&[(0.0, 0.0, 0.0)]);
        let engine = CursorSync::new(&area, SyncParameters::default(), Dark);
        let (_transport, sink) = sink();

        engine.start(sink);
        assert_eq!(engine.core().timers().pending(), 1);

        engine.cancel_all_timers();
        tokio::task::yield_now().await;
        assert_eq!(engine.core().timers().pending(), 0);
        assert!(engine.is_streaming(), "flag is left to stop()");
        engine.stop();
    }

    struct Dark;

    impl crate::sampling::PointerSampler for Dark {
        async fn pixel_under_pointer(&self) -> Option<Rgb> {
            None
        }
    }

    #[tokio::test]
    async fn parameters_are_swappable() {
        let core = EngineCore::new(&area(&[]), SyncParameters::default());
        core.set_parameters(SyncParameters::new(0.3, 1.0));
        assert_eq!(core.parameters().interval_ms(), 100);
    }
}

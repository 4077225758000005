// ── Screen sync ──
//
// Mirrors display content: every tick captures the screen, and each
// channel takes the mean color of the region nearest its position.

use std::sync::Arc;

use huesync_api::{EntertainmentArea, Position};
use tracing::trace;

use super::{EngineCore, SyncEngine, SyncMode};
use crate::color::Rgb;
use crate::params::SyncParameters;
use crate::sampling::{DisplaySnapshot, Rect, ScreenCapture};
use crate::transport::FrameSink;

/// Border detection runs on every ninth capture.
pub const BORDER_CHECK_EVERY: u64 = 9;

/// Share of the content area a sampling region spans on its long side.
const WIDE_FRACTION: f64 = 0.3;
/// Share on its short side.
const NARROW_FRACTION: f64 = 0.15;

pub struct ScreenSync<C: ScreenCapture> {
    core: Arc<EngineCore>,
    capture: Arc<C>,
}

impl<C: ScreenCapture> ScreenSync<C> {
    pub fn new(area: &EntertainmentArea, params: SyncParameters, capture: C) -> Self {
        Self {
            core: Arc::new(EngineCore::new(area, params)),
            capture: Arc::new(capture),
        }
    }
}

impl<C: ScreenCapture> SyncEngine for ScreenSync<C> {
    fn mode(&self) -> SyncMode {
        SyncMode::Screen
    }

    fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    fn start(&self, sink: FrameSink) {
        if self.core.begin(sink) {
            let task = run(Arc::clone(&self.core), Arc::clone(&self.capture));
            self.core.timers().spawn(task);
        }
    }
}

async fn run<C: ScreenCapture>(core: Arc<EngineCore>, capture: Arc<C>) {
    let monitor = capture.monitor();
    let mut active = monitor;
    let mut tick: u64 = 0;

    while core.is_streaming() {
        if let Some(snapshot) = capture.capture().await {
            if tick % BORDER_CHECK_EVERY == 0 {
                active = snapshot.content_bounds(monitor);
                trace!(?active, "content bounds updated");
            }

            let brightness = core.parameters().brightness;
            let colors: Vec<Rgb> = core
                .channels()
                .iter()
                .map(|channel| {
                    snapshot
                        .average_color(sampling_rect(active, channel.position))
                        .finish(brightness)
                })
                .collect();
            core.push(&colors);
        }

        tick = tick.wrapping_add(1);
        if !core.wait_next_tick().await {
            break;
        }
    }
}

/// Region of `active` sampled for a channel at `position`.
///
/// `x` maps left to right and `z` bottom to top; both are clamped to
/// `[-1, 1]`. Channels off to the side (`|x| > |z|`) get a region wider
/// than tall, the rest one taller than wide. The region always lies inside
/// `active`.
pub fn sampling_rect(active: Rect, position: Position) -> Rect {
    if active.is_empty() {
        return active;
    }

    let x = position.x.clamp(-1.0, 1.0);
    let z = position.z.clamp(-1.0, 1.0);
    let width = f64::from(active.width);
    let height = f64::from(active.height);

    let (fw, fh) = if x.abs() > z.abs() {
        (WIDE_FRACTION, NARROW_FRACTION)
    } else {
        (NARROW_FRACTION, WIDE_FRACTION)
    };
    let rw = (width * fw).round().clamp(1.0, width);
    let rh = (height * fh).round().clamp(1.0, height);

    let cx = (x + 1.0) / 2.0 * width;
    let cy = (1.0 - (z + 1.0) / 2.0) * height;
    let left = (cx - rw / 2.0).round().clamp(0.0, width - rw);
    let top = (cy - rh / 2.0).round().clamp(0.0, height - rh);

    Rect::new(
        active.x + to_pixels(left),
        active.y + to_pixels(top),
        to_pixels(rw),
        to_pixels(rh),
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn to_pixels(v: f64) -> u32 {
    v.max(0.0) as u32
}

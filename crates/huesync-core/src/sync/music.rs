// ── Music sync ──
//
// Colors follow an audio spectrum, one band per channel. Cadence comes
// from the spectrum source; the engine only reacts to band updates.

use std::collections::VecDeque;
use std::sync::Arc;

use huesync_api::EntertainmentArea;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{EngineCore, SyncEngine, SyncMode};
use crate::color::{Rgb, frequency_to_color, to_component};
use crate::params::SyncParameters;
use crate::sampling::SpectrumSource;
use crate::transport::FrameSink;

/// Updates between re-rolls of the damped component.
pub const DAMPING_EVERY: u64 = 10;

/// Updates kept in the rolling energy average.
const ENERGY_WINDOW: usize = 32;
/// Energy treated as full scale.
const ENERGY_SPAN: f64 = 80.0;
/// Coefficient of a damped component at silence and at full energy.
const DAMPED_QUIET: f64 = 0.4;
const DAMPED_LOUD: f64 = 0.9;
/// Share of the remaining distance a coefficient moves per update.
const DRIFT: f64 = 0.1;

pub struct MusicSync<S: SpectrumSource> {
    core: Arc<EngineCore>,
    source: Arc<S>,
}

impl<S: SpectrumSource> MusicSync<S> {
    pub fn new(area: &EntertainmentArea, params: SyncParameters, source: S) -> Self {
        Self {
            core: Arc::new(EngineCore::new(area, params)),
            source: Arc::new(source),
        }
    }
}

impl<S: SpectrumSource> SyncEngine for MusicSync<S> {
    fn mode(&self) -> SyncMode {
        SyncMode::Music
    }

    fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    fn start(&self, sink: FrameSink) {
        if self.core.begin(sink) {
            let task = run(Arc::clone(&self.core), Arc::clone(&self.source));
            self.core.timers().spawn(task);
        }
    }
}

async fn run<S: SpectrumSource>(core: Arc<EngineCore>, source: Arc<S>) {
    let channels = core.channels().len();
    let mut bands_rx = source.subscribe(channels, core.parameters().interval());
    let mut palette = Palette::new(channels, StdRng::from_entropy());

    while let Some(bands) = bands_rx.recv().await {
        if !core.is_streaming() {
            break;
        }
        palette.observe(&bands);
        let colors = palette.colors(&bands, core.parameters().brightness);
        core.push(&colors);
    }
    debug!(area = %core.area_id(), "spectrum subscription ended");
}

// ── Palette ──────────────────────────────────────────────────────────

/// Per-channel RGB coefficients that drift towards randomly damped targets.
pub(crate) struct Palette<R> {
    coefficients: Vec<[f64; 3]>,
    targets: Vec<[f64; 3]>,
    energy: VecDeque<f64>,
    updates: u64,
    rng: R,
}

impl<R: Rng> Palette<R> {
    pub(crate) fn new(channels: usize, rng: R) -> Self {
        Self {
            coefficients: vec![[1.0; 3]; channels],
            targets: vec![[1.0; 3]; channels],
            energy: VecDeque::with_capacity(ENERGY_WINDOW),
            updates: 0,
            rng,
        }
    }

    /// Feed one band update: track energy, re-roll targets every
    /// [`DAMPING_EVERY`] updates, and drift every coefficient.
    pub(crate) fn observe(&mut self, bands: &[f64]) {
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let mean = if bands.is_empty() {
            0.0
        } else {
            bands.iter().sum::<f64>() / bands.len() as f64
        };
        if self.energy.len() == ENERGY_WINDOW {
            self.energy.pop_front();
        }
        self.energy.push_back(mean);

        self.updates += 1;
        if self.updates % DAMPING_EVERY == 0 {
            let damped = self.damped_coefficient();
            for target in &mut self.targets {
                *target = [1.0; 3];
                target[self.rng.gen_range(0..3)] = damped;
            }
        }

        for (coefficient, target) in self.coefficients.iter_mut().zip(&self.targets) {
            for (c, t) in coefficient.iter_mut().zip(target) {
                *c += (t - *c) * DRIFT;
            }
        }
    }

    /// Rolling energy average, normalized to `[0, 1]`.
    pub(crate) fn energy_level(&self) -> f64 {
        if self.energy.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let average = self.energy.iter().sum::<f64>() / self.energy.len() as f64;
        (average / ENERGY_SPAN).clamp(0.0, 1.0)
    }

    fn damped_coefficient(&self) -> f64 {
        DAMPED_QUIET + (DAMPED_LOUD - DAMPED_QUIET) * self.energy_level()
    }

    pub(crate) fn colors(&self, bands: &[f64], brightness: f64) -> Vec<Rgb> {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(i, [cr, cg, cb])| {
                let base = frequency_to_color(bands.get(i).copied().unwrap_or(0.0));
                Rgb::new(
                    to_component(f64::from(base.r) * cr),
                    to_component(f64::from(base.g) * cg),
                    to_component(f64::from(base.b) * cb),
                )
                .finish(brightness)
            })
            .collect()
    }

    #[cfg(test)]
    fn targets(&self) -> &[[f64; 3]] {
        &self.targets
    }

    #[cfg(test)]
    fn coefficients(&self) -> &[[f64; 3]] {
        &self.coefficients
    }
}

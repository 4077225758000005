// ── Cursor sync ──
//
// The whole area follows the color under the mouse pointer.

use std::sync::Arc;

use huesync_api::EntertainmentArea;
use tracing::trace;

use super::{EngineCore, SyncEngine, SyncMode};
use crate::params::SyncParameters;
use crate::sampling::PointerSampler;
use crate::transport::FrameSink;

pub struct CursorSync<P: PointerSampler> {
    core: Arc<EngineCore>,
    sampler: Arc<P>,
}

impl<P: PointerSampler> CursorSync<P> {
    pub fn new(area: &EntertainmentArea, params: SyncParameters, sampler: P) -> Self {
        Self {
            core: Arc::new(EngineCore::new(area, params)),
            sampler: Arc::new(sampler),
        }
    }
}

impl<P: PointerSampler> SyncEngine for CursorSync<P> {
    fn mode(&self) -> SyncMode {
        SyncMode::Cursor
    }

    fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    fn start(&self, sink: FrameSink) {
        if self.core.begin(sink) {
            let task = run(Arc::clone(&self.core), Arc::clone(&self.sampler));
            self.core.timers().spawn(task);
        }
    }
}

async fn run<P: PointerSampler>(core: Arc<EngineCore>, sampler: Arc<P>) {
    while core.is_streaming() {
        match sampler.pixel_under_pointer().await {
            Some(color) => {
                core.push_uniform(color.finish(core.parameters().brightness));
            }
            None => trace!("pointer sample unavailable, skipping tick"),
        }

        if !core.wait_next_tick().await {
            break;
        }
    }
}

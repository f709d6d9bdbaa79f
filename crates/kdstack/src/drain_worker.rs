use std::sync::Arc;
use std::time::Duration;

use crate::cache::FrameEventCache;
use crate::ringbuffer::DrainStats;
use crate::stop_signal::StopSignal;
use crate::task::Task;

/// Periodically drains a `FrameEventCache` until stopped.
#[derive(Debug)]
pub struct DrainTask {
    cache: Arc<FrameEventCache>,
    stop: StopSignal,
    interval: Duration,
    total: DrainStats,
}

impl DrainTask {
    pub fn new(cache: Arc<FrameEventCache>, stop: StopSignal, interval: Duration) -> Self {
        Self {
            cache,
            stop,
            interval,
            total: DrainStats::default(),
        }
    }

    pub fn total(&self) -> DrainStats {
        self.total
    }
}

impl Task for DrainTask {
    fn run(&mut self) {
        loop {
            log::trace!("Draining frame event cache");
            let stats = self.cache.drain();
            self.total.merge(stats);

            // Stop is only checked between drains
            if self.stop.wait_timeout(self.interval) {
                break;
            }
        }
        log::debug!(
            "Drain worker stopped: {}",
            serde_json::to_string(&self.total).unwrap_or_default()
        );
    }
}

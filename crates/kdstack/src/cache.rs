use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::frame::{FrameDescriptor, ThreadId};
use crate::resolver::FrameResolver;
use crate::ringbuffer::{DrainStats, Ringbuffer, RingbufferError};
use crate::sink::Sink;
use crate::util;

pub const DEFAULT_CAPACITY: usize = 4096;
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Two ring buffers: producers write to the active one while the drainer
/// empties the other.
///
/// The active index is a plain atomic, not a lock. A producer that loaded the
/// index just before a swap still writes into the buffer being drained; that
/// sample is either picked up late, torn and dropped, or overwritten. It can
/// never corrupt memory.
///
/// Drains are serialized by `drain_lock`. Producers never take it.
pub struct FrameEventCache {
    buffers: [Ringbuffer; 2],
    active: AtomicUsize,
    drain_lock: Mutex<()>,
    resolver: Arc<dyn FrameResolver>,
    sink: Arc<dyn Sink>,
}

impl FrameEventCache {
    pub fn new(
        capacity: usize,
        max_depth: usize,
        resolver: Arc<dyn FrameResolver>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, RingbufferError> {
        Ok(Self {
            buffers: [
                Ringbuffer::new(capacity, max_depth)?,
                Ringbuffer::new(capacity, max_depth)?,
            ],
            active: AtomicUsize::new(0),
            drain_lock: Mutex::new(()),
            resolver,
            sink,
        })
    }

    pub fn with_defaults(
        resolver: Arc<dyn FrameResolver>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, RingbufferError> {
        Self::new(DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH, resolver, sink)
    }

    // async-signal-safe
    pub fn record(&self, thread_id: ThreadId, frames: &[FrameDescriptor]) {
        let active = self.active.load(Ordering::Acquire);
        self.buffers[active].record(thread_id, frames);
    }

    /// Swaps buffers and drains the previously active one, skipping samples
    /// taken on the calling thread.
    pub fn drain(&self) -> DrainStats {
        self.drain_excluding(util::current_thread_id())
    }

    pub fn drain_excluding(&self, excluded_thread_id: ThreadId) -> DrainStats {
        // A drainer that panicked only skipped its counter reset
        let _guard = match self.drain_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Swap first so new samples land in the idle buffer during the slow drain
        let previous = self.active.fetch_xor(1, Ordering::AcqRel);
        let stats = self.buffers[previous].drain(
            self.resolver.as_ref(),
            self.sink.as_ref(),
            excluded_thread_id,
        );
        log::debug!(
            "Drained buffer {}: {} slots, {} records emitted",
            previous,
            stats.slots_examined,
            stats.records_emitted
        );
        stats
    }

    /// Drains both buffers. Used at shutdown so that samples which raced the
    /// last swap are not left behind.
    pub fn flush(&self) -> DrainStats {
        let mut stats = self.drain();
        stats.merge(self.drain());
        stats
    }

    /// Index of the buffer currently receiving samples.
    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.buffers[0].capacity()
    }

    pub fn max_depth(&self) -> usize {
        self.buffers[0].max_depth()
    }

    /// Samples waiting in the active buffer.
    pub fn pending(&self) -> usize {
        self.buffers[self.active_index()].valid_count()
    }
}

impl std::fmt::Debug for FrameEventCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEventCache")
            .field("buffers", &self.buffers)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

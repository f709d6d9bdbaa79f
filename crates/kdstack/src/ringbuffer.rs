use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::event_slot::EventSlot;
use crate::frame::{FrameDescriptor, ThreadId};
use crate::resolver::FrameResolver;
use crate::sink::Sink;

/// Fixed pool of event slots with overwrite-on-wrap allocation.
///
/// All slots are allocated up front; `record` never allocates, blocks or
/// fails. Once more than `capacity` samples land between two drains, the
/// oldest ones are silently overwritten.
#[derive(Debug)]
pub struct Ringbuffer {
    slots: Box<[EventSlot]>,
    // Wraps on overflow; see `record`.
    counter: AtomicUsize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingbufferError {
    #[error("ring buffer capacity must be at least 1")]
    ZeroCapacity,
    #[error("maximum stack depth must be at least 1")]
    ZeroDepth,
}

/// What a single drain did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    pub slots_examined: usize,
    pub self_samples_skipped: usize,
    pub torn_samples_skipped: usize,
    pub records_emitted: usize,
}

impl DrainStats {
    pub fn merge(&mut self, other: DrainStats) {
        self.slots_examined += other.slots_examined;
        self.self_samples_skipped += other.self_samples_skipped;
        self.torn_samples_skipped += other.torn_samples_skipped;
        self.records_emitted += other.records_emitted;
    }
}

impl Ringbuffer {
    pub fn new(capacity: usize, max_depth: usize) -> Result<Self, RingbufferError> {
        if capacity == 0 {
            return Err(RingbufferError::ZeroCapacity);
        }
        if max_depth == 0 {
            return Err(RingbufferError::ZeroDepth);
        }
        Ok(Self {
            slots: (0..capacity).map(|_| EventSlot::new(max_depth)).collect(),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn max_depth(&self) -> usize {
        self.slots[0].max_depth()
    }

    /// Number of slots holding data recorded since the last drain.
    pub fn valid_count(&self) -> usize {
        self.counter.load(Ordering::Acquire).min(self.capacity())
    }

    // async-signal-safe
    pub fn record(&self, thread_id: ThreadId, frames: &[FrameDescriptor]) {
        // fetch_add wraps at usize::MAX. The slot sequence jumps once at the
        // wrap point, which is indistinguishable from ordinary overwriting.
        let index = self.counter.fetch_add(1, Ordering::AcqRel) % self.capacity();
        self.slots[index].record(thread_id, frames);
    }

    /// Emits every valid slot not recorded by `excluded_thread_id`, then
    /// invalidates the buffer. Must not run concurrently with another drain
    /// of the same buffer.
    pub fn drain(
        &self,
        resolver: &dyn FrameResolver,
        sink: &dyn Sink,
        excluded_thread_id: ThreadId,
    ) -> DrainStats {
        let mut stats = DrainStats::default();
        let count = self.counter.load(Ordering::Acquire);
        if count == 0 {
            return stats;
        }

        for slot in self.slots.iter().take(count.min(self.capacity())) {
            stats.slots_examined += 1;
            let sample = match slot.snapshot() {
                Some(sample) => sample,
                None => {
                    stats.torn_samples_skipped += 1;
                    continue;
                }
            };
            // Skip the drain thread's own samples
            if sample.thread_id == excluded_thread_id {
                stats.self_samples_skipped += 1;
                continue;
            }
            for record in sample.serialize(resolver) {
                sink.emit(&record.to_string());
                stats.records_emitted += 1;
            }
        }

        self.counter.store(0, Ordering::Release);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MethodId;
    use crate::resolver::MethodTable;
    use crate::sink::MemorySink;
    use crate::wire::WireRecord;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    const NOBODY: ThreadId = -1;

    fn stack(method_ids: &[u64]) -> Vec<FrameDescriptor> {
        method_ids
            .iter()
            .map(|id| FrameDescriptor::new(0, MethodId(*id)))
            .collect()
    }

    fn resolver() -> MethodTable {
        let table = MethodTable::new();
        for id in 0..10 {
            table.register(MethodId(id), format!("f{}", id));
        }
        table
    }

    fn parse(records: Vec<String>) -> Vec<WireRecord> {
        records.iter().map(|r| r.parse().unwrap()).collect()
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert_eq!(
            Ringbuffer::new(0, 4).unwrap_err(),
            RingbufferError::ZeroCapacity
        );
        assert_eq!(
            Ringbuffer::new(4, 0).unwrap_err(),
            RingbufferError::ZeroDepth
        );
    }

    #[test]
    fn test_drain_emits_recorded_samples() {
        let ringbuffer = Ringbuffer::new(4, 8).unwrap();
        ringbuffer.record(1, &stack(&[1, 2]));
        ringbuffer.record(2, &stack(&[3]));
        assert_eq!(ringbuffer.valid_count(), 2);

        let sink = MemorySink::new();
        let stats = ringbuffer.drain(&resolver(), &sink, NOBODY);
        assert_eq!(stats.slots_examined, 2);
        assert_eq!(stats.records_emitted, 2);

        let records = parse(sink.take());
        assert_eq!(records[0].thread_id, 1);
        assert_eq!(records[0].stack, "f1!f2!");
        assert_eq!(records[1].thread_id, 2);
        assert_eq!(records[1].stack, "f3!");
    }

    #[test]
    fn test_overwrite_keeps_last_capacity_samples() {
        let ringbuffer = Ringbuffer::new(3, 4).unwrap();
        for id in 0..5 {
            ringbuffer.record(100 + id as ThreadId, &stack(&[id]));
        }
        assert_eq!(ringbuffer.valid_count(), 3);

        let sink = MemorySink::new();
        ringbuffer.drain(&resolver(), &sink, NOBODY);
        let threads: HashSet<ThreadId> = parse(sink.take()).iter().map(|r| r.thread_id).collect();
        assert_eq!(threads, HashSet::from([102, 103, 104]));
    }

    #[test]
    fn test_drain_skips_excluded_thread() {
        let ringbuffer = Ringbuffer::new(4, 4).unwrap();
        ringbuffer.record(7, &stack(&[1]));
        ringbuffer.record(8, &stack(&[2]));
        ringbuffer.record(7, &stack(&[3]));

        let sink = MemorySink::new();
        let stats = ringbuffer.drain(&resolver(), &sink, 7);
        assert_eq!(stats.self_samples_skipped, 2);
        let records = parse(sink.take());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].thread_id, 8);
    }

    #[test]
    fn test_drain_resets_counter() {
        let ringbuffer = Ringbuffer::new(4, 4).unwrap();
        ringbuffer.record(1, &stack(&[1]));

        let sink = MemorySink::new();
        ringbuffer.drain(&resolver(), &sink, NOBODY);
        assert_eq!(ringbuffer.valid_count(), 0);
        assert_eq!(sink.take().len(), 1);

        // Second drain without new records is a no-op
        let stats = ringbuffer.drain(&resolver(), &sink, NOBODY);
        assert_eq!(stats, DrainStats::default());
        assert!(sink.take().is_empty());

        ringbuffer.record(2, &stack(&[2]));
        assert_eq!(ringbuffer.valid_count(), 1);
    }

    #[test]
    fn test_counter_resets_even_if_everything_is_excluded() {
        let ringbuffer = Ringbuffer::new(2, 4).unwrap();
        ringbuffer.record(5, &stack(&[1]));
        let sink = MemorySink::new();
        ringbuffer.drain(&resolver(), &sink, 5);
        assert!(sink.take().is_empty());
        assert_eq!(ringbuffer.valid_count(), 0);
    }

    #[test]
    fn test_concurrent_producers_claim_distinct_slots() {
        let ringbuffer = Arc::new(Ringbuffer::new(4 * 250, 4).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ringbuffer = Arc::clone(&ringbuffer);
                thread::spawn(move || {
                    for i in 0..250 {
                        ringbuffer.record(t, &stack(&[i % 10]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ringbuffer.valid_count(), 1000);

        let sink = MemorySink::new();
        let stats = ringbuffer.drain(&resolver(), &sink, NOBODY);
        assert_eq!(stats.records_emitted, 1000);
        let records = parse(sink.take());
        for t in 0..4 {
            assert_eq!(records.iter().filter(|r| r.thread_id == t).count(), 250);
        }
    }
}

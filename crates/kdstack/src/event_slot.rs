use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU64, AtomicUsize, Ordering};

use crate::frame::{FrameDescriptor, MethodId, ThreadId};
use crate::resolver::{name_or_fallback, FrameResolver};
use crate::util;
use crate::wire::{WireRecord, CHUNK_THRESHOLD, SEPARATOR};

#[derive(Debug, Default)]
struct FrameCell {
    instruction_offset: AtomicI32,
    method_id: AtomicU64,
}

/// A pre-allocated slot holding one captured stack.
///
/// Every field is atomic and writes are published seqlock-style: `sequence`
/// is odd while a write is in flight and 0 until the first write completes.
/// A producer that finds another producer mid-write on the same slot drops
/// its sample instead of waiting. Readers that race a writer see a torn
/// sample and drop it.
#[derive(Debug)]
pub struct EventSlot {
    sequence: AtomicU64,
    thread_id: AtomicI64,
    timestamp: AtomicU64,
    frame_count: AtomicUsize,
    frames: Box<[FrameCell]>,
}

/// An owned, consistent copy of a slot's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub thread_id: ThreadId,
    pub timestamp: u64,
    pub frames: Vec<FrameDescriptor>,
}

impl EventSlot {
    pub fn new(max_depth: usize) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            thread_id: AtomicI64::new(0),
            timestamp: AtomicU64::new(0),
            frame_count: AtomicUsize::new(0),
            frames: (0..max_depth).map(|_| FrameCell::default()).collect(),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.frames.len()
    }

    // async-signal-safe
    /// Overwrites the slot with a new sample. Frames beyond `max_depth` are dropped.
    pub fn record(&self, thread_id: ThreadId, frames: &[FrameDescriptor]) {
        let frame_count = frames.len().min(self.frames.len());

        let sequence = self.sequence.load(Ordering::Relaxed);
        if sequence % 2 == 1
            || self
                .sequence
                .compare_exchange(sequence, sequence.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            // Another producer owns this slot right now
            return;
        }
        fence(Ordering::Release);

        self.timestamp
            .store(util::current_timestamp_ns(), Ordering::Relaxed);
        self.thread_id.store(thread_id, Ordering::Relaxed);
        self.frame_count.store(frame_count, Ordering::Relaxed);
        for (cell, frame) in self.frames.iter().zip(&frames[..frame_count]) {
            cell.instruction_offset
                .store(frame.instruction_offset, Ordering::Relaxed);
            cell.method_id.store(frame.method_id.0, Ordering::Relaxed);
        }

        self.sequence
            .store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Copies the slot out. Returns `None` if the slot was never written or a
    /// writer was active during the read.
    pub fn snapshot(&self) -> Option<Sample> {
        let start = self.sequence.load(Ordering::Acquire);
        if start == 0 || start % 2 == 1 {
            return None;
        }

        let thread_id = self.thread_id.load(Ordering::Relaxed);
        let timestamp = self.timestamp.load(Ordering::Relaxed);
        let frame_count = self
            .frame_count
            .load(Ordering::Relaxed)
            .min(self.frames.len());
        let frames = self.frames[..frame_count]
            .iter()
            .map(|cell| FrameDescriptor {
                instruction_offset: cell.instruction_offset.load(Ordering::Relaxed),
                method_id: MethodId(cell.method_id.load(Ordering::Relaxed)),
            })
            .collect();

        fence(Ordering::Acquire);
        if self.sequence.load(Ordering::Relaxed) != start {
            return None;
        }

        Some(Sample {
            thread_id,
            timestamp,
            frames,
        })
    }

    /// Serializes the stored stack. A torn slot yields no records.
    pub fn serialize(&self, resolver: &dyn FrameResolver) -> Vec<WireRecord> {
        self.snapshot()
            .map(|sample| sample.serialize(resolver))
            .unwrap_or_default()
    }
}

impl Sample {
    /// Splits the resolved stack into records of at most ~1000 bytes.
    ///
    /// Names accumulate (each followed by `!`) into a pending chunk. When the
    /// next name would push a non-empty chunk past `CHUNK_THRESHOLD` bytes,
    /// the chunk is flushed as a continuation record and a new one starts at
    /// that frame. The remainder always goes out as the final record, even
    /// when the stack is empty.
    pub fn serialize(&self, resolver: &dyn FrameResolver) -> Vec<WireRecord> {
        let mut records = vec![];
        let mut pending = String::new();
        let mut start_frame = 0;

        for (i, frame) in self.frames.iter().enumerate() {
            let name = name_or_fallback(resolver, frame);
            if !pending.is_empty() && pending.len() + name.len() > CHUNK_THRESHOLD {
                records.push(self.record(start_frame, false, std::mem::take(&mut pending)));
                start_frame = i;
            }
            pending.push_str(&name);
            pending.push(SEPARATOR);
        }
        records.push(self.record(start_frame, true, pending));

        records
    }

    fn record(&self, start_frame: usize, finished: bool, stack: String) -> WireRecord {
        WireRecord {
            timestamp: self.timestamp,
            thread_id: self.thread_id,
            start_frame,
            finished,
            stack,
        }
    }
}

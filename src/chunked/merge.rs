//! Priority merge of chunks and records.
//!
//! The queue holds a mix of not-yet-decompressed chunks and already-extracted
//! records behind one tagged entry type with a single ordering. Chunks are
//! keyed by their minimum log time (maximum in reverse mode) so a chunk is
//! only decompressed once every earlier record has been emitted; records are
//! keyed by `(log_time, chunk offset, in-chunk position)`, which makes the
//! output a total order and repeated runs deterministic.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::record::Record;

use super::summary::ChunkDescriptor;

/// Filters and ordering for one iteration session over a chunked trace.
#[derive(Debug, Clone)]
pub struct ReadFilter {
    /// Restrict output to these channel ids (`None` = all channels)
    pub channels: Option<BTreeSet<u16>>,
    /// Inclusive lower bound on record log time
    pub start_time: Option<u64>,
    /// Exclusive upper bound on record log time
    pub end_time: Option<u64>,
    /// Emit records in log-time order. The merge always produces ordered
    /// output; `false` merely releases the guarantee for callers.
    pub log_time_order: bool,
    /// Emit records newest-first, inverting all tie-breaks
    pub reverse: bool,
}

impl Default for ReadFilter {
    fn default() -> Self {
        Self {
            channels: None,
            start_time: None,
            end_time: None,
            log_time_order: true,
            reverse: false,
        }
    }
}

impl ReadFilter {
    /// Restrict to a set of channel ids.
    pub fn with_channels<I: IntoIterator<Item = u16>>(mut self, channels: I) -> Self {
        self.channels = Some(channels.into_iter().collect());
        self
    }

    /// Restrict to log times in `[start, end)`.
    pub fn with_time_window(mut self, start: Option<u64>, end: Option<u64>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Emit newest records first.
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Whether a record passes the channel and time filters.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(channels) = &self.channels {
            if !channels.contains(&record.channel_id) {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.log_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.log_time >= end {
                return false;
            }
        }
        true
    }

    /// Whether a chunk could contain matching records.
    pub(super) fn chunk_matches(&self, descriptor: &ChunkDescriptor) -> bool {
        descriptor.intersects_window(self.start_time, self.end_time)
            && descriptor.intersects_channels(self.channels.as_ref())
    }
}

/// Work item in the merge queue.
pub(super) enum Pending {
    /// A chunk (by summary index) awaiting decompression
    Chunk(usize),
    /// A record extracted from a chunk, tagged with its origin
    Record {
        record: Record,
        chunk_offset: u64,
        pos_in_chunk: u32,
    },
}

/// Ordering key, direction-adjusted at push time: `(time, chunk offset,
/// in-chunk position, kind)` with chunks sorting ahead of records on ties.
type MergeKey = (u64, u64, u32, u8);

struct HeapEntry {
    key: MergeKey,
    item: Pending,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key pops first.
        other.key.cmp(&self.key)
    }
}

/// Min-queue over pending chunks and records.
pub(super) struct MergeQueue {
    heap: BinaryHeap<HeapEntry>,
    reverse: bool,
}

impl MergeQueue {
    pub(super) fn new(reverse: bool) -> Self {
        Self {
            heap: BinaryHeap::new(),
            reverse,
        }
    }

    fn key(&self, time: u64, offset: u64, pos: u32, kind: u8) -> MergeKey {
        if self.reverse {
            (u64::MAX - time, u64::MAX - offset, u32::MAX - pos, kind)
        } else {
            (time, offset, pos, kind)
        }
    }

    /// Queue a chunk, keyed by the earliest time it could emit (latest in
    /// reverse mode).
    pub(super) fn push_chunk(&mut self, index: usize, descriptor: &ChunkDescriptor) {
        let time = if self.reverse {
            descriptor.end_time
        } else {
            descriptor.start_time
        };
        self.heap.push(HeapEntry {
            key: self.key(time, descriptor.offset, 0, 0),
            item: Pending::Chunk(index),
        });
    }

    /// Queue an extracted record.
    pub(super) fn push_record(&mut self, record: Record, chunk_offset: u64, pos_in_chunk: u32) {
        self.heap.push(HeapEntry {
            key: self.key(record.log_time, chunk_offset, pos_in_chunk, 1),
            item: Pending::Record {
                record,
                chunk_offset,
                pos_in_chunk,
            },
        });
    }

    pub(super) fn pop(&mut self) -> Option<Pending> {
        self.heap.pop().map(|entry| entry.item)
    }
}

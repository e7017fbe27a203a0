//! Chunked trace reader: lazy decompression, time-ordered merge, and a
//! global record index.
//!
//! The reader consumes a pre-parsed [`TraceSummary`] and a seekable stream of
//! chunk bodies. Iteration runs as a *session*: chunks whose time range and
//! channel set pass the filter enter a priority queue, get decompressed on
//! demand, and their records are interleaved into one log-time-ordered
//! stream. Every emitted record is assigned the next global index, and its
//! `(chunk offset, in-chunk position)` is recorded so a later
//! [`get_by_index`](ChunkedTraceReader::get_by_index) can re-decompress just
//! the owning chunk.
//!
//! Unlike the flat reader's persistent offset table, the index map here is
//! scoped to one iteration session: starting a new session (or a cold
//! `get_by_index`) rebuilds it from zero. Sessions are forward-only and
//! single-pass; there is no resume point once a session is dropped.

pub mod summary;

mod chunk;
mod merge;


pub use merge::ReadFilter;
pub use summary::{ChunkDescriptor, TraceSummary};

use std::io::{Read, Seek};

use log::debug;

use crate::decode::{DecodedValue, DecoderCache, DecoderFactory};
use crate::error::TraceError;
use crate::record::Record;

use merge::{MergeQueue, Pending};

/// Location of one globally indexed record: the owning chunk's physical
/// offset and the record's raw position within the decompressed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalIndexEntry {
    /// Physical offset of the owning chunk
    pub chunk_offset: u64,
    /// Zero-based position among all records stored in the chunk
    pub pos_in_chunk: u32,
}

/// One in-flight iteration session.
struct MergeSession {
    queue: MergeQueue,
    filter: ReadFilter,
}

/// Reader for chunked trace containers.
///
/// Owns its stream exclusively; all operations are blocking calls on the one
/// instance, and concurrent use from multiple threads is not supported.
pub struct ChunkedTraceReader<R: Read + Seek> {
    stream: R,
    summary: TraceSummary,
    validate_crcs: bool,
    index_map: Vec<GlobalIndexEntry>,
    decoders: DecoderCache,
    session: Option<MergeSession>,
}

impl<R: Read + Seek> ChunkedTraceReader<R> {
    /// Create a reader from a seekable stream and its pre-parsed summary.
    pub fn new(stream: R, summary: TraceSummary, validate_crcs: bool) -> Self {
        Self {
            stream,
            summary,
            validate_crcs,
            index_map: Vec::new(),
            decoders: DecoderCache::new(),
            session: None,
        }
    }

    /// The container summary the reader was built from.
    pub fn summary(&self) -> &TraceSummary {
        &self.summary
    }

    /// Register a payload decoder factory.
    pub fn add_decoder_factory(&mut self, factory: Box<dyn DecoderFactory>) {
        self.decoders.add_factory(factory);
    }

    /// Begin a new iteration session, discarding any in-flight one.
    ///
    /// Resets the global index map; indices are assigned in emission order
    /// starting from zero.
    pub fn start_session(&mut self, filter: ReadFilter) {
        let mut queue = MergeQueue::new(filter.reverse);
        let mut selected = 0usize;
        for (index, descriptor) in self.summary.chunks.iter().enumerate() {
            if filter.chunk_matches(descriptor) {
                queue.push_chunk(index, descriptor);
                selected += 1;
            }
        }
        debug!(
            "merge session over {}/{} chunks",
            selected,
            self.summary.chunks.len()
        );
        self.index_map.clear();
        self.session = Some(MergeSession { queue, filter });
    }

    /// Pull the next record from the current session, starting an unfiltered
    /// session if none is active.
    ///
    /// Yields the record together with its global index. `Ok(None)` once the
    /// session is exhausted. A chunk that fails to decompress fails only the
    /// current pull; records already emitted and their index entries remain
    /// valid.
    pub fn next_record(&mut self) -> Result<Option<(Record, u64)>, TraceError> {
        if self.session.is_none() {
            self.start_session(ReadFilter::default());
        }
        loop {
            let popped = match self.session.as_mut() {
                Some(session) => session.queue.pop(),
                None => None,
            };
            match popped {
                None => return Ok(None),
                Some(Pending::Chunk(index)) => self.expand_chunk(index)?,
                Some(Pending::Record {
                    record,
                    chunk_offset,
                    pos_in_chunk,
                }) => {
                    let global_index = self.index_map.len() as u64;
                    self.index_map.push(GlobalIndexEntry {
                        chunk_offset,
                        pos_in_chunk,
                    });
                    return Ok(Some((record, global_index)));
                }
            }
        }
    }

    /// Whether an iteration session is in flight.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the current iteration session.
    ///
    /// The index map built so far stays addressable until the next session
    /// clears it.
    pub fn restart(&mut self) {
        self.session = None;
    }

    /// Fetch one record by global index.
    ///
    /// Warm lookups (index covered by the map built in the last session)
    /// decompress only the owning chunk. A cold lookup re-runs a full
    /// unfiltered merge to rebuild the map first, which discards any
    /// in-flight session. An index past the end of the trace is
    /// [`TraceError::IndexOutOfRange`].
    pub fn get_by_index(&mut self, index: usize) -> Result<Record, TraceError> {
        if index >= self.index_map.len() {
            self.start_session(ReadFilter::default());
            while self.index_map.len() <= index {
                if self.next_record()?.is_none() {
                    break;
                }
            }
            self.session = None;
        }
        if index >= self.index_map.len() {
            return Err(TraceError::IndexOutOfRange(index));
        }
        let entry = self.index_map[index];
        let descriptor = self
            .summary
            .chunk_at_offset(entry.chunk_offset)
            .cloned()
            .ok_or_else(|| {
                TraceError::Corruption(format!(
                    "index entry references unknown chunk at offset {}",
                    entry.chunk_offset
                ))
            })?;
        let mut records = chunk::read_chunk(&mut self.stream, &descriptor, self.validate_crcs)?;
        let pos = entry.pos_in_chunk as usize;
        if pos >= records.len() {
            return Err(TraceError::Corruption(format!(
                "index entry references record {} in a chunk holding {}",
                pos,
                records.len()
            )));
        }
        Ok(records.swap_remove(pos))
    }

    /// Decode a record's payload with the decoder registered for its channel.
    pub fn decode_record(&mut self, record: &Record) -> Result<DecodedValue, TraceError> {
        let channel = self
            .summary
            .channels
            .get(&record.channel_id)
            .ok_or_else(|| {
                TraceError::InvalidFormat(format!(
                    "record references unknown channel {}",
                    record.channel_id
                ))
            })?;
        self.decoders.decode(channel, &record.data)
    }

    /// Number of global index entries built by the current/last session.
    pub fn indexed_len(&self) -> usize {
        self.index_map.len()
    }

    /// Decompress the chunk and queue its filter-matching records, tagged
    /// with their raw in-chunk positions.
    fn expand_chunk(&mut self, index: usize) -> Result<(), TraceError> {
        let descriptor = self.summary.chunks[index].clone();
        let records = chunk::read_chunk(&mut self.stream, &descriptor, self.validate_crcs)?;
        if let Some(session) = self.session.as_mut() {
            for (pos, record) in records.into_iter().enumerate() {
                if session.filter.matches(&record) {
                    session
                        .queue
                        .push_record(record, descriptor.offset, pos as u32);
                }
            }
        }
        Ok(())
    }
}

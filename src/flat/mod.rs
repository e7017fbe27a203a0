//! Flat sequential trace reader.
//!
//! A flat trace is a headerless stream of `[u32 LE length][payload]` frames.
//! The reader walks the stream forward, growing an offset table with one
//! entry per record boundary plus a sentinel at the end of the known stream,
//! so a fully scanned trace of N records reports N+1 offsets. The table (and
//! the optional record cache) is extended **only** when a read starts exactly
//! at the sentinel; reads positioned anywhere else never mutate index state,
//! which keeps explicit index access from corrupting the table.
//!
//! A truncated trailing record is end-of-stream, not an error: trace files
//! still being appended routinely end mid-record. The reader rewinds to the
//! start of the partial record so repeated reads stay idempotent.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use log::debug;

use crate::error::TraceError;
use crate::record::Record;

/// Size of the length prefix in front of every record
pub const LENGTH_PREFIX_SIZE: u64 = 4;

/// Outcome of one forward step through the stream
enum Retrieved {
    /// A fully decoded record
    Record(Record),
    /// Skip mode: the byte offset just past the skipped record
    Skipped(u64),
}

/// Reader for flat `[length][payload]` traces.
///
/// The reader exclusively owns its stream; sharing one instance across
/// threads is not supported.
pub struct FlatTraceReader<R: Read + Seek> {
    stream: R,
    stream_len: u64,
    /// Record boundaries plus one sentinel at end-of-known-stream.
    /// Strictly increasing, extended only by natural forward reads.
    offsets: Vec<u64>,
    current_index: usize,
    read_complete: bool,
    cache: Option<HashMap<usize, Record>>,
}

impl<R: Read + Seek> FlatTraceReader<R> {
    /// Create a reader over a seekable stream of length-prefixed records.
    ///
    /// When `cache_records` is set, records are kept in memory keyed by index
    /// the first time they are read at their natural forward position.
    pub fn new(mut stream: R, cache_records: bool) -> Result<Self, TraceError> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        debug!("opened flat trace, {} bytes", stream_len);
        Ok(Self {
            stream,
            stream_len,
            offsets: vec![0],
            current_index: 0,
            read_complete: false,
            cache: if cache_records {
                Some(HashMap::new())
            } else {
                None
            },
        })
    }

    /// Read the next record at the current stream position.
    ///
    /// Returns `Ok(None)` at end-of-stream, including when the stream ends in
    /// a truncated record.
    pub fn read_next(&mut self) -> Result<Option<Record>, TraceError> {
        match self.retrieve(None, false)? {
            Some(Retrieved::Record(record)) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Walk past the next record without materializing its payload.
    ///
    /// Returns the byte offset just past the skipped record, or `Ok(None)` at
    /// end-of-stream.
    pub fn skip_next(&mut self) -> Result<Option<u64>, TraceError> {
        match self.retrieve(None, true)? {
            Some(Retrieved::Skipped(offset)) => Ok(Some(offset)),
            _ => Ok(None),
        }
    }

    /// Extend the offset table by scanning forward, and return it.
    ///
    /// With `limit`, the scan stops once the table holds more than `limit`
    /// entries; without it, the whole stream is indexed. The scan resumes
    /// from the sentinel and leaves the cursor there.
    pub fn retrieve_offsets(&mut self, limit: Option<usize>) -> Result<&[u64], TraceError> {
        if !self.read_complete {
            self.current_index = self.offsets.len() - 1;
            let sentinel = self.offsets[self.offsets.len() - 1];
            self.stream.seek(SeekFrom::Start(sentinel))?;
            while !self.read_complete && limit.map_or(true, |l| self.offsets.len() <= l) {
                self.retrieve(None, true)?;
            }
        }
        Ok(&self.offsets)
    }

    /// Reposition the reader at `index` (or the beginning).
    ///
    /// Extends the offset table first if the index is not yet known; an index
    /// the stream cannot cover is [`TraceError::IndexOutOfRange`].
    pub fn restart(&mut self, index: Option<usize>) -> Result<(), TraceError> {
        let index = index.unwrap_or(0);
        if index >= self.offsets.len() && !self.read_complete {
            self.retrieve_offsets(Some(index))?;
        }
        if index >= self.offsets.len() {
            return Err(TraceError::IndexOutOfRange(index));
        }
        self.current_index = index;
        self.stream.seek(SeekFrom::Start(self.offsets[index]))?;
        Ok(())
    }

    /// Fetch one record by its index.
    ///
    /// Unknown indices trigger a forward skip-scan to extend the table; an
    /// index past the last record is [`TraceError::IndexOutOfRange`]. Served
    /// from the cache when the record was previously read at its natural
    /// position.
    pub fn get_by_index(&mut self, index: usize) -> Result<Record, TraceError> {
        if index + 1 >= self.offsets.len() && !self.read_complete {
            self.retrieve_offsets(Some(index + 1))?;
        }
        if index + 1 >= self.offsets.len() {
            return Err(TraceError::IndexOutOfRange(index));
        }
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(&index) {
                return Ok(record.clone());
            }
        }
        match self.retrieve(Some(index), false)? {
            Some(Retrieved::Record(record)) => Ok(record),
            _ => Err(TraceError::IndexOutOfRange(index)),
        }
    }

    /// Iterate records with indices in `begin..end` (`end = None` reads to
    /// the end of the stream).
    pub fn records_in_index_range(
        &mut self,
        begin: usize,
        end: Option<usize>,
    ) -> Result<RangeIter<'_, R>, TraceError> {
        self.restart(Some(begin))?;
        Ok(RangeIter {
            reader: self,
            current: begin,
            end,
            done: false,
        })
    }

    /// Offset table built so far: record boundaries plus the trailing
    /// sentinel.
    pub fn known_offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Whether the whole stream has been indexed.
    pub fn read_complete(&self) -> bool {
        self.read_complete
    }

    /// One forward step: read or skip the record at the current position, or
    /// at `offsets[index]` when given. Extends the offset table and cache
    /// only when the step started exactly at the table sentinel.
    fn retrieve(
        &mut self,
        index: Option<usize>,
        skip: bool,
    ) -> Result<Option<Retrieved>, TraceError> {
        if let Some(index) = index {
            if index >= self.offsets.len() {
                return Err(TraceError::IndexOutOfRange(index));
            }
            self.current_index = index;
            self.stream.seek(SeekFrom::Start(self.offsets[index]))?;
        }

        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get(&self.current_index) {
                // Cached records always have a known end boundary.
                let record = record.clone();
                self.current_index += 1;
                let next = self.offsets[self.current_index.min(self.offsets.len() - 1)];
                self.stream.seek(SeekFrom::Start(next))?;
                if skip {
                    return Ok(Some(Retrieved::Skipped(next)));
                }
                return Ok(Some(Retrieved::Record(record)));
            }
        }

        let start = self.stream.stream_position()?;
        let sentinel = self.offsets[self.offsets.len() - 1];

        let mut header = [0u8; LENGTH_PREFIX_SIZE as usize];
        let got = read_full(&mut self.stream, &mut header)?;
        if got < header.len() {
            return self.end_of_known_stream(start, sentinel);
        }
        let length = LittleEndian::read_u32(&header) as u64;

        if skip {
            let end = start + LENGTH_PREFIX_SIZE + length;
            if end > self.stream_len {
                return self.end_of_known_stream(start, sentinel);
            }
            self.stream.seek(SeekFrom::Start(end))?;
            self.current_index += 1;
            if start == sentinel {
                self.offsets.push(end);
            }
            return Ok(Some(Retrieved::Skipped(end)));
        }

        let mut data = vec![0u8; length as usize];
        let got = read_full(&mut self.stream, &mut data)?;
        if got < data.len() {
            return self.end_of_known_stream(start, sentinel);
        }
        self.current_index += 1;
        let record = Record {
            channel_id: 0,
            log_time: 0,
            data: Bytes::from(data),
        };
        if start == sentinel {
            if let Some(cache) = &mut self.cache {
                cache.insert(self.offsets.len() - 1, record.clone());
            }
            self.offsets.push(start + LENGTH_PREFIX_SIZE + length);
        }
        Ok(Some(Retrieved::Record(record)))
    }

    /// Truncated prefix or payload: rewind to the start of the partial record
    /// and, if it sat at the sentinel, mark the scan complete.
    fn end_of_known_stream(
        &mut self,
        start: u64,
        sentinel: u64,
    ) -> Result<Option<Retrieved>, TraceError> {
        if start == sentinel {
            self.read_complete = true;
        }
        self.stream.seek(SeekFrom::Start(start))?;
        Ok(None)
    }
}

/// Iterator over a contiguous index range of a flat trace.
pub struct RangeIter<'a, R: Read + Seek> {
    reader: &'a mut FlatTraceReader<R>,
    current: usize,
    end: Option<usize>,
    done: bool,
}

impl<R: Read + Seek> Iterator for RangeIter<'_, R> {
    type Item = Result<Record, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.end.is_some_and(|end| self.current >= end) {
            return None;
        }
        match self.reader.read_next() {
            Ok(Some(record)) => {
                self.current += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Read into `buf` until it is full or the stream ends; returns bytes read.
fn read_full<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<usize, TraceError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

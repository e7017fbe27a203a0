//! Unified trace reading façade.
//!
//! [`TraceReader`] selects a strategy from the container shape at open time
//! (file extension) and exposes one iteration and index-lookup surface over
//! both. Operations that only make sense for one strategy report
//! [`TraceError::Unsupported`] on the other instead of silently returning
//! empty results:
//!
//! | operation                     | flat | chunked |
//! |-------------------------------|------|---------|
//! | iteration, `next_record`      | yes  | yes     |
//! | `get_record_by_index`         | yes  | yes     |
//! | `restart(None)`               | yes  | yes     |
//! | `restart(Some(i))`            | yes  | no      |
//! | `retrieve_offsets`            | yes  | no      |
//! | `records_in_index_range`      | yes  | no      |
//! | `available_topics`, metadata  | no   | yes     |
//!
//! Index state follows the strategy: the flat offset table persists across
//! calls, while the chunked global index is scoped to one iteration session.


use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;

use crate::chunked::{ChunkedTraceReader, ReadFilter, TraceSummary};
use crate::decode::{DecodedValue, DecoderCache, DecoderFactory};
use crate::error::TraceError;
use crate::flat::{FlatTraceReader, RangeIter};
use crate::record::{ChannelInfo, Record, SchemaInfo};

/// Extension of flat traces
pub const FLAT_EXTENSION: &str = "tlog";
/// Extension of gzip-compressed flat traces
pub const FLAT_GZ_EXTENSION: &str = "gz";
/// Extension of chunked trace containers
pub const CHUNKED_EXTENSION: &str = "tcap";

/// Seekable byte source for a flat trace
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Container strategy selected at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// Flat length-prefixed stream
    Flat,
    /// Chunked container with summary index
    Chunked,
}

/// Options for opening a trace.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Keep flat-trace records in memory once read at their natural position
    pub cache_records: bool,
    /// Topic to read from a chunked trace (default: first available)
    pub topic: Option<String>,
    /// Only consider channels whose schema name matches (chunked traces)
    pub schema_filter: Option<String>,
    /// Encoding hint used to resolve a decoder for flat-trace payloads
    pub message_encoding: Option<String>,
    /// Verify chunk checksums when the summary supplies them
    pub validate_crcs: bool,
}

impl OpenOptions {
    /// Enable the in-memory record cache for flat traces.
    pub fn with_cache(mut self) -> Self {
        self.cache_records = true;
        self
    }

    /// Select a topic for chunked traces.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Restrict topic selection to channels of this schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_filter = Some(schema.into());
        self
    }

    /// Verify chunk checksums while reading.
    pub fn with_crc_validation(mut self) -> Self {
        self.validate_crcs = true;
        self
    }
}

enum ReaderKind {
    Flat {
        reader: FlatTraceReader<Box<dyn ReadSeek>>,
        channel: ChannelInfo,
        decoders: DecoderCache,
    },
    Chunked {
        reader: ChunkedTraceReader<BufReader<File>>,
        topic: String,
        topic_id: u16,
    },
}

/// Reader over either trace representation.
///
/// One instance exclusively owns its underlying stream; concurrent use from
/// multiple threads is a caller error and is not guarded against internally.
pub struct TraceReader {
    kind: ReaderKind,
}

impl TraceReader {
    /// Open a trace file, selecting the strategy from its extension.
    ///
    /// `.tcap` opens as a chunked container (summary loaded from the file
    /// tail), `.tlog` as a flat trace, and `.gz` as a flat trace whose whole
    /// stream is gunzipped into memory (gzip streams cannot seek). Any other
    /// extension is [`TraceError::InvalidFormat`].
    pub fn open<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        debug!("opening trace {} ({})", path.display(), extension);
        match extension.as_str() {
            CHUNKED_EXTENSION => Self::open_chunked(path, options),
            FLAT_EXTENSION => {
                let file = File::open(path)?;
                let stream: Box<dyn ReadSeek> = Box::new(BufReader::new(file));
                Self::open_flat(stream, options)
            }
            FLAT_GZ_EXTENSION => {
                let file = File::open(path)?;
                let mut buffer = Vec::new();
                GzDecoder::new(BufReader::new(file)).read_to_end(&mut buffer)?;
                let stream: Box<dyn ReadSeek> = Box::new(Cursor::new(buffer));
                Self::open_flat(stream, options)
            }
            other => Err(TraceError::InvalidFormat(format!(
                "unsupported trace extension '{}'",
                other
            ))),
        }
    }

    /// Wrap an already-open flat byte source.
    pub fn open_flat(stream: Box<dyn ReadSeek>, options: OpenOptions) -> Result<Self, TraceError> {
        let reader = FlatTraceReader::new(stream, options.cache_records)?;
        // Flat frames carry no channel; decoding resolves against this
        // synthetic descriptor built from the open options.
        let channel = ChannelInfo {
            id: 0,
            topic: String::new(),
            message_encoding: options.message_encoding.unwrap_or_default(),
            schema: None,
            metadata: BTreeMap::new(),
        };
        Ok(Self {
            kind: ReaderKind::Flat {
                reader,
                channel,
                decoders: DecoderCache::new(),
            },
        })
    }

    fn open_chunked(path: &Path, options: OpenOptions) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        let mut stream = BufReader::new(file);
        let summary = TraceSummary::read_footer(&mut stream)?;

        let schema_filter = options.schema_filter.as_deref();
        let selected = match &options.topic {
            Some(topic) => summary
                .channels
                .values()
                .find(|channel| {
                    channel.topic == *topic && channel.schema_matches(schema_filter)
                })
                .cloned(),
            None => summary
                .channels
                .values()
                .find(|channel| channel.schema_matches(schema_filter))
                .cloned(),
        };
        let selected = selected.ok_or_else(|| match &options.topic {
            Some(topic) => TraceError::InvalidFormat(format!(
                "topic '{}' is not present in the trace or does not match the requested schema",
                topic
            )),
            None => TraceError::InvalidFormat("trace contains no matching channel".into()),
        })?;

        Ok(Self {
            kind: ReaderKind::Chunked {
                reader: ChunkedTraceReader::new(stream, summary, options.validate_crcs),
                topic: selected.topic,
                topic_id: selected.id,
            },
        })
    }

    /// The strategy this reader dispatches to.
    pub fn format(&self) -> TraceFormat {
        match self.kind {
            ReaderKind::Flat { .. } => TraceFormat::Flat,
            ReaderKind::Chunked { .. } => TraceFormat::Chunked,
        }
    }

    /// Topic selected at open time (chunked traces only).
    pub fn topic(&self) -> Option<&str> {
        match &self.kind {
            ReaderKind::Flat { .. } => None,
            ReaderKind::Chunked { topic, .. } => Some(topic),
        }
    }

    /// Pull the next record of the active iteration.
    ///
    /// Chunked traces iterate the selected topic in log-time order; the
    /// iteration is stateful and continues where the last pull left off until
    /// [`restart`](Self::restart).
    pub fn next_record(&mut self) -> Result<Option<Record>, TraceError> {
        match &mut self.kind {
            ReaderKind::Flat { reader, .. } => reader.read_next(),
            ReaderKind::Chunked {
                reader, topic_id, ..
            } => {
                if !reader.has_session() {
                    reader.start_session(ReadFilter::default().with_channels([*topic_id]));
                }
                Ok(reader.next_record()?.map(|(record, _)| record))
            }
        }
    }

    /// Iterator adapter over [`next_record`](Self::next_record).
    pub fn records(&mut self) -> Records<'_> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Restart iteration, optionally from a record index.
    ///
    /// Chunked traces only support restarting from the beginning: their index
    /// is iteration-session-scoped, so `restart(Some(_))` is
    /// [`TraceError::Unsupported`].
    pub fn restart(&mut self, index: Option<usize>) -> Result<(), TraceError> {
        match &mut self.kind {
            ReaderKind::Flat { reader, .. } => reader.restart(index),
            ReaderKind::Chunked { reader, .. } => {
                if index.is_some() {
                    return Err(TraceError::Unsupported(
                        "restarting from an index is not supported for chunked traces",
                    ));
                }
                reader.restart();
                Ok(())
            }
        }
    }

    /// Fetch one record by global index, on either strategy.
    pub fn get_record_by_index(&mut self, index: usize) -> Result<Record, TraceError> {
        match &mut self.kind {
            ReaderKind::Flat { reader, .. } => reader.get_by_index(index),
            ReaderKind::Chunked { reader, .. } => reader.get_by_index(index),
        }
    }

    /// Offset table snapshot (flat traces only).
    pub fn retrieve_offsets(&mut self, limit: Option<usize>) -> Result<Vec<u64>, TraceError> {
        match &mut self.kind {
            ReaderKind::Flat { reader, .. } => Ok(reader.retrieve_offsets(limit)?.to_vec()),
            ReaderKind::Chunked { .. } => Err(TraceError::Unsupported(
                "offset retrieval is only supported for flat traces",
            )),
        }
    }

    /// Iterate a contiguous index range (flat traces only).
    pub fn records_in_index_range(
        &mut self,
        begin: usize,
        end: Option<usize>,
    ) -> Result<RangeIter<'_, Box<dyn ReadSeek>>, TraceError> {
        match &mut self.kind {
            ReaderKind::Flat { reader, .. } => reader.records_in_index_range(begin, end),
            ReaderKind::Chunked { .. } => Err(TraceError::Unsupported(
                "index-range retrieval is only supported for flat traces",
            )),
        }
    }

    /// Topic names in the container, optionally restricted to channels of one
    /// schema name (chunked traces only).
    pub fn available_topics(
        &self,
        schema_filter: Option<&str>,
    ) -> Result<Vec<String>, TraceError> {
        match &self.kind {
            ReaderKind::Flat { .. } => Err(TraceError::Unsupported(
                "topic listing is only supported for chunked traces",
            )),
            ReaderKind::Chunked { reader, .. } => Ok(reader
                .summary()
                .channels
                .values()
                .filter(|channel| channel.schema_matches(schema_filter))
                .map(|channel| channel.topic.clone())
                .collect()),
        }
    }

    /// File-scope key/value metadata (chunked traces only).
    pub fn file_metadata(&self) -> Result<&BTreeMap<String, String>, TraceError> {
        match &self.kind {
            ReaderKind::Flat { .. } => Err(TraceError::Unsupported(
                "file metadata is only supported for chunked traces",
            )),
            ReaderKind::Chunked { reader, .. } => Ok(&reader.summary().metadata),
        }
    }

    /// Key/value metadata of the selected topic (chunked traces only).
    pub fn channel_metadata(&self) -> Result<&BTreeMap<String, String>, TraceError> {
        match &self.kind {
            ReaderKind::Flat { .. } => Err(TraceError::Unsupported(
                "channel metadata is only supported for chunked traces",
            )),
            ReaderKind::Chunked {
                reader, topic_id, ..
            } => reader
                .summary()
                .channels
                .get(topic_id)
                .map(|channel| &channel.metadata)
                .ok_or_else(|| {
                    TraceError::InvalidFormat(format!("channel {} missing from summary", topic_id))
                }),
        }
    }

    /// Schema of the selected topic (chunked traces only).
    pub fn record_schema(&self) -> Result<Option<&SchemaInfo>, TraceError> {
        match &self.kind {
            ReaderKind::Flat { .. } => Err(TraceError::Unsupported(
                "schema queries are only supported for chunked traces",
            )),
            ReaderKind::Chunked {
                reader, topic_id, ..
            } => Ok(reader
                .summary()
                .channels
                .get(topic_id)
                .and_then(|channel| channel.schema.as_ref())),
        }
    }

    /// Register a payload decoder factory with the active strategy.
    pub fn add_decoder_factory(&mut self, factory: Box<dyn DecoderFactory>) {
        match &mut self.kind {
            ReaderKind::Flat { decoders, .. } => decoders.add_factory(factory),
            ReaderKind::Chunked { reader, .. } => reader.add_decoder_factory(factory),
        }
    }

    /// Decode a record's payload with the decoder resolved for its channel.
    pub fn decode_record(&mut self, record: &Record) -> Result<DecodedValue, TraceError> {
        match &mut self.kind {
            ReaderKind::Flat {
                channel, decoders, ..
            } => decoders.decode(channel, &record.data),
            ReaderKind::Chunked { reader, .. } => reader.decode_record(record),
        }
    }
}

/// Iterator over the records of a [`TraceReader`].
pub struct Records<'a> {
    reader: &'a mut TraceReader,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = Result<Record, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
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

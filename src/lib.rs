//! # tracecap - Indexed Reading of Event-Trace Containers
//!
//! `tracecap` reads timestamped, binary record traces with random access by
//! global record index, without loading whole files into memory.
//!
//! ## Container formats
//!
//! - **Flat traces** (`.tlog`, `.tlog.gz`): a headerless stream of
//!   `[u32 LE length][payload]` frames, optionally gzip-compressed as a
//!   whole. The reader builds a per-record offset table incrementally and
//!   supports restart from any indexed record. A truncated trailing record
//!   marks end-of-stream, never an error.
//!
//! - **Chunked traces** (`.tcap`): groups of records, each group
//!   independently zlib-compressed and described by a summary (offsets, time
//!   ranges, channel sets). Records from multiple chunks are merged into one
//!   log-time-ordered stream; every emitted record gets a global index that
//!   later resolves back to its chunk without rescanning the file.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tracecap::trace::{OpenOptions, TraceReader};
//!
//! let mut trace = TraceReader::open("drive.tcap", OpenOptions::default())?;
//! for record in trace.records() {
//!     let record = record?;
//!     println!(
//!         "t={} channel={} {} bytes",
//!         record.log_time,
//!         record.channel_id,
//!         record.data.len()
//!     );
//! }
//!
//! // Random access by global index
//! let tenth = trace.get_record_by_index(9)?;
//! println!("{} bytes", tenth.data.len());
//! # Ok::<(), tracecap::TraceError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`flat`]: sequential reader with a persistent offset table
//! - [`chunked`]: chunk decoder plus the merge-and-index layer
//! - [`decode`]: pluggable per-channel payload decoding
//! - [`trace`]: façade dispatching on container shape
//!
//! ## Concurrency
//!
//! Readers are single-threaded and blocking. Each reader instance
//! exclusively owns its stream; sharing one instance across threads is a
//! caller error and is not guarded internally.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod chunked;
pub mod decode;
pub mod error;
pub mod flat;
pub mod record;
pub mod trace;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::TraceError;
pub use record::{ChannelInfo, Record, SchemaInfo};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::chunked::{
        ChunkDescriptor, ChunkedTraceReader, GlobalIndexEntry, ReadFilter, TraceSummary,
    };
    pub use crate::decode::{DecodeFn, DecodedValue, DecoderCache, DecoderFactory};
    pub use crate::error::TraceError;
    pub use crate::flat::FlatTraceReader;
    pub use crate::record::{ChannelInfo, Record, SchemaInfo};
    pub use crate::trace::{OpenOptions, Records, TraceFormat, TraceReader};
}

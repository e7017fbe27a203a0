//! Pre-parsed container summary for chunked traces.
//!
//! The reader core consumes the summary as given; it never mutates chunk
//! descriptors. Self-describing `.tcap` files carry the summary as a JSON
//! block at the tail, followed by its `u64` little-endian byte length, which
//! [`TraceSummary::read_footer`] recovers by probing the last 8 bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::record::ChannelInfo;

/// Size of the summary-length trailer at the end of a `.tcap` file
pub const SUMMARY_FOOTER_SIZE: u64 = 8;

/// Physical location and coverage of one compressed chunk.
///
/// Sourced from the summary; read-only for the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Byte offset of the compressed chunk body within the file
    pub offset: u64,
    /// Length of the compressed body in bytes
    pub compressed_len: u64,
    /// Length of the body after decompression
    pub uncompressed_len: u64,
    /// Smallest record log time in the chunk
    pub start_time: u64,
    /// Largest record log time in the chunk
    pub end_time: u64,
    /// Channels that may appear in the chunk
    pub channel_ids: BTreeSet<u16>,
    /// CRC32 of the decompressed body, when the writer recorded one
    #[serde(default)]
    pub crc32: Option<u32>,
}

impl ChunkDescriptor {
    /// Whether the chunk's time coverage intersects `[start, end)`.
    pub fn intersects_window(&self, start: Option<u64>, end: Option<u64>) -> bool {
        start.map_or(true, |start| self.end_time >= start)
            && end.map_or(true, |end| self.start_time < end)
    }

    /// Whether the chunk may contain any of the requested channels.
    pub fn intersects_channels(&self, channels: Option<&BTreeSet<u16>>) -> bool {
        match channels {
            None => true,
            Some(wanted) => self.channel_ids.iter().any(|id| wanted.contains(id)),
        }
    }
}

/// Summary of a chunked trace: channels, chunk index, file metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Channels present in the trace, by id
    pub channels: BTreeMap<u16, ChannelInfo>,
    /// Chunk index in physical file order
    pub chunks: Vec<ChunkDescriptor>,
    /// Arbitrary key/value metadata attached at file scope
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TraceSummary {
    /// Load the JSON summary from the tail of a `.tcap` stream.
    pub fn read_footer<R: Read + Seek>(stream: &mut R) -> Result<Self, TraceError> {
        let file_len = stream.seek(SeekFrom::End(0))?;
        if file_len < SUMMARY_FOOTER_SIZE {
            return Err(TraceError::InvalidFormat(
                "file too small to carry a summary footer".into(),
            ));
        }
        stream.seek(SeekFrom::End(-(SUMMARY_FOOTER_SIZE as i64)))?;
        let mut trailer = [0u8; SUMMARY_FOOTER_SIZE as usize];
        stream.read_exact(&mut trailer)?;
        let summary_len = LittleEndian::read_u64(&trailer);

        if summary_len > file_len - SUMMARY_FOOTER_SIZE {
            return Err(TraceError::InvalidFormat(format!(
                "summary length {} exceeds file size {}",
                summary_len, file_len
            )));
        }
        stream.seek(SeekFrom::End(-((SUMMARY_FOOTER_SIZE + summary_len) as i64)))?;
        let mut raw = vec![0u8; summary_len as usize];
        stream.read_exact(&mut raw)?;

        let summary: TraceSummary = serde_json::from_slice(&raw)?;
        debug!(
            "loaded summary: {} channels, {} chunks",
            summary.channels.len(),
            summary.chunks.len()
        );
        Ok(summary)
    }

    /// Channel descriptor for a topic name, if present.
    pub fn channel_by_topic(&self, topic: &str) -> Option<&ChannelInfo> {
        self.channels.values().find(|channel| channel.topic == topic)
    }

    /// Chunk descriptor at a physical offset, if the summary lists one.
    pub fn chunk_at_offset(&self, offset: u64) -> Option<&ChunkDescriptor> {
        self.chunks.iter().find(|chunk| chunk.offset == offset)
    }
}

//! Fixture builders shared by the module tests: in-memory flat streams and
//! chunked containers with summaries.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::chunked::summary::{ChunkDescriptor, TraceSummary};
use crate::record::{ChannelInfo, SchemaInfo};

/// One record to place in a chunk: (channel_id, log_time, payload).
pub(crate) type RecordSpec<'a> = (u16, u64, &'a [u8]);

/// Serialize payloads as a flat `[u32 LE length][payload]` stream.
pub(crate) fn flat_bytes(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        out.write_u32::<LittleEndian>(payload.len() as u32)
            .expect("write to vec");
        out.extend_from_slice(payload);
    }
    out
}

/// Frame and zlib-compress one chunk body, returning the compressed bytes,
/// the uncompressed length, and the body CRC.
pub(crate) fn encode_chunk(records: &[RecordSpec<'_>]) -> (Vec<u8>, u64, u32) {
    let mut body = Vec::new();
    for (channel_id, log_time, data) in records {
        body.write_u16::<LittleEndian>(*channel_id)
            .expect("write to vec");
        body.write_u64::<LittleEndian>(*log_time)
            .expect("write to vec");
        body.write_u32::<LittleEndian>(data.len() as u32)
            .expect("write to vec");
        body.extend_from_slice(data);
    }
    let crc = crc32fast::hash(&body);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body).expect("compress chunk");
    let compressed = encoder.finish().expect("compress chunk");
    (compressed, body.len() as u64, crc)
}

/// Concatenate chunks into a container body and build their descriptors.
pub(crate) fn build_chunks(chunks: &[&[RecordSpec<'_>]]) -> (Vec<u8>, Vec<ChunkDescriptor>) {
    let mut body = Vec::new();
    let mut descriptors = Vec::new();
    for records in chunks {
        let (compressed, uncompressed_len, crc) = encode_chunk(records);
        let start_time = records.iter().map(|r| r.1).min().unwrap_or(0);
        let end_time = records.iter().map(|r| r.1).max().unwrap_or(0);
        let channel_ids: BTreeSet<u16> = records.iter().map(|r| r.0).collect();
        descriptors.push(ChunkDescriptor {
            offset: body.len() as u64,
            compressed_len: compressed.len() as u64,
            uncompressed_len,
            start_time,
            end_time,
            channel_ids,
            crc32: Some(crc),
        });
        body.extend_from_slice(&compressed);
    }
    (body, descriptors)
}

/// A channel descriptor with an optional protobuf-style schema.
pub(crate) fn channel(id: u16, topic: &str, schema_name: Option<&str>) -> ChannelInfo {
    ChannelInfo {
        id,
        topic: topic.to_string(),
        message_encoding: "protobuf".to_string(),
        schema: schema_name.map(|name| SchemaInfo {
            name: name.to_string(),
            encoding: "proto3".to_string(),
        }),
        metadata: BTreeMap::new(),
    }
}

/// Assemble a summary from channels and chunk descriptors.
pub(crate) fn summary(
    channels: Vec<ChannelInfo>,
    chunks: Vec<ChunkDescriptor>,
    metadata: BTreeMap<String, String>,
) -> TraceSummary {
    TraceSummary {
        channels: channels.into_iter().map(|c| (c.id, c)).collect(),
        chunks,
        metadata,
    }
}

/// Append the JSON summary footer to a container body, producing a complete
/// `.tcap` byte image.
pub(crate) fn with_footer(mut body: Vec<u8>, summary: &TraceSummary) -> Vec<u8> {
    let json = serde_json::to_vec(summary).expect("serialize summary");
    body.extend_from_slice(&json);
    body.write_u64::<LittleEndian>(json.len() as u64)
        .expect("write to vec");
    body
}

//! Chunk decoding: seek, decompress, split into records.
//!
//! Chunks are complete units; unlike the flat format's trailing record, a
//! frame that overruns the decompressed body is corruption, never
//! end-of-stream. The same chunk may be re-read any number of times; nothing
//! here assumes a chunk stays resident after decoding.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use log::debug;

use crate::error::TraceError;
use crate::record::Record;

use super::summary::ChunkDescriptor;

/// Bytes of framing per record inside a decompressed chunk body:
/// `[u16 channel][u64 log_time][u32 length]`.
pub(super) const RECORD_FRAME_SIZE: u64 = 2 + 8 + 4;

/// Decompress one chunk and split it into records in stored order.
///
/// The stored order is whatever the writer produced; it is not assumed to be
/// time-sorted. With `validate_crc`, a descriptor-supplied CRC32 is checked
/// against the decompressed body and a mismatch fails with
/// [`TraceError::Corruption`].
pub(super) fn read_chunk<R: Read + Seek>(
    stream: &mut R,
    descriptor: &ChunkDescriptor,
    validate_crc: bool,
) -> Result<Vec<Record>, TraceError> {
    stream.seek(SeekFrom::Start(descriptor.offset))?;
    let mut compressed = vec![0u8; descriptor.compressed_len as usize];
    stream.read_exact(&mut compressed)?;

    let mut body = Vec::with_capacity(descriptor.uncompressed_len as usize);
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut body)?;
    if body.len() as u64 != descriptor.uncompressed_len {
        return Err(TraceError::Corruption(format!(
            "chunk at offset {} decompressed to {} bytes, summary declares {}",
            descriptor.offset,
            body.len(),
            descriptor.uncompressed_len
        )));
    }

    if validate_crc {
        if let Some(expected) = descriptor.crc32 {
            let actual = crc32fast::hash(&body);
            if actual != expected {
                return Err(TraceError::Corruption(format!(
                    "chunk at offset {} failed CRC check: expected {:#010x}, got {:#010x}",
                    descriptor.offset, expected, actual
                )));
            }
        }
    }

    let records = split_records(&body, descriptor.offset)?;
    debug!(
        "decompressed chunk at offset {}: {} records",
        descriptor.offset,
        records.len()
    );
    Ok(records)
}

/// Split a decompressed chunk body into framed records.
fn split_records(body: &[u8], chunk_offset: u64) -> Result<Vec<Record>, TraceError> {
    let mut cursor = Cursor::new(body);
    let len = body.len() as u64;
    let mut records = Vec::new();

    while cursor.position() < len {
        let remaining = len - cursor.position();
        if remaining < RECORD_FRAME_SIZE {
            return Err(TraceError::Corruption(format!(
                "chunk at offset {} has {} stray trailing bytes",
                chunk_offset, remaining
            )));
        }
        let channel_id = cursor.read_u16::<LittleEndian>()?;
        let log_time = cursor.read_u64::<LittleEndian>()?;
        let data_len = cursor.read_u32::<LittleEndian>()? as u64;
        if data_len > len - cursor.position() {
            return Err(TraceError::Corruption(format!(
                "record in chunk at offset {} declares {} bytes with only {} remaining",
                chunk_offset,
                data_len,
                len - cursor.position()
            )));
        }
        let start = cursor.position() as usize;
        let data = Bytes::copy_from_slice(&body[start..start + data_len as usize]);
        cursor.set_position(cursor.position() + data_len);
        records.push(Record {
            channel_id,
            log_time,
            data,
        });
    }
    Ok(records)
}

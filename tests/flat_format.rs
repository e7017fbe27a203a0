//! End-to-end checks of the flat trace format through the public API.

use std::fs;

use tempfile::TempDir;
use tracecap::trace::{OpenOptions, TraceFormat, TraceReader};
use tracecap::TraceError;

/// Frame payloads as `[u32 LE length][payload]`.
fn frame(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }
    out
}

#[test]
fn full_round_trip_with_index_access() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("run.tlog");
    let payloads: Vec<&[u8]> = vec![b"pose:0", b"pose:1", b"pose:2", b"pose:3"];
    fs::write(&path, frame(&payloads)).expect("write trace");

    let mut trace = TraceReader::open(&path, OpenOptions::default().with_cache())
        .expect("open trace");
    assert_eq!(trace.format(), TraceFormat::Flat);

    let records: Vec<_> = trace
        .records()
        .collect::<Result<_, _>>()
        .expect("records");
    assert_eq!(records.len(), payloads.len());
    for (record, payload) in records.iter().zip(&payloads) {
        assert_eq!(record.data.as_ref(), *payload);
    }

    // Offsets: one per record plus the end-of-stream sentinel.
    let offsets = trace.retrieve_offsets(None).expect("offsets");
    assert_eq!(offsets.len(), payloads.len() + 1);
    assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));

    // Random access agrees with iteration, warm or cold.
    for (i, record) in records.iter().enumerate() {
        assert_eq!(&trace.get_record_by_index(i).expect("indexed"), record);
    }
    assert!(matches!(
        trace.get_record_by_index(payloads.len()),
        Err(TraceError::IndexOutOfRange(_))
    ));

    // Restart from an index and replay the suffix.
    trace.restart(Some(2)).expect("restart");
    let suffix: Vec<_> = trace
        .records()
        .collect::<Result<_, _>>()
        .expect("records");
    assert_eq!(suffix, records[2..]);
}

#[test]
fn appended_file_with_partial_tail_reads_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("live.tlog");

    let mut bytes = frame(&[b"complete-1", b"complete-2"]);
    // A writer mid-append: prefix promises 100 bytes, only 7 are there.
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(b"partial");
    fs::write(&path, bytes).expect("write trace");

    let mut trace = TraceReader::open(&path, OpenOptions::default()).expect("open trace");
    let records: Vec<_> = trace
        .records()
        .collect::<Result<_, _>>()
        .expect("records");
    assert_eq!(records.len(), 2);

    let offsets = trace.retrieve_offsets(None).expect("offsets");
    assert_eq!(offsets.len(), 3);
}

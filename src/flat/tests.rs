use std::io::Cursor;

use proptest::prelude::*;

use super::FlatTraceReader;
use crate::error::TraceError;
use crate::testutil::flat_bytes;

fn reader_over(bytes: Vec<u8>, cache: bool) -> FlatTraceReader<Cursor<Vec<u8>>> {
    FlatTraceReader::new(Cursor::new(bytes), cache).expect("open flat stream")
}

#[test]
fn offsets_cover_every_record_plus_sentinel() {
    let bytes = flat_bytes(&[b"alpha", b"bravo!", b"c"]);
    let mut reader = reader_over(bytes, false);

    let offsets = reader.retrieve_offsets(None).expect("scan offsets");
    assert_eq!(offsets, &[0, 9, 19, 24]);
    assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(reader.read_complete());
}

#[test]
fn empty_stream_has_only_the_sentinel() {
    let mut reader = reader_over(Vec::new(), false);
    assert!(reader.read_next().expect("read").is_none());
    let offsets = reader.retrieve_offsets(None).expect("scan offsets");
    assert_eq!(offsets, &[0]);
}

#[test]
fn sequential_and_indexed_reads_agree() {
    let payloads: Vec<&[u8]> = vec![b"one", b"two", b"three", b"four"];
    let bytes = flat_bytes(&payloads);

    let mut sequential = reader_over(bytes.clone(), false);
    let mut collected = Vec::new();
    while let Some(record) = sequential.read_next().expect("read") {
        collected.push(record);
    }
    assert_eq!(collected.len(), 4);

    let mut indexed = reader_over(bytes, false);
    // Ask out of order to exercise the skip-scan fallback.
    for &i in &[2usize, 0, 3, 1] {
        let record = indexed.get_by_index(i).expect("indexed read");
        assert_eq!(record, collected[i]);
    }
}

#[test]
fn truncated_payload_is_end_of_stream_with_full_table() {
    // Three declared lengths of 5, but only 12 bytes follow the second
    // record's prefix: 5 payload + 4 prefix + 3 of the third payload.
    let mut bytes = flat_bytes(&[b"aaaaa", b"bbbbb"]);
    bytes.extend_from_slice(&5u32.to_le_bytes());
    bytes.extend_from_slice(b"ccc");

    let mut reader = reader_over(bytes.clone(), false);
    let mut count = 0;
    while reader.read_next().expect("read").is_some() {
        count += 1;
    }
    assert_eq!(count, 2);

    let offsets = reader.retrieve_offsets(None).expect("scan offsets");
    assert_eq!(offsets, &[0, 9, 18]);

    // Skip-mode scan on a fresh reader sees the same table.
    let mut skipper = reader_over(bytes, false);
    let offsets = skipper.retrieve_offsets(None).expect("scan offsets");
    assert_eq!(offsets, &[0, 9, 18]);
}

#[test]
fn truncated_prefix_is_end_of_stream() {
    let mut bytes = flat_bytes(&[b"whole"]);
    bytes.extend_from_slice(&[0x07, 0x00]); // two of four prefix bytes

    let mut reader = reader_over(bytes, false);
    assert!(reader.read_next().expect("read").is_some());
    assert!(reader.read_next().expect("read").is_none());
    // Idempotent: the cursor rewinds to the partial record every time.
    assert!(reader.read_next().expect("read").is_none());
    assert_eq!(reader.known_offsets(), &[0, 9]);
}

#[test]
fn restart_from_index_reproduces_the_suffix() {
    let payloads: Vec<&[u8]> = vec![b"r0", b"r1", b"r2", b"r3", b"r4"];
    let bytes = flat_bytes(&payloads);
    let mut reader = reader_over(bytes, false);

    let mut all = Vec::new();
    while let Some(record) = reader.read_next().expect("read") {
        all.push(record);
    }

    reader.restart(Some(2)).expect("restart");
    let mut suffix = Vec::new();
    while let Some(record) = reader.read_next().expect("read") {
        suffix.push(record);
    }
    assert_eq!(suffix, all[2..]);

    reader.restart(None).expect("restart");
    let first = reader.read_next().expect("read").expect("record");
    assert_eq!(first, all[0]);
}

#[test]
fn index_one_past_the_end_is_out_of_range() {
    let bytes = flat_bytes(&[b"only", b"two"]);
    let mut reader = reader_over(bytes, false);

    assert!(matches!(
        reader.get_by_index(2),
        Err(TraceError::IndexOutOfRange(2))
    ));
    // The failed probe must not corrupt the table.
    assert_eq!(reader.retrieve_offsets(None).expect("offsets").len(), 3);
    assert_eq!(reader.get_by_index(1).expect("read").data.as_ref(), b"two");
}

#[test]
fn restart_beyond_the_end_is_out_of_range() {
    let bytes = flat_bytes(&[b"a", b"b"]);
    let mut reader = reader_over(bytes, false);
    assert!(matches!(
        reader.restart(Some(9)),
        Err(TraceError::IndexOutOfRange(9))
    ));
}

#[test]
fn warm_index_lookup_matches_cold() {
    let bytes = flat_bytes(&[b"x", b"yy", b"zzz"]);
    let mut reader = reader_over(bytes, false);

    let cold = reader.get_by_index(2).expect("cold read");
    let warm = reader.get_by_index(2).expect("warm read");
    assert_eq!(cold, warm);
}

#[test]
fn cached_reader_returns_identical_records() {
    let payloads: Vec<&[u8]> = vec![b"cache", b"me", b"please"];
    let bytes = flat_bytes(&payloads);

    let mut cached = reader_over(bytes.clone(), true);
    let mut plain = reader_over(bytes, false);

    let mut from_cache = Vec::new();
    while let Some(record) = cached.read_next().expect("read") {
        from_cache.push(record);
    }
    // Second pass hits the cache; records must be identical.
    cached.restart(None).expect("restart");
    let mut second_pass = Vec::new();
    while let Some(record) = cached.read_next().expect("read") {
        second_pass.push(record);
    }
    assert_eq!(from_cache, second_pass);

    let mut uncached = Vec::new();
    while let Some(record) = plain.read_next().expect("read") {
        uncached.push(record);
    }
    assert_eq!(from_cache, uncached);
}

#[test]
fn out_of_order_access_does_not_extend_the_table() {
    let bytes = flat_bytes(&[b"first", b"second", b"third"]);
    let mut reader = reader_over(bytes, true);

    // Scan everything once so the table is complete.
    reader.retrieve_offsets(None).expect("offsets");
    let table = reader.known_offsets().to_vec();

    // Re-reading an early record must leave the table untouched.
    reader.restart(Some(0)).expect("restart");
    reader.read_next().expect("read");
    assert_eq!(reader.known_offsets(), table.as_slice());
}

#[test]
fn range_iteration_honors_bounds() {
    let payloads: Vec<&[u8]> = vec![b"r0", b"r1", b"r2", b"r3"];
    let bytes = flat_bytes(&payloads);
    let mut reader = reader_over(bytes, false);

    let range: Vec<_> = reader
        .records_in_index_range(1, Some(3))
        .expect("range")
        .collect::<Result<_, _>>()
        .expect("records");
    assert_eq!(range.len(), 2);
    assert_eq!(range[0].data.as_ref(), b"r1");
    assert_eq!(range[1].data.as_ref(), b"r2");

    let tail: Vec<_> = reader
        .records_in_index_range(3, None)
        .expect("range")
        .collect::<Result<_, _>>()
        .expect("records");
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].data.as_ref(), b"r3");
}

proptest! {
    #[test]
    fn table_is_strictly_increasing_for_any_payloads(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..16)
    ) {
        let views: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let bytes = flat_bytes(&views);
        let mut reader = reader_over(bytes, false);

        let offsets = reader.retrieve_offsets(None).expect("offsets").to_vec();
        prop_assert_eq!(offsets.len(), payloads.len() + 1);
        prop_assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));

        for (i, payload) in payloads.iter().enumerate() {
            let record = reader.get_by_index(i).expect("indexed read");
            prop_assert_eq!(record.data.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn truncation_yields_exactly_the_complete_records(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..30), 1..10),
        cut in 1usize..34
    ) {
        let views: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let mut bytes = flat_bytes(&views);
        // Append one more declared record, then truncate inside it.
        let partial = vec![0xAAu8; 30];
        bytes.extend_from_slice(&(partial.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&partial);
        bytes.truncate(bytes.len() - cut);

        let mut reader = reader_over(bytes, false);
        let mut count = 0;
        while reader.read_next().expect("read").is_some() {
            count += 1;
        }
        prop_assert_eq!(count, payloads.len());
        prop_assert_eq!(reader.known_offsets().len(), payloads.len() + 1);
    }
}

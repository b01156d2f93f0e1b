//! End-to-end scenarios spanning build, blob (de)serialization, and extract
//! together, as opposed to the per-module unit tests that exercise each in
//! isolation.

use std::io::{Cursor, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use zinfo::checkpoint::{Version, WINSIZE};
use zinfo::{blob, builder, extract};

const BLOB_HEADER_SIZE: usize = 12;
const PACKED_CHECKPOINT_SIZE: usize = 8 + 8 + 1 + WINSIZE;

fn gzip_of(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Hand-assembles a literal v1 blob: header plus `have - 1` packed
/// checkpoints, with checkpoint 0 omitted exactly as a legacy encoder would
/// have produced.
fn literal_v1_blob(have: u32, span: i64) -> Vec<u8> {
    let mut buf = vec![0u8; BLOB_HEADER_SIZE + PACKED_CHECKPOINT_SIZE * (have as usize - 1)];
    buf[0..4].copy_from_slice(&have.to_le_bytes());
    buf[4..12].copy_from_slice(&span.to_le_bytes());

    let mut cur = BLOB_HEADER_SIZE;
    for i in 1..have as i64 {
        buf[cur..cur + 8].copy_from_slice(&(i * 1000).to_le_bytes());
        cur += 8;
        buf[cur..cur + 8].copy_from_slice(&(i * 7000).to_le_bytes());
        cur += 8;
        buf[cur] = (i % 8) as u8;
        cur += 1;
        buf[cur..cur + WINSIZE].copy_from_slice(&vec![i as u8; WINSIZE]);
        cur += WINSIZE;
    }
    buf
}

#[test]
fn v1_blob_reserializes_byte_identical() {
    let fixture = literal_v1_blob(4, 4096);
    let index = blob::from_blob(&fixture).expect("valid v1 blob");
    assert_eq!(index.version(), Version::V1);
    assert_eq!(index.checkpoint_count(), 4);

    let reencoded = blob::to_blob(&index);
    assert_eq!(reencoded, fixture);
}

#[test]
fn v2_round_trip_through_build_and_blob() {
    let payload = b"the quick brown fox jumps over the lazy dog ".repeat(5_000);
    let gz = gzip_of(&payload);
    let index = builder::build_from_stream(Cursor::new(gz), 16_384).unwrap();

    let first = blob::to_blob(&index);
    let restored = blob::from_blob(&first).expect("valid v2 blob");
    let second = blob::to_blob(&restored);

    assert_eq!(first, second);
}

#[test]
fn invalid_blob_length_is_rejected() {
    let payload = b"0123456789".repeat(10_000);
    let gz = gzip_of(&payload);
    let index = builder::build_from_stream(Cursor::new(gz), 8_192).unwrap();

    let mut blob_bytes = blob::to_blob(&index);
    blob_bytes.push(0);
    assert!(blob::from_blob(&blob_bytes).is_none());
}

#[test]
fn checkpoint_for_offset_matches_span_boundaries() {
    let payload = b"abcdefghij".repeat(20_000);
    let gz = gzip_of(&payload);
    let index = builder::build_from_stream(Cursor::new(gz), 16_384).unwrap();

    for w in index.checkpoints().windows(2) {
        let i0 = index
            .checkpoints()
            .iter()
            .position(|c| c.out_off == w[0].out_off)
            .unwrap();
        assert_eq!(index.checkpoint_for_offset(w[0].out_off), i0);
        assert_eq!(index.checkpoint_for_offset(w[1].out_off - 1), i0);
    }
}

#[test]
fn extract_through_blob_round_trip_matches_direct_build() {
    let payload = b"abcdefghij".repeat(20_000);
    let gz = gzip_of(&payload);
    let index = builder::build_from_stream(Cursor::new(gz.clone()), 16_384).unwrap();
    let restored = blob::from_blob(&blob::to_blob(&index)).unwrap();

    let tmp = std::env::temp_dir().join(format!("zinfo-e2e-{}.gz", std::process::id()));
    std::fs::write(&tmp, &gz).unwrap();

    let mut out = [0u8; 10];
    let n = extract::extract_from_path(&tmp, &restored, 123_450, &mut out).unwrap();
    assert_eq!(n, 10);
    assert_eq!(&out, &payload[123_450..123_460]);

    std::fs::remove_file(&tmp).unwrap();
}

#[test]
fn blob_size_formula_holds_for_built_index() {
    let payload = b"xyz".repeat(50_000);
    let gz = gzip_of(&payload);
    let index = builder::build_from_stream(Cursor::new(gz), 4096).unwrap();

    assert_eq!(
        blob::blob_size(&index),
        BLOB_HEADER_SIZE + PACKED_CHECKPOINT_SIZE * index.checkpoint_count()
    );
}

/*
   Copyright The Soci Snapshotter Authors.

   Licensed under the Apache License, Version 2.0 (the "License");
   you may not use this file except in compliance with the License.
   You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

   Unless required by applicable law or agreed to in writing, software
   distributed under the License is distributed on an "AS IS" BASIS,
   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
   See the License for the specific language governing permissions and
   limitations under the License.
*/

//! The on-disk blob codec.
//!
//! Grounded on the upstream C implementation's `zinfo_to_blob` /
//! `blob_to_zinfo` / `get_blob_size` (`gzip_zinfo.c`), including the v1
//! quirk: a v1 blob omits checkpoint 0 entirely, because the original
//! encoder assumed it was a fixed, reconstructible offset. v2 fixed this by
//! always including it, but the wire format keeps both shapes
//! distinguishable purely by length so that old blobs keep decoding the
//! same way forever.
//!
//! Field layout is little-endian throughout, matching the C struct's
//! `encode_int32`/`encode_offset` helpers (`htole32`/`htole64` wrappers);
//! `to_le_bytes`/`from_le_bytes` give the same bytes on disk without
//! needing to reach for an explicit endian-conversion crate.

use crate::checkpoint::{Checkpoint, Index, Version, WINSIZE};

/// `have` (u32) + `span_size` (i64).
const BLOB_HEADER_SIZE: usize = 12;
/// `in` (i64) + `out` (i64) + `bits` (u8) + `window` (32768 bytes).
const PACKED_CHECKPOINT_SIZE: usize = 8 + 8 + 1 + WINSIZE;

/// The compressed-stream offset a v1 blob implicitly claims for the
/// checkpoint it omits. Matches the reconstruction the C decoder performs;
/// `10` is the minimum size of a gzip member header (magic, flags, mtime,
/// XFL, OS), which is as far as `blob_to_zinfo` can assume inflate has
/// advanced before the first block boundary.
const V1_SYNTHETIC_IN_OFF: i64 = 10;

/// The exact serialized size of `index`, per its current [`Version`].
pub fn blob_size(index: &Index) -> usize {
    let have = index.checkpoint_count();
    let encoded = if index.version() == Version::V1 {
        have - 1
    } else {
        have
    };
    BLOB_HEADER_SIZE + PACKED_CHECKPOINT_SIZE * encoded
}

/// Serializes `index` to a newly allocated buffer, in its own [`Version`].
pub fn to_blob(index: &Index) -> Vec<u8> {
    let mut out = vec![0u8; blob_size(index)];
    let _ = encode_into(index, &mut out);
    out
}

/// Serializes `index` into `out`, which must be exactly [`blob_size`] bytes.
/// Returns the number of bytes written (always `out.len()`).
///
/// # Panics
/// Panics if `out.len() != blob_size(index)`.
pub fn encode_into(index: &Index, out: &mut [u8]) -> usize {
    assert_eq!(out.len(), blob_size(index), "blob buffer size mismatch");

    let have = index.checkpoint_count() as u32;
    out[0..4].copy_from_slice(&have.to_le_bytes());
    out[4..12].copy_from_slice(&index.span.to_le_bytes());

    let first = if index.version() == Version::V1 { 1 } else { 0 };
    let mut cur = BLOB_HEADER_SIZE;
    for checkpoint in &index.checkpoints()[first..] {
        encode_checkpoint(checkpoint, &mut out[cur..cur + PACKED_CHECKPOINT_SIZE]);
        cur += PACKED_CHECKPOINT_SIZE;
    }

    out.len()
}

fn encode_checkpoint(checkpoint: &Checkpoint, out: &mut [u8]) {
    out[0..8].copy_from_slice(&checkpoint.in_off.to_le_bytes());
    out[8..16].copy_from_slice(&checkpoint.out_off.to_le_bytes());
    out[16] = checkpoint.bits;
    out[17..17 + WINSIZE].copy_from_slice(checkpoint.window.as_ref());
}

/// Deserializes a blob produced by [`to_blob`]/[`encode_into`]. Returns
/// `None` if `buf`'s length does not correspond to any valid checkpoint
/// count under either the v1 or v2 layout (including truncation and
/// trailing-garbage cases).
pub fn from_blob(buf: &[u8]) -> Option<Index> {
    if buf.len() < BLOB_HEADER_SIZE {
        return None;
    }

    let have = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let span = i64::from_le_bytes(buf[4..12].try_into().unwrap());

    // A well-formed index always has at least one checkpoint (spec.md §3,
    // invariant 1); a blob claiming zero would otherwise deserialize into an
    // Index whose later use (checkpoint_for_offset, extract) indexes an
    // empty Vec.
    if have == 0 {
        return None;
    }

    let body_len = buf.len() - BLOB_HEADER_SIZE;
    let v2_len = PACKED_CHECKPOINT_SIZE.checked_mul(have)?;
    let version = if body_len == v2_len {
        Version::V2
    } else if body_len == v2_len.checked_sub(PACKED_CHECKPOINT_SIZE)? {
        Version::V1
    } else {
        return None;
    };

    let mut checkpoints = Vec::with_capacity(have);
    if version == Version::V1 {
        checkpoints.push(Checkpoint {
            in_off: V1_SYNTHETIC_IN_OFF,
            out_off: 0,
            bits: 0,
            window: Box::new([0u8; WINSIZE]),
        });
    }

    let mut cur = BLOB_HEADER_SIZE;
    let remaining = if version == Version::V1 { have - 1 } else { have };
    for _ in 0..remaining {
        checkpoints.push(decode_checkpoint(&buf[cur..cur + PACKED_CHECKPOINT_SIZE]));
        cur += PACKED_CHECKPOINT_SIZE;
    }

    Some(Index::new(checkpoints, span, version))
}

fn decode_checkpoint(buf: &[u8]) -> Checkpoint {
    let in_off = i64::from_le_bytes(buf[0..8].try_into().unwrap());
    let out_off = i64::from_le_bytes(buf[8..16].try_into().unwrap());
    let bits = buf[16];
    let mut window = Box::new([0u8; WINSIZE]);
    window.copy_from_slice(&buf[17..17 + WINSIZE]);
    Checkpoint {
        in_off,
        out_off,
        bits,
        window,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_index(count: usize, version: Version) -> Index {
        let checkpoints = (0..count)
            .map(|i| Checkpoint {
                in_off: i as i64 * 100,
                out_off: i as i64 * 1000,
                bits: (i % 8) as u8,
                window: Box::new([i as u8; WINSIZE]),
            })
            .collect();
        Index::new(checkpoints, 1000, version)
    }

    #[test]
    fn v2_round_trips() {
        let index = sample_index(4, Version::V2);
        let blob = to_blob(&index);
        assert_eq!(blob.len(), blob_size(&index));

        let restored = from_blob(&blob).unwrap();
        assert_eq!(restored.version(), Version::V2);
        assert_eq!(restored.checkpoint_count(), 4);
        for (a, b) in index.checkpoints().iter().zip(restored.checkpoints()) {
            assert_eq!(a.in_off, b.in_off);
            assert_eq!(a.out_off, b.out_off);
            assert_eq!(a.bits, b.bits);
            assert_eq!(a.window, b.window);
        }

        let reblob = to_blob(&restored);
        assert_eq!(blob, reblob);
    }

    #[test]
    fn v1_blob_omits_checkpoint_zero_and_reserializes_identically() {
        let index = sample_index(4, Version::V1);
        let blob = to_blob(&index);
        assert_eq!(blob.len(), BLOB_HEADER_SIZE + PACKED_CHECKPOINT_SIZE * 3);

        let restored = from_blob(&blob).unwrap();
        assert_eq!(restored.version(), Version::V1);
        assert_eq!(restored.checkpoint_count(), 4);

        // Checkpoint 0 is synthetic: reconstructed, not the original.
        assert_eq!(restored.checkpoint(0).in_off, V1_SYNTHETIC_IN_OFF);
        assert_eq!(restored.checkpoint(0).out_off, 0);
        assert_eq!(restored.checkpoint(0).bits, 0);
        assert!(restored.checkpoint(0).window.iter().all(|&b| b == 0));

        // Checkpoints 1.. round-trip exactly.
        for i in 1..4 {
            assert_eq!(restored.checkpoint(i).in_off, index.checkpoint(i).in_off);
            assert_eq!(restored.checkpoint(i).out_off, index.checkpoint(i).out_off);
            assert_eq!(restored.checkpoint(i).bits, index.checkpoint(i).bits);
        }

        // Reserializing the restored index reproduces the exact same bytes,
        // bug and all: this is the whole point of the v1 quirk.
        let reblob = to_blob(&restored);
        assert_eq!(blob, reblob);
    }

    #[test]
    fn invalid_length_is_rejected() {
        let index = sample_index(3, Version::V2);
        let mut blob = to_blob(&index);
        blob.push(0);
        assert!(from_blob(&blob).is_none());
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(from_blob(&[0u8; 4]).is_none());
    }

    #[test]
    fn zero_checkpoint_count_is_rejected() {
        // A header-only blob claiming `have = 0` passes the length check for
        // a zero-checkpoint v2 body, but no well-formed index has zero
        // checkpoints (spec.md §3, invariant 1).
        let mut buf = vec![0u8; BLOB_HEADER_SIZE];
        buf[0..4].copy_from_slice(&0u32.to_le_bytes());
        buf[4..12].copy_from_slice(&4096i64.to_le_bytes());
        assert!(from_blob(&buf).is_none());
    }

    #[test]
    fn blob_size_matches_formula() {
        let v2 = sample_index(5, Version::V2);
        assert_eq!(blob_size(&v2), 12 + PACKED_CHECKPOINT_SIZE * 5);

        let v1 = sample_index(5, Version::V1);
        assert_eq!(blob_size(&v1), 12 + PACKED_CHECKPOINT_SIZE * 4);
    }
}

// Field shapes generalized from the Soci Snapshotter zinfo sample
// (`zinfo.rs`'s `GZipCheckpoint`/`ZInfo`) and the upstream C structs
// (`gzip_zinfo.h`'s `gzip_checkpoint`/`gzip_zinfo`).

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

//! The zinfo data model: [`Checkpoint`] and [`Index`].
//!
//! A checkpoint is an access point into a gzip stream from which raw
//! inflation can resume without replaying the whole prefix. An index is an
//! ordered, immutable-after-construction sequence of checkpoints.

/// Since gzip is compressed with a 32 KiB window, this size is fixed.
pub const WINSIZE: usize = 32768;

/// The blob serialization version tag carried by an [`Index`].
///
/// Governs serialization only (see [`crate::blob`]); it has no effect on how
/// an index behaves once loaded into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// Legacy format: the blob omits checkpoint 0 entirely.
    V1 = 1,
    /// Current format: the blob includes every checkpoint.
    V2 = 2,
}

impl Version {
    pub(crate) fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(Version::V1),
            2 => Some(Version::V2),
            _ => None,
        }
    }
}

/// One access point into the gzip stream.
#[derive(Clone)]
pub struct Checkpoint {
    /// Byte offset in the compressed stream of the first *full* byte that
    /// follows this access point's bit boundary.
    pub in_off: i64,
    /// Corresponding offset in the uncompressed stream.
    pub out_off: i64,
    /// Number of residual bits (0-7) of the byte at `in_off - 1`. If
    /// nonzero, the low `bits` bits of that byte are the initial bits of the
    /// next deflate symbol.
    pub bits: u8,
    /// The 32 KiB of uncompressed data immediately preceding `out_off`,
    /// used to seed the LZ77 dictionary on resume. Boxed to keep
    /// `Checkpoint` itself cheap to move; the array is always fully
    /// populated (zero-padded on the left for the origin checkpoint).
    pub window: Box<[u8; WINSIZE]>,
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("in_off", &self.in_off)
            .field("out_off", &self.out_off)
            .field("bits", &format_args!("0b{:03b}", self.bits))
            .finish()
    }
}

/// An ordered sequence of checkpoints into one gzip stream.
///
/// Logically immutable after construction: the builder may reallocate
/// during growth, but externalizes a finalized, right-sized structure.
/// Extraction borrows an `Index` read-only.
#[derive(Debug)]
pub struct Index {
    pub(crate) checkpoints: Vec<Checkpoint>,
    /// The approximate uncompressed spacing, in bytes, requested at build
    /// time between consecutive checkpoints.
    pub span: i64,
    pub(crate) version: Version,
}

impl Index {
    pub(crate) fn new(checkpoints: Vec<Checkpoint>, span: i64, version: Version) -> Self {
        Index {
            checkpoints,
            span,
            version,
        }
    }

    /// The version this index will serialize as.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of populated checkpoints. Always `>= 1` for a well-formed
    /// index.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// The id of the last checkpoint (`checkpoint_count() - 1`).
    pub fn max_span_id(&self) -> i64 {
        self.checkpoints.len() as i64 - 1
    }

    /// The checkpoint whose span covers `off`: the largest id `i` such that
    /// `checkpoints[i].out_off <= off` (or the last checkpoint, if `off` is
    /// beyond the final one).
    ///
    /// Equivalent to the reference implementation's linear scan
    /// (`while list[i+1].out_off <= off: i += 1`), substituted here for a
    /// binary search since both produce the same result ordering.
    pub fn checkpoint_for_offset(&self, off: i64) -> usize {
        debug_assert!(!self.checkpoints.is_empty());
        let idx = self
            .checkpoints
            .partition_point(|cp| cp.out_off <= off);
        idx.saturating_sub(1)
    }

    /// The checkpoint's compressed-stream offset.
    pub fn comp_off(&self, checkpoint: usize) -> i64 {
        self.checkpoints[checkpoint].in_off
    }

    /// The checkpoint's uncompressed-stream offset.
    pub fn ucomp_off(&self, checkpoint: usize) -> i64 {
        self.checkpoints[checkpoint].out_off
    }

    /// Whether the checkpoint starts mid-byte (has residual bits to prime).
    pub fn has_bits(&self, checkpoint: usize) -> bool {
        self.checkpoints
            .get(checkpoint)
            .map(|cp| cp.bits != 0)
            .unwrap_or(false)
    }

    /// Direct access to a checkpoint by id.
    pub fn checkpoint(&self, id: usize) -> &Checkpoint {
        &self.checkpoints[id]
    }

    /// All checkpoints, in ascending offset order.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn index_with_offsets(offsets: &[i64]) -> Index {
        let checkpoints = offsets
            .iter()
            .enumerate()
            .map(|(i, &out_off)| Checkpoint {
                in_off: i as i64,
                out_off,
                bits: 0,
                window: Box::new([0u8; WINSIZE]),
            })
            .collect();
        Index::new(checkpoints, 4096, Version::V2)
    }

    #[test]
    fn checkpoint_for_offset_picks_covering_span() {
        let index = index_with_offsets(&[0, 100, 200, 300]);
        assert_eq!(index.checkpoint_for_offset(0), 0);
        assert_eq!(index.checkpoint_for_offset(50), 0);
        assert_eq!(index.checkpoint_for_offset(100), 1);
        assert_eq!(index.checkpoint_for_offset(199), 1);
        assert_eq!(index.checkpoint_for_offset(300), 3);
        assert_eq!(index.checkpoint_for_offset(10_000), 3);
    }

    #[test]
    fn max_span_id_and_count() {
        let index = index_with_offsets(&[0, 100, 200]);
        assert_eq!(index.checkpoint_count(), 3);
        assert_eq!(index.max_span_id(), 2);
    }
}

//! A random-access index over gzip-compressed streams.
//!
//! Gzip (and the raw DEFLATE it wraps) is a sequential format: decoding byte
//! `N` of the uncompressed stream ordinarily means replaying everything
//! before it. This crate builds a sparse set of [`Checkpoint`]s — access
//! points at deflate block boundaries, each carrying the 32 KiB LZ77
//! dictionary in effect at that point — so that [`extract::extract_from_path`]
//! can resume decoding from the nearest preceding checkpoint instead of the
//! start of the stream. [`blob`] (de)serializes an [`Index`] to a compact,
//! versioned binary form so it can be cached alongside the compressed file
//! it describes.
//!
//! ```no_run
//! use zinfo::{blob, builder, extract};
//!
//! let index = builder::build_from_path("archive.tar.gz", 1 << 20)?;
//! let packed = blob::to_blob(&index);
//!
//! let restored = blob::from_blob(&packed).expect("valid blob");
//! let mut out = [0u8; 4096];
//! let n = extract::extract_from_path("archive.tar.gz", &restored, 10 * (1 << 20), &mut out)?;
//! # Ok::<(), zinfo::Error>(())
//! ```

pub mod blob;
pub mod builder;
pub mod checkpoint;
pub mod error;
pub mod extract;
pub mod inflate;

pub use blob::{blob_size, encode_into, from_blob, to_blob};
pub use builder::{build_from_path, build_from_stream, IndexBuilder};
pub use checkpoint::{Checkpoint, Index, Version, WINSIZE};
pub use error::{Error, Result};
pub use extract::{extract_from_buffer, extract_from_path};

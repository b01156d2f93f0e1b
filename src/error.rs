//! Error types surfaced by the zinfo core.
//!
//! Mirrors the four failure kinds of the gzip zinfo contract (input-source
//! errors, corruption/protocol errors, resource exhaustion, programmer
//! error) as a single `thiserror`-derived enum, plus a stable `code()` for
//! callers that still speak in the original negative-integer contract.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable negative error codes from the zinfo operational contract.
pub mod codes {
    /// Success.
    pub const OK: i32 = 0;
    /// The compressed source file could not be opened.
    pub const FILE_NOT_FOUND: i32 = -80;
    /// A null/absent index was passed where one was required.
    pub const NULL_INDEX: i32 = -81;
    /// Allocation failed while building or extending an index.
    pub const CANNOT_ALLOC: i32 = -82;
}

/// Errors produced while building, serializing, or extracting a zinfo index.
#[derive(Debug, Error)]
pub enum Error {
    /// The compressed source file could not be opened.
    #[error("{path}: {source}")]
    FileNotFound {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// General I/O failure reading or seeking the compressed source.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The underlying inflater reported a non-recoverable zlib status.
    #[error("zlib error ({code}): {message}")]
    Inflate {
        /// Raw zlib status code.
        code: i32,
        /// zlib's own diagnostic message, if it supplied one.
        message: String,
    },

    /// The compressed stream is truncated or otherwise malformed.
    #[error("corrupt or truncated gzip stream")]
    DataError,

    /// zlib requested a preset dictionary after one was already supplied.
    ///
    /// This is treated as corruption in this system: raw-mode extraction
    /// always supplies the checkpoint's window up front, so a mid-stream
    /// request for one more is unexpected.
    #[error("unexpected request for a preset dictionary")]
    NeedDict,
}

/// Specialized `Result` for zinfo operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    /// Unwraps an [`Error`] that was itself carried inside an [`io::Error`]
    /// (as happens when [`crate::builder::IndexBuilder`] is driven through
    /// its [`std::io::Read`] impl, whose signature can only return
    /// `io::Result`), rather than double-wrapping it into a generic `Io`.
    fn from(err: io::Error) -> Self {
        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(inner) => Error::Io(io::Error::new(kind, inner)),
            },
            None => Error::Io(io::Error::from(kind)),
        }
    }
}

impl Error {
    /// The stable negative code for this error, for callers bound to the
    /// original C-style contract. Errors with no analogue in that contract
    /// (I/O failures mid-stream, inflate errors) surface their own
    /// engine-specific negative code instead; callers are only meant to
    /// distinguish these from the fixed codes by sign.
    pub fn code(&self) -> i32 {
        match self {
            Error::FileNotFound { .. } => codes::FILE_NOT_FOUND,
            Error::Io(_) => -1,
            Error::Inflate { code, .. } => *code,
            Error::DataError => libz_sys::Z_DATA_ERROR,
            Error::NeedDict => libz_sys::Z_DATA_ERROR,
        }
    }
}

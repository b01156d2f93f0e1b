// Based on the Soci Snapshotter's zinfo generator (`zinfo.rs`'s
// `GzipZInfoDecompressor`), generalized to the full checkpoint contract and
// corrected against the upstream C implementation's error handling
// (`gzip_zinfo.c`'s `generate_zinfo_from_fp`): a short read from the
// compressed source is corruption, not end-of-stream.

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

use std::cmp;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::checkpoint::{Checkpoint, Index, Version, WINSIZE};
use crate::error::{Error, Result};
use crate::inflate::{FlushMode, Inflater, Status};

const CHUNK: usize = 1 << 14;

/// Builds a finalized [`Index`] by scanning `path` once.
pub fn build_from_path<P: AsRef<Path>>(path: P, span: i64) -> Result<Index> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    build_from_stream(file, span)
}

/// Builds a finalized [`Index`] by scanning `reader` once, to completion.
///
/// `span` is the requested approximate uncompressed spacing between
/// consecutive checkpoints; `span == 0` places a checkpoint at every
/// non-terminal deflate block boundary.
pub fn build_from_stream<R: Read>(reader: R, span: i64) -> Result<Index> {
    let mut builder = IndexBuilder::new(reader, span)?;
    let mut sink = [0u8; CHUNK];
    loop {
        let read = builder.read(&mut sink)?;
        if read == 0 {
            break;
        }
    }
    Ok(builder.into_index())
}

/// A gzip decompressor that also records the checkpoints needed to build an
/// [`Index`]. Driving this as a [`Read`] yields the full decompressed
/// stream; the index is only complete once the stream has been read to EOF.
pub struct IndexBuilder<R> {
    reader: R,
    inflater: Inflater,

    checkpoints: Vec<Checkpoint>,
    span: i64,
    total_in: i64,
    total_out: i64,
    last_checkpoint_out: i64,
    /// Set once `inflate()` has reported `Status::StreamEnd`. Once finished,
    /// `read` must not touch `reader` again: zlib has already consumed
    /// exactly the compressed bytes belonging to this member, so a further
    /// `reader.read()` call observes true EOF of an already-fully-read
    /// source, not a truncated one.
    finished: bool,

    window: RingBuffer<u8, WINSIZE>,
    input: [u8; CHUNK],
}

impl<R: Read> IndexBuilder<R> {
    /// Creates a new builder. `span` is the requested checkpoint spacing.
    pub fn new(reader: R, span: i64) -> Result<Self> {
        Ok(Self {
            reader,
            inflater: Inflater::new_auto()?,
            checkpoints: Vec::new(),
            span,
            total_in: 0,
            total_out: 0,
            last_checkpoint_out: 0,
            finished: false,
            window: RingBuffer::new(),
            input: [0u8; CHUNK],
        })
    }

    /// Consumes the builder and returns the finalized index. Should only be
    /// called after the stream has been fully read (`read` returned `0`).
    pub fn into_index(self) -> Index {
        let mut checkpoints = self.checkpoints;
        checkpoints.shrink_to_fit();
        Index::new(checkpoints, self.span, Version::V2)
    }

    fn emit_checkpoint(&mut self) {
        let bits = self.inflater.residual_bits();
        let mut window = Box::new([0u8; WINSIZE]);
        let (left, right) = self.window.read();
        window[..left.len()].copy_from_slice(left);
        window[left.len()..].copy_from_slice(right);

        self.checkpoints.push(Checkpoint {
            in_off: self.total_in,
            out_off: self.total_out,
            bits,
            window,
        });
        self.last_checkpoint_out = self.total_out;
    }
}

impl<R: Read> Read for IndexBuilder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }

        unsafe {
            self.inflater.set_output(buf);
        }
        let mut read = 0;

        while self.inflater.available_out() > 0 {
            if self.inflater.available_in() == 0 {
                let count = self.reader.read(&mut self.input)?;
                if count == 0 {
                    // A short read here means the stream ended before zlib
                    // saw Z_STREAM_END: the compressed data is truncated.
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        Error::DataError,
                    ));
                }
                unsafe {
                    self.inflater.set_input(&self.input[..count]);
                }
            }

            let last_read = read;
            self.total_in += self.inflater.available_in() as i64;
            self.total_out += self.inflater.available_out() as i64;
            let status = self
                .inflater
                .inflate(FlushMode::Block)
                .map_err(to_io_error)?;
            self.total_in -= self.inflater.available_in() as i64;
            self.total_out -= self.inflater.available_out() as i64;
            let delivered = buf.len() - self.inflater.available_out() as usize;
            read = delivered;

            // Copy the freshly decoded bytes into the sliding window.
            self.window.write(&buf[last_read..delivered]);

            if status == Status::StreamEnd {
                self.finished = true;
                return Ok(read);
            }

            if self.inflater.at_block_end()
                && !self.inflater.is_last_block()
                && (self.total_out == 0 || self.total_out - self.last_checkpoint_out > self.span)
            {
                self.emit_checkpoint();
            }
        }

        Ok(read)
    }
}

fn to_io_error(err: Error) -> io::Error {
    match err {
        Error::DataError => io::Error::new(io::ErrorKind::InvalidData, err),
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// A fixed-size ring buffer. Writes are pushed onto the back of the buffer.
pub(crate) struct RingBuffer<T, const N: usize> {
    buffer: [T; N],
    index: usize,
}

impl<T, const N: usize> RingBuffer<T, N>
where
    T: Copy + Default,
{
    fn new() -> Self {
        Self {
            buffer: [T::default(); N],
            index: 0,
        }
    }

    /// Writes the buffer to the back of the ring buffer.
    fn write(&mut self, mut buf: &[T]) {
        if buf.is_empty() {
            return;
        }

        if buf.len() > self.buffer.len() {
            buf = &buf[buf.len() - self.buffer.len()..];
        }

        while !buf.is_empty() {
            let size = cmp::min(buf.len(), self.buffer.len() - self.index);
            self.buffer[self.index..self.index + size].copy_from_slice(&buf[..size]);
            buf = &buf[size..];
            self.index = (self.index + size) % self.buffer.len();
        }
    }

    /// Gets the contents of the ring buffer. The underlying storage may be
    /// non-contiguous, so two slices are returned instead. The left slice is
    /// the front (oldest) and the right slice is the back (newest).
    fn read(&self) -> (&[T], &[T]) {
        (&self.buffer[self.index..], &self.buffer[..self.index])
    }
}

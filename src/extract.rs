// Ported from the upstream C implementation's extraction routines
// (`gzip_zinfo.c`'s `extract_data_from_fp` and `extract_data_from_buffer`).
// Both C entry points share the same skip-then-fill loop; here that loop
// lives once in `resume_and_fill` and the file/buffer variants only differ
// in how they supply input bytes and how they locate the starting
// checkpoint.

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

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::checkpoint::{Index, WINSIZE};
use crate::error::{Error, Result};
use crate::inflate::{FlushMode, Inflater, Status};

const CHUNK: usize = 1 << 14;

/// Extracts `buf.len()` uncompressed bytes starting at `offset` from the
/// gzip stream at `path`, using `index` to resume decoding at the nearest
/// covering checkpoint instead of the start of the file.
///
/// Returns the number of bytes actually written (`<= buf.len()`; fewer than
/// requested if `offset + buf.len()` runs past the end of the stream).
pub fn extract_from_path<P: AsRef<Path>>(
    path: P,
    index: &Index,
    offset: i64,
    buf: &mut [u8],
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| Error::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let checkpoint_id = index.checkpoint_for_offset(offset);
    let checkpoint = index.checkpoint(checkpoint_id);

    let seek_to = checkpoint.in_off - if checkpoint.bits != 0 { 1 } else { 0 };
    file.seek(SeekFrom::Start(seek_to as u64))?;

    let mut inflater = Inflater::new_raw()?;
    if checkpoint.bits != 0 {
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte)?;
        inflater.prime(checkpoint.bits as i32, (byte[0] as i32) >> (8 - checkpoint.bits))?;
    }
    inflater.set_dictionary(checkpoint.window.as_ref())?;

    let skip = offset - checkpoint.out_off;
    resume_and_fill(&mut inflater, skip, buf, |input| file.read(input))
}

/// Extracts `buf.len()` uncompressed bytes starting at `offset` from an
/// in-memory compressed buffer that is already known to cover the needed
/// range. `bytes` must begin exactly at `index.comp_off(first_checkpoint) -
/// (index.has_bits(first_checkpoint) ? 1 : 0)`: the leading byte is treated
/// as the priming byte when the checkpoint has residual bits, as in the
/// `extract_from_path` variant, but no scan over `index` happens here —
/// the caller supplies which checkpoint to resume from.
pub fn extract_from_buffer(
    bytes: &[u8],
    index: &Index,
    offset: i64,
    buf: &mut [u8],
    first_checkpoint: usize,
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let checkpoint = index.checkpoint(first_checkpoint);

    let mut cursor = bytes;
    let mut inflater = Inflater::new_raw()?;
    if checkpoint.bits != 0 {
        let byte = *cursor.first().ok_or(Error::DataError)?;
        inflater.prime(checkpoint.bits as i32, (byte as i32) >> (8 - checkpoint.bits))?;
        cursor = &cursor[1..];
    }
    inflater.set_dictionary(checkpoint.window.as_ref())?;

    let skip = offset - checkpoint.out_off;
    resume_and_fill(&mut inflater, skip, buf, |input| {
        let take = cursor.len().min(input.len());
        input[..take].copy_from_slice(&cursor[..take]);
        cursor = &cursor[take..];
        Ok(take)
    })
}

/// The shared resume protocol: discard `skip` uncompressed bytes (in chunks
/// of at most `WINSIZE`), then fill `out` with up to `out.len()` more bytes,
/// pulling fresh compressed input from `next_input` as needed. `next_input`
/// fills the buffer it is given and returns the number of bytes written,
/// `0` meaning end of compressed input (matching `Read::read`'s contract).
fn resume_and_fill(
    inflater: &mut Inflater,
    mut skip: i64,
    out: &mut [u8],
    mut next_input: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
) -> Result<usize> {
    let mut input = [0u8; CHUNK];
    let mut discard = [0u8; WINSIZE];
    let mut reached_offset = false;
    let mut written = 0usize;

    loop {
        let (dst, want): (&mut [u8], usize) = if skip == 0 {
            reached_offset = true;
            (out, out.len())
        } else if skip as usize > WINSIZE {
            skip -= WINSIZE as i64;
            (&mut discard[..], WINSIZE)
        } else {
            let n = skip as usize;
            skip = 0;
            (&mut discard[..n], n)
        };

        unsafe {
            inflater.set_output(dst);
        }

        let status = loop {
            if inflater.available_in() == 0 {
                let count = next_input(&mut input)?;
                if count == 0 {
                    return Err(Error::DataError);
                }
                unsafe {
                    inflater.set_input(&input[..count]);
                }
            }
            let status = inflater.inflate(FlushMode::NoFlush)?;
            if status == Status::StreamEnd || inflater.available_out() == 0 {
                break status;
            }
        };

        if reached_offset {
            written = want - inflater.available_out() as usize;
        }

        if status == Status::StreamEnd {
            break;
        }
        if reached_offset {
            break;
        }
    }

    Ok(written)
}

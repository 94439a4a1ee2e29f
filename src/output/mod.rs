// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Getting samples to the speakers and back from a microphone.

pub mod sox;

pub use sox::{Device, InputStream, OutputStream};

use std::io;

/// Number of bytes handed to an audio device at once.
pub const CHUNK_BYTES: usize = 6400;

/// Write `bytes` in pieces of at most [`CHUNK_BYTES`].
///
/// Returns the number of chunks that were written.
pub fn write_chunked<W: io::Write + ?Sized>(out: &mut W, bytes: &[u8]) -> io::Result<usize> {
    let mut chunks = 0;
    for chunk in bytes.chunks(CHUNK_BYTES) {
        out.write_all(chunk)?;
        chunks += 1;
    }
    out.flush()?;
    Ok(chunks)
}

//! Bounded-buffer streaming copy into whatever sink a storage tier hands out.
//!
//! Notes:
//! - A tier returns an `OutputStream`: a plain `File` for direct writes, or a boxed
//!   writer for provider-backed tiers (document tree, media index).
//! - `finish` flushes and, for files under `DurabilityMode::Full`, forces data to disk.
//! - The source is read once from start to EOF; concurrent growth is not picked up.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Buffer size used for streaming copies.
pub const COPY_BUF_SIZE: usize = 64 * 1024;

/// Durability mode controlling post-write flush behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Flush into the OS page cache only.
    Data,
    /// Flush, then `sync_all` when the sink is a real file.
    Full,
}

/// Write side handed out by a storage tier.
pub enum OutputStream {
    File(File),
    Stream(Box<dyn Write + Send>),
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::File(file) => f.debug_tuple("File").field(file).finish(),
            OutputStream::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::File(f) => f.write(buf),
            OutputStream::Stream(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::File(f) => f.flush(),
            OutputStream::Stream(w) => w.flush(),
        }
    }
}

impl OutputStream {
    /// Flush, optionally sync, and close the stream.
    pub fn finish(mut self, mode: DurabilityMode) -> io::Result<()> {
        self.flush()?;
        if let (OutputStream::File(f), DurabilityMode::Full) = (&self, mode) {
            f.sync_all()?;
        }
        Ok(())
    }
}

/// Result of a streaming copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyResult {
    pub bytes: u64,
    pub mode: DurabilityMode,
}

/// Copy `src` into `out` with a fixed-size buffer, then finish the sink.
pub fn copy_into(src: &Path, out: OutputStream, mode: DurabilityMode) -> io::Result<CopyResult> {
    let reader = File::open(src)?;
    copy_reader_into(reader, out, mode)
}

/// Same as `copy_into` for an already opened reader.
pub fn copy_reader_into<R: Read>(
    reader: R,
    mut out: OutputStream,
    mode: DurabilityMode,
) -> io::Result<CopyResult> {
    let mut reader = BufReader::with_capacity(COPY_BUF_SIZE, reader);
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut bytes: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        bytes += n as u64;
    }
    out.finish(mode)?;
    Ok(CopyResult { bytes, mode })
}

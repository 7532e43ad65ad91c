// Output sinks for the reconstruction loop.
//
// Bytes are only ever appended. The patcher asks for a region, fills it, and
// calls `commit` once a control triple is complete.

use std::io::{self, Write};

/// Append-only destination for reconstructed bytes.
pub trait OutputSink {
    /// Append `len` zeroed bytes and return them for the caller to fill.
    fn chunk(&mut self, len: usize) -> &mut [u8];

    /// Mark the end of a control triple.
    fn commit(&mut self) -> io::Result<()>;
}

/// In-memory output; the whole new file accumulates here.
impl OutputSink for Vec<u8> {
    fn chunk(&mut self, len: usize) -> &mut [u8] {
        let start = self.len();
        self.resize(start + len, 0);
        &mut self[start..]
    }

    fn commit(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StreamSink
// ---------------------------------------------------------------------------

/// Writes each completed triple to `W` and flushes it.
///
/// Only one triple's bytes are held at a time. Bytes from a triple that
/// fails midway are never written.
pub struct StreamSink<W: Write> {
    writer: W,
    pending: Vec<u8>,
    bytes_written: u64,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending: Vec::new(),
            bytes_written: 0,
        }
    }

    /// Bytes handed to the writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Consume the sink, returning the writer. Uncommitted bytes are dropped.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for StreamSink<W> {
    fn chunk(&mut self, len: usize) -> &mut [u8] {
        let start = self.pending.len();
        self.pending.resize(start + len, 0);
        &mut self.pending[start..]
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.writer.write_all(&self.pending)?;
            self.bytes_written += self.pending.len() as u64;
            self.pending.clear();
        }
        self.writer.flush()
    }
}

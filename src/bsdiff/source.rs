// Old-file byte sources.
//
// The reconstruction loop only needs random-access reads at the old-file
// cursor. `&[u8]` serves the fully-buffered strategy with zero-copy slices;
// `SeekSource` serves the low-memory strategy by seeking a reader.

use std::io::{self, Read, Seek, SeekFrom};

use super::read_full;

/// Random-access view of the old file.
pub trait OldSource {
    /// Total size of the old file in bytes.
    fn size(&self) -> u64;

    /// Read bytes starting at absolute `offset` into `buf`.
    /// Returns the number of bytes actually read.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Direct slice access for in-memory sources.
    ///
    /// Returns `Some` only when `[offset..offset + len]` is available as one
    /// contiguous slice; the patcher then skips its copy buffer.
    fn slice_at(&self, _offset: u64, _len: usize) -> Option<&[u8]> {
        None
    }
}

/// In-memory old file.
impl OldSource for &[u8] {
    fn size(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        let available = self.get(offset..).unwrap_or_default();
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn slice_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        self.get(start..start.checked_add(len)?)
    }
}

// ---------------------------------------------------------------------------
// SeekSource
// ---------------------------------------------------------------------------

/// Old file backed by a seekable reader; nothing is buffered beyond what the
/// caller asks for.
///
/// The current position is tracked so consecutive reads (the common case
/// when a triple's seek is zero) skip the `seek` call.
pub struct SeekSource<R> {
    reader: R,
    size: u64,
    pos: u64,
}

impl<R: Read + Seek> SeekSource<R> {
    /// Wrap `reader`, measuring its length by seeking to the end.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            size,
            pos: 0,
        })
    }

    /// Wrap `reader` with a length already known to the caller (e.g. from
    /// file metadata). The reader must be positioned at offset 0.
    pub fn with_size(reader: R, size: u64) -> Self {
        Self {
            reader,
            size,
            pos: 0,
        }
    }

    /// Consume the source, returning the wrapped reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> OldSource for SeekSource<R> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset != self.pos {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        let n = read_full(&mut self.reader, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

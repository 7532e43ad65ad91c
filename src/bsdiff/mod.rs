// BSDIFF40 patch format (apply side).
//
// # Modules
//
// - `offtin`  — Signed-magnitude 64-bit integers used throughout the format
// - `header`  — 32-byte file header and stream segment ranges
// - `control` — Control triple decoding from the control stream
// - `source`  — Old-file byte sources (in-memory slice, seekable reader)
// - `sink`    — Output sinks (in-memory buffer, streaming writer)
// - `patcher` — The reconstruction loop and its error taxonomy

pub mod control;
pub mod header;
pub mod offtin;
pub mod patcher;
pub mod sink;
pub mod source;

// Re-export key types for convenience.
pub use control::{ControlReader, ControlTriple};
pub use header::{FormatError, MAGIC, PatchHeader, Segments};
pub use patcher::{CorruptPatch, PatchError, Patcher};
pub use sink::{OutputSink, StreamSink};
pub use source::{OldSource, SeekSource};

use std::io::{self, Read};

/// Read until `buf` is full or the reader is exhausted.
///
/// Returns the number of bytes read. A decompressor that hits the end of
/// its input mid-stream reports `UnexpectedEof`; that is treated as plain
/// exhaustion so callers see a short count instead of an I/O failure.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn read_full_collects_short_reads() {
        let mut r = Trickle {
            data: b"abcdefgh",
            step: 3,
        };
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut r, &mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn read_full_reports_exhaustion() {
        let mut r: &[u8] = b"abc";
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut r, &mut buf).unwrap(), 3);
    }

    #[test]
    fn read_full_treats_unexpected_eof_as_short() {
        struct Truncated;
        impl Read for Truncated {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated"))
            }
        }
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut Truncated, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_full_propagates_other_errors() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::InvalidData, "bad block"))
            }
        }
        let mut buf = [0u8; 4];
        assert!(read_full(&mut Broken, &mut buf).is_err());
    }
}

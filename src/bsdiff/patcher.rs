// BSDIFF40 reconstruction loop.
//
// For each control triple (diff, extra, seek):
//   1. diff bytes:  new[i] = diff[i] + old[old_pos + i]   (mod 256, only where
//                   old_pos + i lies inside the old file; otherwise diff[i])
//   2. extra bytes: copied verbatim from the extra stream
//   3. old_pos += seek
//
// The loop is written once against `OldSource` and `OutputSink`; the
// low-memory and in-memory strategies differ only in which implementations
// they pass in.
//
// Diff and extra runs are processed in blocks of at most `BLOCK_SIZE`, so a
// crafted count never allocates more than the streams can actually supply.

use std::io::{self, Read};
use std::ops::Range;

use log::trace;
use thiserror::Error;

use super::control::{ControlReader, ControlTriple};
use super::header::FormatError;
use super::read_full;
use super::sink::OutputSink;
use super::source::OldSource;

/// Largest diff/extra block handled in one step.
pub const BLOCK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The patch header was valid but the stream contents are not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptPatch {
    #[error("control stream ended inside triple {triple} ({got} of 24 bytes)")]
    ControlUnderrun { triple: u64, got: usize },

    #[error("diff stream ended early at output offset {new_pos} ({missing} bytes missing)")]
    DiffUnderrun { new_pos: u64, missing: u64 },

    #[error("extra stream ended early at output offset {new_pos} ({missing} bytes missing)")]
    ExtraUnderrun { new_pos: u64, missing: u64 },

    #[error("old file returned {got} of {wanted} bytes at offset {offset}")]
    OldFileUnderrun {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    #[error("triple {triple} writes {len} bytes at offset {new_pos}, past new size {new_size}")]
    Overrun {
        triple: u64,
        new_pos: u64,
        len: u64,
        new_size: u64,
    },

    #[error("triple {triple} has a negative count (diff {diff}, extra {extra})")]
    NegativeCount { triple: u64, diff: i64, extra: i64 },

    #[error("old-file cursor overflows in triple {triple}")]
    CursorOverflow { triple: u64 },
}

/// Any failure while applying a patch.
///
/// I/O failures are split by origin so callers can tell a bad patch from a
/// bad old file from a full disk.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("corrupt patch: {0}")]
    Corrupt(#[from] CorruptPatch),

    #[error("old file of {old_size} bytes has no comment field for ext_len {ext_len}")]
    CommentOffset { old_size: u64, ext_len: u64 },

    #[error("patch stream decompression failed: {0}")]
    Decompress(#[source] io::Error),

    #[error("old file read failed: {0}")]
    OldRead(#[source] io::Error),

    #[error("output write failed: {0}")]
    Write(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Patcher
// ---------------------------------------------------------------------------

/// Drives reconstruction from three decompressed streams.
///
/// One `Patcher` serves a single apply call; cursors and working buffers
/// live and die with it.
pub struct Patcher<C, D, E> {
    control: ControlReader<C>,
    diff: D,
    extra: E,
    new_size: u64,
    new_pos: u64,
    old_pos: i64,
    /// Absolute old-file offset whose two bytes read as zero.
    comment_zero: Option<u64>,
    /// Copy buffer for old sources without slice access.
    old_buf: Vec<u8>,
}

impl<C: Read, D: Read, E: Read> Patcher<C, D, E> {
    /// Create a patcher producing exactly `new_size` bytes.
    pub fn new(control: C, diff: D, extra: E, new_size: u64) -> Self {
        Self {
            control: ControlReader::new(control),
            diff,
            extra,
            new_size,
            new_pos: 0,
            old_pos: 0,
            comment_zero: None,
            old_buf: Vec::new(),
        }
    }

    /// Treat the old-file bytes at `offset` and `offset + 1` as zero when a
    /// diff run that starts covering `offset` reaches them.
    pub fn with_comment_zero(mut self, offset: Option<u64>) -> Self {
        self.comment_zero = offset;
        self
    }

    /// Bytes produced so far.
    pub fn new_pos(&self) -> u64 {
        self.new_pos
    }

    /// Current old-file cursor (may be negative or past the end).
    pub fn old_pos(&self) -> i64 {
        self.old_pos
    }

    /// Complete triples consumed so far.
    pub fn triples(&self) -> u64 {
        self.control.triples_read()
    }

    /// Run to completion. Returns the number of triples applied.
    pub fn run<O, S>(&mut self, old: &mut O, sink: &mut S) -> Result<u64, PatchError>
    where
        O: OldSource + ?Sized,
        S: OutputSink + ?Sized,
    {
        while self.new_pos < self.new_size {
            self.step(old, sink)?;
        }
        Ok(self.control.triples_read())
    }

    /// Apply a single control triple.
    pub fn step<O, S>(&mut self, old: &mut O, sink: &mut S) -> Result<ControlTriple, PatchError>
    where
        O: OldSource + ?Sized,
        S: OutputSink + ?Sized,
    {
        let index = self.control.triples_read();
        let triple = self.control.read_triple()?;
        trace!(
            "triple {index}: diff={} extra={} seek={} new_pos={} old_pos={}",
            triple.diff, triple.extra, triple.seek, self.new_pos, self.old_pos
        );

        let (diff_len, extra_len) = triple.counts().ok_or(CorruptPatch::NegativeCount {
            triple: index,
            diff: triple.diff,
            extra: triple.extra,
        })?;

        self.check_room(index, diff_len)?;
        self.apply_diff(index, diff_len, old, sink)?;

        self.check_room(index, extra_len)?;
        self.copy_extra(extra_len, sink)?;

        self.old_pos = self
            .old_pos
            .checked_add(triple.seek)
            .ok_or(CorruptPatch::CursorOverflow { triple: index })?;

        sink.commit().map_err(PatchError::Write)?;
        Ok(triple)
    }

    fn check_room(&self, triple: u64, len: u64) -> Result<(), CorruptPatch> {
        match self.new_pos.checked_add(len) {
            Some(end) if end <= self.new_size => Ok(()),
            _ => Err(CorruptPatch::Overrun {
                triple,
                new_pos: self.new_pos,
                len,
                new_size: self.new_size,
            }),
        }
    }

    fn apply_diff<O, S>(
        &mut self,
        triple: u64,
        len: u64,
        old: &mut O,
        sink: &mut S,
    ) -> Result<(), PatchError>
    where
        O: OldSource + ?Sized,
        S: OutputSink + ?Sized,
    {
        // `len` came from a non-negative i64.
        let window_start = i128::from(self.old_pos);
        let window_end = window_start + i128::from(len);
        let zeroed = self
            .comment_zero
            .map(i128::from)
            .filter(|z| (window_start..window_end).contains(z))
            .map(|z| z..(z + 2).min(window_end));

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE as u64) as usize;
            let out = sink.chunk(n);

            let got = read_full(&mut self.diff, out).map_err(PatchError::Decompress)?;
            if got < n {
                return Err(CorruptPatch::DiffUnderrun {
                    new_pos: self.new_pos + got as u64,
                    missing: remaining - got as u64,
                }
                .into());
            }

            add_old(old, self.old_pos, out, zeroed.clone(), &mut self.old_buf)?;

            self.new_pos += n as u64;
            self.old_pos = self
                .old_pos
                .checked_add(n as i64)
                .ok_or(CorruptPatch::CursorOverflow { triple })?;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn copy_extra<S>(&mut self, len: u64, sink: &mut S) -> Result<(), PatchError>
    where
        S: OutputSink + ?Sized,
    {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE as u64) as usize;
            let out = sink.chunk(n);

            let got = read_full(&mut self.extra, out).map_err(PatchError::Decompress)?;
            if got < n {
                return Err(CorruptPatch::ExtraUnderrun {
                    new_pos: self.new_pos + got as u64,
                    missing: remaining - got as u64,
                }
                .into());
            }

            self.new_pos += n as u64;
            remaining -= n as u64;
        }
        Ok(())
    }
}

/// Add old-file bytes onto the diff bytes in `out`, which correspond to old
/// offsets `[old_pos, old_pos + out.len())`. Offsets outside the old file and
/// offsets in `zeroed` leave the diff byte as is.
fn add_old<O: OldSource + ?Sized>(
    old: &mut O,
    old_pos: i64,
    out: &mut [u8],
    zeroed: Option<Range<i128>>,
    scratch: &mut Vec<u8>,
) -> Result<(), PatchError> {
    let block_start = i128::from(old_pos);
    let lo = block_start.max(0);
    let hi = (block_start + out.len() as i128).min(i128::from(old.size()));
    if lo >= hi {
        return Ok(());
    }

    // Both bounds lie in [0, old size], and the span fits in `out`.
    let offset = lo as u64;
    let count = (hi - lo) as usize;
    let skip = (lo - block_start) as usize;

    if old.slice_at(offset, count).is_none() {
        scratch.resize(count, 0);
        let got = old
            .read_at(offset, &mut scratch[..count])
            .map_err(PatchError::OldRead)?;
        if got < count {
            return Err(CorruptPatch::OldFileUnderrun {
                offset,
                wanted: count,
                got,
            }
            .into());
        }
    }
    let old_bytes = match old.slice_at(offset, count) {
        Some(slice) => slice,
        None => &scratch[..count],
    };

    for (i, (dst, &src)) in out[skip..skip + count].iter_mut().zip(old_bytes).enumerate() {
        if let Some(z) = &zeroed
            && z.contains(&(lo + i as i128))
        {
            continue;
        }
        *dst = dst.wrapping_add(src);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

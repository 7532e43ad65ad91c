// Patch front ends for the two resource strategies.
//
//   - Streaming: old file read through a seekable reader, output written and
//     flushed triple by triple. Memory ~ patch size + one triple.
//   - Buffered:  old file, patch and new file all in memory; output returned
//     only once reconstruction succeeds. Memory ~ old + patch + new.
//
// Both run the same `Patcher` loop and produce identical bytes.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::str::FromStr;

use log::debug;

use crate::bsdiff::header::PatchHeader;
use crate::bsdiff::patcher::{PatchError, Patcher};
use crate::bsdiff::sink::{OutputSink, StreamSink};
use crate::bsdiff::source::{OldSource, SeekSource};

use super::segment::{self, SegmentCodec, SegmentDecompressor};

/// Cap on the up-front output reservation for the buffered strategy; the
/// header's size is not trusted beyond this until data backs it.
const MAX_PREALLOC: u64 = 1 << 24; // 16 MiB

/// Old files at or below this size have no room for a comment field.
const MIN_COMMENT_OFFSET: u64 = 2;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which memory strategy to apply a patch with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Seek the old file, write output incrementally.
    #[default]
    Streaming,
    /// Hold everything in memory, write output at the end.
    Buffered,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "streaming" | "less-memory" => Ok(Self::Streaming),
            "buffered" | "fast" => Ok(Self::Buffered),
            _ => Err(format!("unknown strategy '{s}'")),
        }
    }
}

/// Configuration shared by both strategies.
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Length of trailing data after the old file's 2-byte comment-length
    /// field. When set, that field (at `old_size - ext_len - 2`) reads as
    /// zero during diff combination.
    pub ext_len: Option<u64>,
    /// Codec of the three patch streams.
    pub codec: SegmentCodec,
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSummary {
    pub header: PatchHeader,
    /// Control triples applied.
    pub triples: u64,
}

/// Result of the buffered strategy.
#[derive(Debug, Clone)]
pub struct Patched {
    pub data: Vec<u8>,
    pub summary: PatchSummary,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Apply `patch` to an in-memory old file and return the new file.
pub fn patch_buffered(old: &[u8], patch: &[u8], opts: &PatchOptions) -> Result<Vec<u8>, PatchError> {
    apply_buffered(old, patch, opts).map(|p| p.data)
}

/// Like `patch_buffered`, also reporting the header and triple count.
pub fn apply_buffered(old: &[u8], patch: &[u8], opts: &PatchOptions) -> Result<Patched, PatchError> {
    let header = PatchHeader::parse(patch)?;
    let mut data = Vec::with_capacity(header.new_size.min(MAX_PREALLOC) as usize);
    let mut src = old;
    let summary = patch_with(&mut src, patch, &mut data, &opts.codec, opts.ext_len)?;
    Ok(Patched { data, summary })
}

/// Apply `patch` to a seekable old file, streaming the new file to `writer`.
///
/// On error, `writer` holds every triple completed before the failure and
/// must be discarded by the caller.
pub fn patch_streaming<R, W>(
    old: R,
    patch: &[u8],
    writer: W,
    opts: &PatchOptions,
) -> Result<PatchSummary, PatchError>
where
    R: Read + Seek,
    W: Write,
{
    let mut src = SeekSource::new(old).map_err(PatchError::OldRead)?;
    let mut sink = StreamSink::new(writer);
    patch_with(&mut src, patch, &mut sink, &opts.codec, opts.ext_len)
}

/// Apply `patch` using caller-supplied capabilities.
///
/// This is the single code path behind both strategies.
pub fn patch_with<O, S>(
    old: &mut O,
    patch: &[u8],
    sink: &mut S,
    decompressor: &dyn SegmentDecompressor,
    ext_len: Option<u64>,
) -> Result<PatchSummary, PatchError>
where
    O: OldSource + ?Sized,
    S: OutputSink + ?Sized,
{
    let (header, segments) = segment::locate(patch)?;
    debug!(
        "patch header: control={} diff={} extra={} new_size={}",
        header.control_len,
        header.diff_len,
        segments.extra.len(),
        header.new_size
    );

    let comment_zero = ext_len
        .map(|ext| comment_zero_offset(old.size(), ext))
        .transpose()?;

    let streams = segment::open_streams(decompressor, patch, &segments);
    let mut patcher = Patcher::new(streams.control, streams.diff, streams.extra, header.new_size)
        .with_comment_zero(comment_zero);
    let result = patcher.run(old, sink);
    if let Err(e) = &result {
        debug!(
            "stopped at new_pos={} old_pos={} after {} triples: {e}",
            patcher.new_pos(),
            patcher.old_pos(),
            patcher.triples()
        );
    }
    let triples = result?;

    debug!(
        "patched {} bytes from {} old bytes in {triples} triples",
        header.new_size,
        old.size()
    );
    Ok(PatchSummary { header, triples })
}

/// Absolute offset of the 2-byte comment-length field in an old file of
/// `old_size` bytes followed by `ext_len` bytes of trailing data.
pub fn comment_zero_offset(old_size: u64, ext_len: u64) -> Result<u64, PatchError> {
    old_size
        .checked_sub(ext_len)
        .and_then(|n| n.checked_sub(2))
        .filter(|&offset| offset > MIN_COMMENT_OFFSET)
        .ok_or(PatchError::CommentOffset { old_size, ext_len })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

// Segment decompression for the three BSDIFF40 streams.
//
// Provides a pluggable `SegmentDecompressor` trait with built-in codecs:
//   - Bzip2 (via bzip2; the codec BSDIFF40 prescribes)
//   - Gzip (via flate2, feature-gated `gzip-segments`; older JBSPatch-style
//     payloads carry gzip streams behind the same header)
//   - Raw (passthrough, for payloads whose streams are stored uncompressed)
//
// Every codec hands back a forward-only reader over one segment; the patcher
// never seeks within a stream.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use crate::bsdiff::header::{PatchHeader, Segments};

/// Opens a forward reader over one compressed segment.
///
/// # Implementing a custom decompressor
///
/// ```no_run
/// use std::io::Read;
/// use oxipatch::compress::segment::SegmentDecompressor;
///
/// struct Xor(u8);
///
/// impl SegmentDecompressor for Xor {
///     fn open<'a>(&self, segment: &'a [u8]) -> Box<dyn Read + 'a> {
///         let key = self.0;
///         let plain: Vec<u8> = segment.iter().map(|b| b ^ key).collect();
///         Box::new(std::io::Cursor::new(plain))
///     }
/// }
/// ```
pub trait SegmentDecompressor {
    /// Wrap `segment` in a reader yielding its decompressed bytes.
    ///
    /// Decompression errors surface on read, not here.
    fn open<'a>(&self, segment: &'a [u8]) -> Box<dyn Read + 'a>;
}

// ---------------------------------------------------------------------------
// Built-in codecs
// ---------------------------------------------------------------------------

/// Built-in segment codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentCodec {
    /// bzip2, as written by every bsdiff 4.x implementation.
    #[default]
    Bzip2,
    /// gzip streams.
    #[cfg(feature = "gzip-segments")]
    Gzip,
    /// Uncompressed streams.
    Raw,
}

impl SegmentCodec {
    /// Every codec compiled into this build.
    pub fn all() -> &'static [SegmentCodec] {
        &[
            Self::Bzip2,
            #[cfg(feature = "gzip-segments")]
            Self::Gzip,
            Self::Raw,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bzip2 => "bzip2",
            #[cfg(feature = "gzip-segments")]
            Self::Gzip => "gzip",
            Self::Raw => "raw",
        }
    }
}

impl fmt::Display for SegmentCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SegmentCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown segment codec '{s}'"))
    }
}

impl SegmentDecompressor for SegmentCodec {
    fn open<'a>(&self, segment: &'a [u8]) -> Box<dyn Read + 'a> {
        match self {
            Self::Bzip2 => Box::new(bzip2::read::BzDecoder::new(segment)),
            #[cfg(feature = "gzip-segments")]
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(segment)),
            Self::Raw => Box::new(segment),
        }
    }
}

// ---------------------------------------------------------------------------
// Opening all three streams
// ---------------------------------------------------------------------------

/// Decompressed control, diff and extra readers for one patch.
pub struct Streams<'a> {
    pub control: Box<dyn Read + 'a>,
    pub diff: Box<dyn Read + 'a>,
    pub extra: Box<dyn Read + 'a>,
}

/// Open one segment: `len` bytes at `offset`, or everything from `offset`
/// to the end when `len` is `None`. Returns `None` if the range falls
/// outside `payload`.
pub fn open_segment<'a>(
    decompressor: &dyn SegmentDecompressor,
    payload: &'a [u8],
    offset: usize,
    len: Option<usize>,
) -> Option<Box<dyn Read + 'a>> {
    let end = match len {
        Some(len) => offset.checked_add(len)?,
        None => payload.len(),
    };
    Some(decompressor.open(payload.get(offset..end)?))
}

/// Open the three streams of `payload` located by `segments`.
///
/// `segments` must come from `PatchHeader::segments` for this payload.
pub fn open_streams<'a>(
    decompressor: &dyn SegmentDecompressor,
    payload: &'a [u8],
    segments: &Segments,
) -> Streams<'a> {
    Streams {
        control: decompressor.open(&payload[segments.control.clone()]),
        diff: decompressor.open(&payload[segments.diff.clone()]),
        extra: decompressor.open(&payload[segments.extra.clone()]),
    }
}

/// Layout of a payload whose segments are known to be in bounds.
pub fn locate(payload: &[u8]) -> Result<(PatchHeader, Segments), crate::bsdiff::FormatError> {
    let header = PatchHeader::parse(payload)?;
    let segments = header.segments(payload.len())?;
    Ok((header, segments))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

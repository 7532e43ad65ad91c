// BSDIFF40 patch header.
//
//   offset  size  field
//   0       8     "BSDIFF40"
//   8       8     compressed control stream length
//   16      8     compressed diff stream length
//   24      8     size of the new file
//   32      ...   control | diff | extra streams
//
// All integers use the signed-magnitude encoding in `offtin`.

use std::fmt;
use std::io::{self, Write};
use std::ops::Range;

use thiserror::Error;

use super::offtin;

/// Magic tag at the start of every patch.
pub const MAGIC: [u8; 8] = *b"BSDIFF40";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Header field, used to name the offender in `FormatError::NegativeLength`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    ControlLen,
    DiffLen,
    NewSize,
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ControlLen => "control length",
            Self::DiffLen => "diff length",
            Self::NewSize => "new file size",
        })
    }
}

/// The patch is not a well-formed BSDIFF40 payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("patch is {len} bytes, shorter than the {} byte header", PatchHeader::SIZE)]
    HeaderTooShort { len: usize },

    #[error("invalid patch magic: expected \"BSDIFF40\", got {found:02X?}")]
    BadMagic { found: [u8; 8] },

    #[error("negative {field} in patch header: {value}")]
    NegativeLength { field: HeaderField, value: i64 },

    #[error("{segment} stream ends at byte {end}, past the {len} byte patch")]
    TruncatedPayload {
        segment: &'static str,
        end: u64,
        len: usize,
    },
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Decoded patch header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchHeader {
    /// Compressed length of the control stream.
    pub control_len: u64,
    /// Compressed length of the diff stream.
    pub diff_len: u64,
    /// Exact size of the reconstructed file.
    pub new_size: u64,
}

impl PatchHeader {
    /// Encoded header size; the control stream starts here.
    pub const SIZE: usize = 32;

    /// Parse and validate the header at the start of `payload`.
    pub fn parse(payload: &[u8]) -> Result<Self, FormatError> {
        if payload.len() < Self::SIZE {
            return Err(FormatError::HeaderTooShort { len: payload.len() });
        }

        let mut found = [0u8; 8];
        found.copy_from_slice(&payload[..8]);
        if found != MAGIC {
            return Err(FormatError::BadMagic { found });
        }

        let control_len = read_length(payload, 8, HeaderField::ControlLen)?;
        let diff_len = read_length(payload, 16, HeaderField::DiffLen)?;
        let new_size = read_length(payload, 24, HeaderField::NewSize)?;

        Ok(Self {
            control_len,
            diff_len,
            new_size,
        })
    }

    /// Serialize the header.
    ///
    /// Lengths above `i64::MAX` cannot be represented and are clamped.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..8].copy_from_slice(&MAGIC);
        for (slot, value) in [self.control_len, self.diff_len, self.new_size]
            .into_iter()
            .enumerate()
        {
            let at = 8 + slot * offtin::INT_SIZE;
            let value = i64::try_from(value).unwrap_or(i64::MAX);
            buf[at..at + offtin::INT_SIZE].copy_from_slice(&offtin::encode_i64(value));
        }
        buf
    }

    /// Write the serialized header to `w`.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Locate the three compressed streams inside a payload of `payload_len`
    /// bytes. The extra stream takes whatever follows the diff stream.
    pub fn segments(&self, payload_len: usize) -> Result<Segments, FormatError> {
        let control_start = Self::SIZE;
        let control_end = segment_end(control_start, self.control_len, payload_len, "control")?;
        let diff_end = segment_end(control_end, self.diff_len, payload_len, "diff")?;

        Ok(Segments {
            control: control_start..control_end,
            diff: control_end..diff_end,
            extra: diff_end..payload_len,
        })
    }
}

/// Byte ranges of the three compressed streams within a patch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments {
    pub control: Range<usize>,
    pub diff: Range<usize>,
    pub extra: Range<usize>,
}

fn read_length(payload: &[u8], offset: usize, field: HeaderField) -> Result<u64, FormatError> {
    // Callers have already checked `payload.len() >= PatchHeader::SIZE`.
    let value = offtin::read_i64(payload, offset).unwrap_or_default();
    u64::try_from(value).map_err(|_| FormatError::NegativeLength { field, value })
}

fn segment_end(
    start: usize,
    len: u64,
    payload_len: usize,
    segment: &'static str,
) -> Result<usize, FormatError> {
    let end = (start as u64).saturating_add(len);
    if end > payload_len as u64 {
        return Err(FormatError::TruncatedPayload {
            segment,
            end,
            len: payload_len,
        });
    }
    // Bounded by payload_len, so this fits.
    Ok(end as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

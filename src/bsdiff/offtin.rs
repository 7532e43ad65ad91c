// BSDIFF40 integer encoding.
//
// Integers are 8 bytes, little-endian, signed-magnitude: bits 0..63 hold the
// absolute value and bit 63 (the top bit of the last byte) is the sign.
// This is NOT two's complement; `i64::from_le_bytes` gives wrong answers for
// every negative value.

/// Encoded width of one integer.
pub const INT_SIZE: usize = 8;

const SIGN_BIT: u8 = 0x80;

/// Largest encodable magnitude (`2^63 - 1`).
const MAX_MAGNITUDE: u64 = i64::MAX as u64;

// ---------------------------------------------------------------------------
// Byte reinterpretation
// ---------------------------------------------------------------------------

/// Reinterpret a signed byte as unsigned (`-1` -> `255`).
#[inline]
pub fn to_unsigned(b: i8) -> u8 {
    b as u8
}

/// Reinterpret an unsigned byte as signed (`255` -> `-1`).
#[inline]
pub fn to_signed(b: u8) -> i8 {
    b as i8
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one signed-magnitude integer.
///
/// The low seven bits of `buf[7]` are the most significant digit; bytes
/// 6 down to 0 follow in base 256. Negative zero decodes to `0`.
#[inline]
pub fn decode_i64(buf: &[u8; INT_SIZE]) -> i64 {
    let magnitude = buf[..7]
        .iter()
        .rev()
        .fold(u64::from(buf[7] & !SIGN_BIT), |acc, &b| (acc << 8) | u64::from(b));
    // At most 63 significant bits, so the cast is lossless.
    let value = magnitude as i64;
    if buf[7] & SIGN_BIT != 0 { -value } else { value }
}

/// Decode the integer stored at `data[offset..offset + 8]`.
///
/// Returns `None` if fewer than eight bytes remain.
pub fn read_i64(data: &[u8], offset: usize) -> Option<i64> {
    let end = offset.checked_add(INT_SIZE)?;
    let bytes: &[u8; INT_SIZE] = data.get(offset..end)?.try_into().ok()?;
    Some(decode_i64(bytes))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode an integer in signed-magnitude form.
///
/// `i64::MIN` has no signed-magnitude representation and is clamped to
/// `-(2^63 - 1)`.
#[inline]
pub fn encode_i64(value: i64) -> [u8; INT_SIZE] {
    let magnitude = value.unsigned_abs().min(MAX_MAGNITUDE);
    let mut buf = magnitude.to_le_bytes();
    if value < 0 {
        buf[7] |= SIGN_BIT;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

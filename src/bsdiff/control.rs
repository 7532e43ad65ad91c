// Control stream decoding.
//
// The decompressed control stream is a flat sequence of triples, each three
// signed-magnitude integers: (diff count, extra count, old-file seek).

use std::io::Read;

use super::offtin::{self, INT_SIZE};
use super::patcher::{CorruptPatch, PatchError};
use super::read_full;

/// One reconstruction instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlTriple {
    /// Bytes to combine from the diff stream and the old file.
    pub diff: i64,
    /// Literal bytes to copy from the extra stream.
    pub extra: i64,
    /// Displacement applied to the old-file cursor afterwards.
    pub seek: i64,
}

impl ControlTriple {
    /// Encoded size of one triple.
    pub const SIZE: usize = 3 * INT_SIZE;

    pub fn new(diff: i64, extra: i64, seek: i64) -> Self {
        Self { diff, extra, seek }
    }

    /// Decode a triple from its 24-byte form.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let field = |i: usize| {
            let mut b = [0u8; INT_SIZE];
            b.copy_from_slice(&buf[i * INT_SIZE..(i + 1) * INT_SIZE]);
            offtin::decode_i64(&b)
        };
        Self {
            diff: field(0),
            extra: field(1),
            seek: field(2),
        }
    }

    /// Encode a triple into its 24-byte form.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        for (i, v) in [self.diff, self.extra, self.seek].into_iter().enumerate() {
            buf[i * INT_SIZE..(i + 1) * INT_SIZE].copy_from_slice(&offtin::encode_i64(v));
        }
        buf
    }

    /// The diff and extra counts, or `None` if either is negative.
    pub fn counts(&self) -> Option<(u64, u64)> {
        Some((u64::try_from(self.diff).ok()?, u64::try_from(self.extra).ok()?))
    }
}

// ---------------------------------------------------------------------------
// ControlReader
// ---------------------------------------------------------------------------

/// Reads triples from a decompressed control stream.
///
/// Also usable as an iterator for inspection; iteration stops cleanly at
/// end of stream and yields an error for a trailing partial triple.
pub struct ControlReader<R> {
    reader: R,
    triples_read: u64,
}

impl<R: Read> ControlReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            triples_read: 0,
        }
    }

    /// Number of complete triples read so far.
    pub fn triples_read(&self) -> u64 {
        self.triples_read
    }

    /// Read the next triple. Running out of data is always an error here.
    pub fn read_triple(&mut self) -> Result<ControlTriple, PatchError> {
        match self.next_triple()? {
            Some(triple) => Ok(triple),
            None => Err(CorruptPatch::ControlUnderrun {
                triple: self.triples_read,
                got: 0,
            }
            .into()),
        }
    }

    /// Read the next triple, returning `None` at a clean end of stream.
    fn next_triple(&mut self) -> Result<Option<ControlTriple>, PatchError> {
        let mut buf = [0u8; ControlTriple::SIZE];
        let got = read_full(&mut self.reader, &mut buf).map_err(PatchError::Decompress)?;
        if got == 0 {
            return Ok(None);
        }
        if got < ControlTriple::SIZE {
            return Err(CorruptPatch::ControlUnderrun {
                triple: self.triples_read,
                got,
            }
            .into());
        }
        self.triples_read += 1;
        Ok(Some(ControlTriple::decode(&buf)))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for ControlReader<R> {
    type Item = Result<ControlTriple, PatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_triple().transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(triples: &[ControlTriple]) -> Vec<u8> {
        triples.iter().flat_map(|t| t.encode()).collect()
    }

    #[test]
    fn triple_encode_decode() {
        let t = ControlTriple::new(3, 0, -7);
        assert_eq!(ControlTriple::decode(&t.encode()), t);
    }

    #[test]
    fn decode_uses_signed_magnitude() {
        let mut buf = [0u8; ControlTriple::SIZE];
        buf[0] = 5;
        buf[8] = 2;
        buf[16] = 1;
        buf[23] = 0x80;
        assert_eq!(ControlTriple::decode(&buf), ControlTriple::new(5, 2, -1));
    }

    #[test]
    fn counts_reject_negatives() {
        assert_eq!(ControlTriple::new(1, 2, -3).counts(), Some((1, 2)));
        assert_eq!(ControlTriple::new(-1, 2, 0).counts(), None);
        assert_eq!(ControlTriple::new(1, -2, 0).counts(), None);
    }

    #[test]
    fn reader_yields_triples_in_order() {
        let triples = [
            ControlTriple::new(1, 2, 3),
            ControlTriple::new(0, 10, -4),
        ];
        let data = stream(&triples);
        let mut reader = ControlReader::new(data.as_slice());
        assert_eq!(reader.read_triple().unwrap(), triples[0]);
        assert_eq!(reader.read_triple().unwrap(), triples[1]);
        assert_eq!(reader.triples_read(), 2);
        assert!(matches!(
            reader.read_triple(),
            Err(PatchError::Corrupt(CorruptPatch::ControlUnderrun { triple: 2, got: 0 }))
        ));
    }

    #[test]
    fn reader_rejects_partial_triple() {
        let mut data = stream(&[ControlTriple::new(1, 1, 1)]);
        data.extend_from_slice(&[0u8; 20]);
        let mut reader = ControlReader::new(data.as_slice());
        reader.read_triple().unwrap();
        assert!(matches!(
            reader.read_triple(),
            Err(PatchError::Corrupt(CorruptPatch::ControlUnderrun { triple: 1, got: 20 }))
        ));
    }

    #[test]
    fn iterator_stops_at_end() {
        let triples = [ControlTriple::new(4, 0, 0), ControlTriple::new(0, 4, 8)];
        let data = stream(&triples);
        let collected: Vec<_> = ControlReader::new(data.as_slice())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(collected, triples);
    }

    #[test]
    fn iterator_reports_trailing_garbage() {
        let mut data = stream(&[ControlTriple::new(4, 0, 0)]);
        data.push(0xFF);
        let results: Vec<_> = ControlReader::new(data.as_slice()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}

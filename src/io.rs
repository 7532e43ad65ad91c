// File-level entry point for applying a patch.
//
// `apply_file()` validates the three paths, runs the chosen strategy with
// buffered I/O and removes the destination again if anything fails. The
// output is optionally hashed with SHA-256 as it is written (feature-gated
// behind `file-io`).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::bsdiff::patcher::PatchError;
use crate::compress::patcher::{self, PatchOptions, PatchSummary, Strategy};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Options and stats
// ---------------------------------------------------------------------------

/// Options for `apply_file()`.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub strategy: Strategy,
    pub patch: PatchOptions,
}

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct PatchStats {
    /// Old file size in bytes.
    pub old_size: u64,
    /// Patch file size in bytes.
    pub patch_size: u64,
    /// Reconstructed file size in bytes.
    pub new_size: u64,
    /// Number of control triples applied.
    pub control_triples: u64,
    /// SHA-256 of the new file (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors and result codes
// ---------------------------------------------------------------------------

/// Coarse outcome of an apply, for callers that only need a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ResultCode {
    Success = 1,
    DiffFileError = 2,
    OldFileError = 3,
    NewFileError = 4,
}

impl ResultCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Error type for `apply_file()`.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("old file {}: {source}", path.display())]
    OldFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("new file {}: {source}", path.display())]
    NewFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("patch file {}: {source}", path.display())]
    DiffFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl ApplyError {
    /// The result code this error reports as.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::OldFile { .. } => ResultCode::OldFileError,
            Self::NewFile { .. } => ResultCode::NewFileError,
            Self::DiffFile { .. } => ResultCode::DiffFileError,
            Self::Patch(e) => match e {
                PatchError::Format(_) | PatchError::Corrupt(_) | PatchError::Decompress(_) => {
                    ResultCode::DiffFileError
                }
                PatchError::OldRead(_) | PatchError::CommentOffset { .. } => {
                    ResultCode::OldFileError
                }
                PatchError::Write(_) => ResultCode::NewFileError,
            },
        }
    }
}

fn empty_file() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "file is empty")
}

/// Whether both paths resolve to the same existing file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to `old_path`, writing `new_path`.
///
/// The patch is read fully into memory. The old file is read through a
/// seekable `BufReader` (streaming) or fully into memory (buffered). The
/// output uses `BufWriter`.
///
/// Input checks happen before any parsing: a missing or empty old file or
/// patch, or an uncreatable destination, is reported without touching the
/// patch contents. On any later failure the destination is removed.
pub fn apply_file(
    old_path: &Path,
    new_path: &Path,
    patch_path: &Path,
    opts: &ApplyOptions,
) -> Result<PatchStats, ApplyError> {
    let old_err = |source| ApplyError::OldFile {
        path: old_path.to_path_buf(),
        source,
    };
    let diff_err = |source| ApplyError::DiffFile {
        path: patch_path.to_path_buf(),
        source,
    };

    let old_file = File::open(old_path).map_err(old_err)?;
    let old_size = old_file.metadata().map_err(old_err)?.len();
    if old_size == 0 {
        return Err(old_err(empty_file()));
    }

    let patch = std::fs::read(patch_path).map_err(diff_err)?;
    if patch.is_empty() {
        return Err(diff_err(empty_file()));
    }

    let new_err = |source| ApplyError::NewFile {
        path: new_path.to_path_buf(),
        source,
    };
    // Creating the destination truncates it, so it must not be the old file.
    if same_file(old_path, new_path) {
        return Err(new_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "output would overwrite the old file",
        )));
    }
    let new_file = File::create(new_path).map_err(new_err)?;

    debug!(
        "applying {} ({} bytes) to {} ({old_size} bytes) with {} strategy",
        patch_path.display(),
        patch.len(),
        old_path.display(),
        opts.strategy
    );

    let result = match opts.strategy {
        Strategy::Streaming => apply_streaming(old_file, &patch, new_file, new_path, &opts.patch),
        Strategy::Buffered => {
            apply_in_memory(old_file, &patch, new_file, old_path, new_path, &opts.patch)
        }
    };

    match result {
        Ok((summary, output_sha256)) => Ok(PatchStats {
            old_size,
            patch_size: patch.len() as u64,
            new_size: summary.header.new_size,
            control_triples: summary.triples,
            output_sha256,
        }),
        Err(e) => {
            warn!("discarding partial output {}: {e}", new_path.display());
            if let Err(rm) = std::fs::remove_file(new_path) {
                warn!("could not remove {}: {rm}", new_path.display());
            }
            Err(e)
        }
    }
}

/// Apply and map the outcome to a bare result code.
pub fn apply(
    old_path: &Path,
    new_path: &Path,
    patch_path: &Path,
    opts: &ApplyOptions,
) -> ResultCode {
    match apply_file(old_path, new_path, patch_path, opts) {
        Ok(_) => ResultCode::Success,
        Err(e) => e.code(),
    }
}

type Applied = (PatchSummary, Option<[u8; 32]>);

fn apply_streaming(
    old_file: File,
    patch: &[u8],
    new_file: File,
    new_path: &Path,
    opts: &PatchOptions,
) -> Result<Applied, ApplyError> {
    let old = BufReader::with_capacity(BUF_SIZE, old_file);
    let mut writer = HashingWriter::new(BufWriter::with_capacity(BUF_SIZE, new_file));

    let summary = patcher::patch_streaming(old, patch, &mut writer, opts)?;

    let (inner, sha) = writer.finish();
    finish_output(inner, new_path)?;
    Ok((summary, sha))
}

fn apply_in_memory(
    mut old_file: File,
    patch: &[u8],
    new_file: File,
    old_path: &Path,
    new_path: &Path,
    opts: &PatchOptions,
) -> Result<Applied, ApplyError> {
    let mut old = Vec::new();
    io::Read::read_to_end(&mut old_file, &mut old).map_err(|source| ApplyError::OldFile {
        path: old_path.to_path_buf(),
        source,
    })?;

    let patched = patcher::apply_buffered(&old, patch, opts)?;

    let mut writer = HashingWriter::new(BufWriter::with_capacity(BUF_SIZE, new_file));
    writer
        .write_all(&patched.data)
        .map_err(|source| ApplyError::NewFile {
            path: new_path.to_path_buf(),
            source,
        })?;

    let (inner, sha) = writer.finish();
    finish_output(inner, new_path)?;
    Ok((patched.summary, sha))
}

fn finish_output(writer: BufWriter<File>, new_path: &Path) -> Result<(), ApplyError> {
    let new_err = |source| ApplyError::NewFile {
        path: new_path.to_path_buf(),
        source,
    };
    let file = writer.into_inner().map_err(|e| new_err(e.into_error()))?;
    file.sync_all().map_err(new_err)
}

// ---------------------------------------------------------------------------
// Hashing writer
// ---------------------------------------------------------------------------

struct HashingWriter<W: Write> {
    inner: W,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            #[cfg(feature = "file-io")]
            hasher: <sha2::Sha256 as sha2::Digest>::new(),
        }
    }

    fn finish(self) -> (W, Option<[u8; 32]>) {
        #[cfg(feature = "file-io")]
        {
            use sha2::Digest;
            (self.inner, Some(self.hasher.finalize().into()))
        }
        #[cfg(not(feature = "file-io"))]
        {
            (self.inner, None)
        }
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        #[cfg(feature = "file-io")]
        {
            use sha2::Digest;
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdiff::control::ControlTriple;
    use crate::bsdiff::header::PatchHeader;
    use crate::compress::segment::SegmentCodec;

    fn bz(data: &[u8]) -> Vec<u8> {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// "abc" -> "bcd!!": add 1 to each old byte, then append two literals.
    fn sample_patch() -> Vec<u8> {
        let ctrl = bz(&ControlTriple::new(3, 2, 0).encode());
        let diff = bz(&[1, 1, 1]);
        let extra = bz(b"!!");
        let mut out = PatchHeader {
            control_len: ctrl.len() as u64,
            diff_len: diff.len() as u64,
            new_size: 5,
        }
        .to_bytes()
        .to_vec();
        out.extend_from_slice(&ctrl);
        out.extend_from_slice(&diff);
        out.extend_from_slice(&extra);
        out
    }

    struct Files {
        _dir: tempfile::TempDir,
        old: PathBuf,
        new: PathBuf,
        patch: PathBuf,
    }

    fn files(old: &[u8], patch: &[u8]) -> Files {
        let dir = tempfile::tempdir().unwrap();
        let f = Files {
            old: dir.path().join("old.bin"),
            new: dir.path().join("new.bin"),
            patch: dir.path().join("patch.bsdiff"),
            _dir: dir,
        };
        std::fs::write(&f.old, old).unwrap();
        std::fs::write(&f.patch, patch).unwrap();
        f
    }

    fn with_strategy(strategy: Strategy) -> ApplyOptions {
        ApplyOptions {
            strategy,
            ..Default::default()
        }
    }

    #[test]
    fn apply_file_both_strategies() {
        for strategy in [Strategy::Streaming, Strategy::Buffered] {
            let f = files(b"abc", &sample_patch());
            let stats = apply_file(&f.old, &f.new, &f.patch, &with_strategy(strategy)).unwrap();
            assert_eq!(std::fs::read(&f.new).unwrap(), b"bcd!!");
            assert_eq!(stats.old_size, 3);
            assert_eq!(stats.new_size, 5);
            assert_eq!(stats.control_triples, 1);
            assert_eq!(stats.patch_size, sample_patch().len() as u64);
        }
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn output_sha256_matches_content() {
        use sha2::Digest;
        let f = files(b"abc", &sample_patch());
        let stats = apply_file(&f.old, &f.new, &f.patch, &ApplyOptions::default()).unwrap();
        let expected: [u8; 32] = sha2::Sha256::digest(b"bcd!!").into();
        assert_eq!(stats.output_sha256, Some(expected));
    }

    #[test]
    fn missing_and_empty_inputs_map_to_codes() {
        let f = files(b"", &sample_patch());
        let err = apply_file(&f.old, &f.new, &f.patch, &ApplyOptions::default()).unwrap_err();
        assert_eq!(err.code(), ResultCode::OldFileError);

        let f = files(b"abc", b"");
        let err = apply_file(&f.old, &f.new, &f.patch, &ApplyOptions::default()).unwrap_err();
        assert_eq!(err.code(), ResultCode::DiffFileError);
        assert!(!f.new.exists(), "destination created before input checks");

        let f = files(b"abc", &sample_patch());
        let missing = f.old.with_file_name("nope.bin");
        assert_eq!(
            apply(&missing, &f.new, &f.patch, &ApplyOptions::default()),
            ResultCode::OldFileError
        );
    }

    #[test]
    fn uncreatable_destination_is_new_file_error() {
        let f = files(b"abc", &sample_patch());
        let dest = f.new.join("no-such-dir").join("new.bin");
        let err = apply_file(&f.old, &dest, &f.patch, &ApplyOptions::default()).unwrap_err();
        assert_eq!(err.code(), ResultCode::NewFileError);
    }

    #[test]
    fn corrupt_patch_removes_partial_output() {
        for strategy in [Strategy::Streaming, Strategy::Buffered] {
            let mut patch = sample_patch();
            patch[..8].copy_from_slice(b"BSDIFF41");
            let f = files(b"abc", &patch);
            let err = apply_file(&f.old, &f.new, &f.patch, &with_strategy(strategy)).unwrap_err();
            assert_eq!(err.code(), ResultCode::DiffFileError);
            assert!(!f.new.exists());
        }
    }

    #[test]
    fn patching_in_place_is_rejected() {
        for strategy in [Strategy::Streaming, Strategy::Buffered] {
            let f = files(b"abc", &sample_patch());
            let err = apply_file(&f.old, &f.old, &f.patch, &with_strategy(strategy)).unwrap_err();
            assert_eq!(err.code(), ResultCode::NewFileError);
            assert_eq!(std::fs::read(&f.old).unwrap(), b"abc");

            // Same file reached through a different spelling of the path.
            let dir = f.old.parent().unwrap();
            let alias = dir.join(".").join("old.bin");
            let err = apply_file(&f.old, &alias, &f.patch, &with_strategy(strategy)).unwrap_err();
            assert_eq!(err.code(), ResultCode::NewFileError);
            assert_eq!(std::fs::read(&f.old).unwrap(), b"abc");
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingOld;

    impl crate::bsdiff::source::OldSource for FailingOld {
        fn size(&self) -> u64 {
            3
        }

        fn read_at(&mut self, _: u64, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "unreadable"))
        }
    }

    #[test]
    fn write_failure_is_new_file_error() {
        let err = patcher::patch_streaming(
            io::Cursor::new(b"abc"),
            &sample_patch(),
            FailingWriter,
            &PatchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::Write(_)));
        assert_eq!(ApplyError::from(err).code(), ResultCode::NewFileError);
    }

    #[test]
    fn old_read_failure_is_old_file_error() {
        let mut out = Vec::new();
        let err = patcher::patch_with(
            &mut FailingOld,
            &sample_patch(),
            &mut out,
            &SegmentCodec::Bzip2,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PatchError::OldRead(_)));
        assert_eq!(ApplyError::from(err).code(), ResultCode::OldFileError);
    }

    #[test]
    fn decompress_failure_is_diff_file_error() {
        let err = PatchError::Decompress(io::Error::other("bad stream"));
        assert_eq!(ApplyError::from(err).code(), ResultCode::DiffFileError);
    }

    #[test]
    fn comment_offset_is_old_file_error() {
        let f = files(b"abc", &sample_patch());
        let opts = ApplyOptions {
            strategy: Strategy::Buffered,
            patch: PatchOptions {
                ext_len: Some(0),
                codec: SegmentCodec::Bzip2,
            },
        };
        assert_eq!(apply(&f.old, &f.new, &f.patch, &opts), ResultCode::OldFileError);
    }

    #[test]
    fn result_code_values() {
        assert_eq!(ResultCode::Success.as_i32(), 1);
        assert_eq!(ResultCode::DiffFileError.as_i32(), 2);
        assert_eq!(ResultCode::OldFileError.as_i32(), 3);
        assert_eq!(ResultCode::NewFileError.as_i32(), 4);
        assert!(ResultCode::Success.is_success());
    }
}

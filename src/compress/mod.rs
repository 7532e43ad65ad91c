// Patch application pipeline.
//
// This module wires the BSDIFF40 format layer to concrete inputs:
//
// - `segment` — Segment decompressors (bzip2, gzip, raw) for the three streams
// - `patcher` — Streaming and buffered apply strategies

pub mod patcher;
pub mod segment;

pub use patcher::{
    PatchOptions, PatchSummary, Patched, Strategy, apply_buffered, patch_buffered,
    patch_streaming,
};
pub use segment::{SegmentCodec, SegmentDecompressor};

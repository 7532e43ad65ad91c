//! Oxipatch: BSDIFF40 binary patch application in Rust.
//!
//! The crate provides:
//! - The BSDIFF40 format layer and reconstruction loop (`bsdiff`)
//! - Streaming and buffered apply strategies over pluggable stream codecs
//!   (`compress`)
//! - A file-level entry point with coarse result codes (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxipatch::compress::{PatchOptions, patch_buffered};
//!
//! let old = std::fs::read("app-1.0.bin").unwrap();
//! let patch = std::fs::read("app-1.0-to-1.1.bsdiff").unwrap();
//!
//! let new = patch_buffered(&old, &patch, &PatchOptions::default()).unwrap();
//! std::fs::write("app-1.1.bin", new).unwrap();
//! ```

pub mod bsdiff;
pub mod compress;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

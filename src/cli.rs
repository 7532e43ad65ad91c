// Command-line front end for Oxipatch.
//
// Explicit subcommands with long-form options: `apply` reconstructs a new
// file, `header` and `controls` inspect a patch, `config` reports the build.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

use crate::bsdiff::control::ControlReader;
use crate::bsdiff::header::PatchHeader;
use crate::bsdiff::patcher::BLOCK_SIZE;
use crate::compress::patcher::Strategy;
use crate::compress::segment::{self, SegmentCodec, SegmentDecompressor};
use crate::io::{self, ApplyOptions, ResultCode};

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// BSDIFF40 patch applier.
#[derive(Parser, Debug)]
#[command(
    name = "oxipatch",
    version,
    about = "BSDIFF40 binary patch applier",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a patch to an old file, producing a new file.
    Apply(ApplyArgs),
    /// Print the patch header and segment layout.
    Header(HeaderArgs),
    /// List the control triples of a patch.
    Controls(InspectArgs),
    /// Print build/configuration details.
    Config,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

fn parse_codec(s: &str) -> Result<SegmentCodec, String> {
    s.parse()
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Old file the patch was generated against.
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "old_pos")]
    old: Option<PathBuf>,

    /// Patch file.
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "patch_pos")]
    patch: Option<PathBuf>,

    /// Output file for the reconstructed new file.
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_pos")]
    output: Option<PathBuf>,

    /// Memory strategy: streaming (seek the old file, write as it goes) or
    /// buffered (everything in memory, write once at the end).
    #[arg(long, default_value = "streaming", value_parser = parse_strategy)]
    strategy: Strategy,

    /// Bytes of trailing data after the old file's comment-length field;
    /// enables zeroing of that field during reconstruction.
    #[arg(long = "ext-len")]
    ext_len: Option<u64>,

    /// Compression of the patch streams (bzip2, gzip, raw).
    #[arg(long, default_value = "bzip2", value_parser = parse_codec)]
    codec: SegmentCodec,

    /// Old file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    old_pos: Option<PathBuf>,

    /// Patch file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    patch_pos: Option<PathBuf>,

    /// Output file (positional form).
    #[arg(value_hint = ValueHint::FilePath)]
    output_pos: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct HeaderArgs {
    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Compression of the patch streams (bzip2, gzip, raw).
    #[arg(long, default_value = "bzip2", value_parser = parse_codec)]
    codec: SegmentCodec,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Header,
    Controls,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    old_file: Option<PathBuf>,
    patch_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    strategy: Strategy,
    ext_len: Option<u64>,
    codec: SegmentCodec,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        old_file: None,
        patch_file: None,
        output_file: None,
        strategy: Strategy::default(),
        ext_len: None,
        codec: SegmentCodec::default(),
    };

    match cli.command {
        Cmd::Apply(args) => {
            opts.command = Command::Apply;
            opts.old_file = args.old.or(args.old_pos);
            opts.patch_file = args.patch.or(args.patch_pos);
            opts.output_file = args.output.or(args.output_pos);
            opts.strategy = args.strategy;
            opts.ext_len = args.ext_len;
            opts.codec = args.codec;
        }
        Cmd::Header(args) => {
            opts.command = Command::Header;
            opts.patch_file = Some(args.patch);
        }
        Cmd::Controls(args) => {
            opts.command = Command::Controls;
            opts.patch_file = Some(args.patch);
            opts.codec = args.codec;
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxipatch".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

fn emit_json(value: serde_json::Value) {
    match serde_json::to_string_pretty(&value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => eprintln!("oxipatch: json error: {e}"),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Exit status for a failed command: the numeric result code.
fn failure(code: ResultCode) -> i32 {
    code.as_i32()
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn license_line() -> String {
    format!("Licensed under the {} License", env!("CARGO_PKG_LICENSE"))
}

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("oxipatch version {version} (Rust), Copyright (C) oxipatch contributors");
    eprintln!("{}", license_line());

    let gzip = cfg!(feature = "gzip-segments") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let codecs: Vec<&str> = SegmentCodec::all().iter().map(|c| c.name()).collect();
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("GZIP_SEGMENTS={gzip}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("CODECS={}", codecs.join(","));
    eprintln!("DEFAULT_CODEC={}", SegmentCodec::default());
    eprintln!("DEFAULT_STRATEGY={}", Strategy::default());
    eprintln!("HEADER_SIZE={}", PatchHeader::SIZE);
    eprintln!("BLOCK_SIZE={BLOCK_SIZE}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(opts: &Options) -> i32 {
    let (Some(old), Some(patch)) = (&opts.old_file, &opts.patch_file) else {
        eprintln!("oxipatch: apply requires an old file and a patch file");
        return failure(if opts.old_file.is_none() {
            ResultCode::OldFileError
        } else {
            ResultCode::DiffFileError
        });
    };
    let Some(output) = &opts.output_file else {
        eprintln!("oxipatch: apply requires an output file");
        return failure(ResultCode::NewFileError);
    };

    if output.exists() && !opts.force {
        eprintln!(
            "oxipatch: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return failure(ResultCode::NewFileError);
    }

    let apply_opts = ApplyOptions {
        strategy: opts.strategy,
        patch: crate::compress::patcher::PatchOptions {
            ext_len: opts.ext_len,
            codec: opts.codec,
        },
    };

    match io::apply_file(old, output, patch, &apply_opts) {
        Ok(stats) => {
            if opts.verbose > 0 && !opts.quiet {
                eprintln!(
                    "oxipatch: apply: old size: {}, patch size: {}, new size: {}, triples: {}",
                    stats.old_size, stats.patch_size, stats.new_size, stats.control_triples
                );
            }
            if opts.json_output {
                emit_json(serde_json::json!({
                    "command": "apply",
                    "strategy": opts.strategy.name(),
                    "old_size": stats.old_size,
                    "patch_size": stats.patch_size,
                    "new_size": stats.new_size,
                    "control_triples": stats.control_triples,
                    "output_sha256": stats.output_sha256.map(|h| hex(&h)),
                }));
            }
            0
        }
        Err(e) => {
            eprintln!("oxipatch: {e}");
            failure(e.code())
        }
    }
}

// ---------------------------------------------------------------------------
// Inspection commands (header, controls)
// ---------------------------------------------------------------------------

fn read_patch(opts: &Options) -> Option<(PathBuf, Vec<u8>)> {
    let Some(path) = opts.patch_file.clone() else {
        eprintln!("oxipatch: inspection commands require a patch file");
        return None;
    };
    match std::fs::read(&path) {
        Ok(data) => Some((path, data)),
        Err(e) => {
            eprintln!("oxipatch: patch file: {}: {e}", path.display());
            None
        }
    }
}

fn cmd_header(opts: &Options) -> i32 {
    let Some((path, data)) = read_patch(opts) else {
        return failure(ResultCode::DiffFileError);
    };

    let (header, segments) = match segment::locate(&data) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("oxipatch: {}: {e}", path.display());
            return failure(ResultCode::DiffFileError);
        }
    };

    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "header",
            "patch_size": data.len(),
            "control_len": header.control_len,
            "diff_len": header.diff_len,
            "extra_len": segments.extra.len(),
            "new_size": header.new_size,
            "control": [segments.control.start, segments.control.end],
            "diff": [segments.diff.start, segments.diff.end],
            "extra": [segments.extra.start, segments.extra.end],
        }));
        return 0;
    }

    if !opts.quiet {
        println!("Patch file:            {}", path.display());
        println!("Patch size:            {}", data.len());
        println!("New file size:         {}", header.new_size);
        print_range("Control segment:", &segments.control);
        print_range("Diff segment:", &segments.diff);
        print_range("Extra segment:", &segments.extra);
    }
    0
}

fn print_range(label: &str, range: &std::ops::Range<usize>) {
    println!(
        "{label:<22} {}..{} ({} bytes)",
        range.start,
        range.end,
        range.len()
    );
}

fn cmd_controls(opts: &Options) -> i32 {
    let Some((path, data)) = read_patch(opts) else {
        return failure(ResultCode::DiffFileError);
    };
    match list_controls(&path, &data, &opts.codec, opts) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("oxipatch: {}: {msg}", path.display());
            failure(ResultCode::DiffFileError)
        }
    }
}

fn list_controls(
    path: &Path,
    data: &[u8],
    codec: &dyn SegmentDecompressor,
    opts: &Options,
) -> Result<(), String> {
    let (header, segments) = segment::locate(data).map_err(|e| e.to_string())?;
    let streams = segment::open_streams(codec, data, &segments);

    let mut entries = Vec::new();
    let mut new_pos: i128 = 0;
    let mut old_pos: i128 = 0;
    let print = !opts.quiet && !opts.json_output;
    if print {
        println!("Patch file: {}", path.display());
        println!("  triple       new_pos       old_pos        diff       extra        seek");
    }

    for (i, triple) in ControlReader::new(streams.control).enumerate() {
        let triple = triple.map_err(|e| e.to_string())?;
        if print {
            println!(
                "  {i:>6} {new_pos:>13} {old_pos:>13} {:>11} {:>11} {:>11}",
                triple.diff, triple.extra, triple.seek
            );
        }
        if opts.json_output {
            entries.push(serde_json::json!({
                "diff": triple.diff,
                "extra": triple.extra,
                "seek": triple.seek,
            }));
        }
        new_pos += i128::from(triple.diff) + i128::from(triple.extra);
        old_pos += i128::from(triple.diff) + i128::from(triple.seek);
    }

    let covered = new_pos == i128::from(header.new_size);
    if opts.json_output {
        emit_json(serde_json::json!({
            "command": "controls",
            "new_size": header.new_size,
            "covers_new_size": covered,
            "triples": entries,
        }));
    } else if print {
        println!(
            "  total output {new_pos} of {} bytes{}",
            header.new_size,
            if covered { "" } else { " (mismatch)" }
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let exit_code = match opts.command {
        Command::Apply => cmd_apply(&opts),
        Command::Header => cmd_header(&opts),
        Command::Controls => cmd_controls(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! `vgmseq` command line front-end.
//!
//! Loads a sequence (raw or gzip-compressed), runs the interpretation
//! passes, and prints what they produced or writes it as a Standard MIDI
//! File.

mod cui;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use flate2::read::GzDecoder;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use vgmseq::format::RefSeqFormat;
use vgmseq::{Pass, SeqOptions, Sequence};

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show header fields and per-track figures
    Info {
        /// Sequence file path (use '-' for stdin)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List decoded events in source order
    Events {
        /// Sequence file path (use '-' for stdin)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only list this track
        #[arg(long)]
        track: Option<usize>,
    },
    /// Show the events sounding at a tick, or every change over a range
    Timeline {
        /// Sequence file path (use '-' for stdin)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// First tick to query
        #[arg(long, default_value_t = 0)]
        tick: u32,

        /// Sweep up to this tick (inclusive), printing each change
        #[arg(long)]
        until: Option<u32>,

        /// Which pass's timeline to query
        #[arg(long, value_enum, default_value_t = PassArg::Midi)]
        pass: PassArg,
    },
    /// Convert to a Standard MIDI File
    Midi {
        /// Input sequence file path (use '-' for stdin)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output MIDI file path (use '-' for stdout)
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PassArg {
    /// Event list pass (stops at the first loop)
    Ui,
    /// Length measurement pass
    Length,
    /// MIDI conversion pass
    Midi,
}

#[derive(Parser, Debug)]
#[command(
    name = "vgmseq",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Loop repeats to measure and convert
    #[arg(long, global = true, default_value_t = 1)]
    loops: u32,

    /// Decode steps allowed per track per pass
    #[arg(long, global = true)]
    max_steps: Option<u32>,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Read bytes from a path, or stdin for `-`, decompressing gzip input
/// detected by `.gz` extension or by header (0x1f 0x8b).
fn load_bytes_from_path(path: &Path) -> anyhow::Result<Vec<u8>> {
    let data = if path.as_os_str() == "-" {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("failed to read stdin")?;
        data
    } else {
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?
    };

    let is_gzip = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
        || (data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b);

    if is_gzip {
        let mut decoder = GzDecoder::new(Cursor::new(data));
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("gzip decompression failed")?;
        Ok(out)
    } else {
        Ok(data)
    }
}

fn open_sequence(path: &Path, args: &Args) -> anyhow::Result<Sequence> {
    let bytes = load_bytes_from_path(path)?;
    let mut seq = Sequence::new(bytes, RefSeqFormat)
        .with_context(|| format!("failed to parse sequence: {}", path.display()))?;
    let mut options = SeqOptions {
        loop_count: args.loops,
        ..SeqOptions::default()
    };
    if let Some(max_steps) = args.max_steps {
        options.max_steps_per_track = max_steps;
    }
    seq.set_options(options);
    Ok(seq)
}

/// Run passes in protocol order up to and including `last`.
fn run_passes(seq: &mut Sequence, last: PassArg) {
    seq.run_pass(Pass::AddToUi, 0);
    if last == PassArg::Ui {
        return;
    }
    seq.run_pass(Pass::FindDeltaLength, 0);
    if last == PassArg::Length {
        return;
    }
    seq.run_pass(Pass::ConvertToMidi, seq.delta_length());
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Commands::Info { file } => {
            let mut seq = open_sequence(file, args)?;
            seq.load();
            cui::info::print_info(file, &seq);
        }
        Commands::Events { file, track } => {
            let mut seq = open_sequence(file, args)?;
            run_passes(&mut seq, PassArg::Ui);
            cui::events::print_events(&seq, *track)?;
        }
        Commands::Timeline {
            file,
            tick,
            until,
            pass,
        } => {
            let mut seq = open_sequence(file, args)?;
            run_passes(&mut seq, *pass);
            cui::timeline::print_timeline(&seq, *tick, *until)?;
        }
        Commands::Midi { input, output } => {
            let mut seq = open_sequence(input, args)?;
            seq.load();
            cui::midi::write_midi(&seq, output)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("vgmseq: {e:#}");
        std::process::exit(1);
    }
}

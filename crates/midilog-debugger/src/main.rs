//! CLI frontend for inspecting and producing `midilog` captures.
//!
//! Two subcommands: `dump` parses a MIDI file and prints its header and
//! per-track events; `demo` drives the full transcriber with a small
//! built-in performance and writes the resulting capture, which is handy
//! for eyeballing heuristic changes without wiring up an emulation core.

mod cui;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse and display a MIDI file's header and events
    Dump {
        /// MIDI file path to display
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only display this track index
        #[arg(long)]
        track: Option<usize>,

        /// Maximum number of events to print per track (0 = no limit)
        #[arg(long, default_value_t = 64)]
        limit: usize,
    },
    /// Capture a built-in demo performance to a MIDI file
    Demo {
        /// Output MIDI file path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// SMF layout: 0 (streamed single track) or 1 (track per voice)
        #[arg(long, default_value_t = 1)]
        format: u8,

        /// JSON percussion-mapping file for the noise and DMC voices
        #[arg(long)]
        map: Option<PathBuf>,

        /// Capture length in seconds
        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "midilog",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Commands::Dump { file, track, limit } => cui::dump::run(&file, track, limit),
        Commands::Demo {
            output,
            format,
            map,
            seconds,
        } => cui::demo::run(&output, format, map.as_deref(), seconds),
    }
}

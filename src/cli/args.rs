//! Command-line argument definitions for particle ingestion
//!
//! This module defines the complete CLI interface using the clap derive
//! API: the `process` command that ingests a file and emits particles,
//! and the `validate` command that dry-runs a file and reports statistics.

use crate::config::FormatKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the particle ingestion engine
///
/// Converts raw oceanographic instrument telemetry files into structured,
/// timestamped particle records emitted as JSON lines.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "particle-ingest",
    version,
    about = "Convert oceanographic instrument telemetry into structured particle records",
    long_about = "A streaming ingestion tool that parses raw instrument data files \
                  (glider ASCII segments, SIO framed binary blocks, CSPP profiler uplinks, \
                  live packet captures) into typed particle records. Parse position is \
                  checkpointed beside the input file so an interrupted run resumes exactly \
                  where it stopped, without duplicating or skipping records."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands for particle ingestion
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Parse a telemetry file and emit particles as JSON lines
    Process(ProcessArgs),
    /// Dry-run a telemetry file and report parse statistics
    Validate(ValidateArgs),
}

/// Arguments for the process command (main ingestion)
#[derive(Debug, Clone, Parser)]
pub struct ProcessArgs {
    /// Input telemetry file to ingest
    #[arg(
        short = 'i',
        long = "input",
        value_name = "PATH",
        help = "Input telemetry file to ingest"
    )]
    pub input_path: PathBuf,

    /// Instrument format family of the input file
    ///
    /// One of: glider, sio, cspp, packet.
    #[arg(
        short = 'f',
        long = "format",
        value_name = "FORMAT",
        help = "Instrument format family (glider, sio, cspp, packet)"
    )]
    pub format: FormatKind,

    /// Output path for emitted particles (JSON lines)
    ///
    /// If not specified, particles are written to stdout.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Output path for particle JSON lines (default: stdout)"
    )]
    pub output_path: Option<PathBuf>,

    /// Discard any existing checkpoint and parse from byte zero
    ///
    /// Without this flag an existing sidecar state file is restored and
    /// ingestion resumes where the previous run stopped.
    #[arg(long = "fresh", help = "Ignore an existing checkpoint and start over")]
    pub fresh: bool,

    /// Keep following the file for appended data after reaching EOF
    #[arg(long = "follow", help = "Tail-follow the file for appended data")]
    pub follow: bool,

    /// Poll interval while following, in milliseconds
    #[arg(
        long = "poll-interval-ms",
        value_name = "MILLIS",
        default_value_t = crate::constants::DEFAULT_POLL_INTERVAL_MS,
        help = "Poll interval while following, in milliseconds"
    )]
    pub poll_interval_ms: u64,
}

/// Arguments for the validate command (dry run)
#[derive(Debug, Clone, Parser)]
pub struct ValidateArgs {
    /// Input telemetry file to validate
    #[arg(
        short = 'i',
        long = "input",
        value_name = "PATH",
        help = "Input telemetry file to validate"
    )]
    pub input_path: PathBuf,

    /// Instrument format family of the input file
    #[arg(
        short = 'f',
        long = "format",
        value_name = "FORMAT",
        help = "Instrument format family (glider, sio, cspp, packet)"
    )]
    pub format: FormatKind,
}

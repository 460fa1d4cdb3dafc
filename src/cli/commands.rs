//! Command implementations for the particle ingestion CLI
//!
//! This module contains the command execution logic: wiring a file
//! harvester to a JSON-lines particle sink for `process`, and a dry-run
//! statistics report for `validate`.

use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::app::adapters::filesystem::FileHarvester;
use crate::app::models::Particle;
use crate::app::services::parse_state::ParseState;
use crate::app::services::parser_engine::{IngestStats, ParserEngine, ParticleSink};
use crate::cli::args::{Args, Commands, ProcessArgs, ValidateArgs};
use crate::config::ParserConfig;
use crate::{Error, Recoverable, Result};

/// Dispatch the parsed CLI arguments to their command
pub async fn run(args: Args, cancel: CancellationToken) -> Result<IngestStats> {
    match args.command {
        Some(Commands::Process(process_args)) => process(process_args, cancel).await,
        Some(Commands::Validate(validate_args)) => validate(validate_args).await,
        None => Err(Error::configuration(
            "No command specified; run with --help for usage".to_string(),
        )),
    }
}

/// Sink writing each particle as one JSON line
struct JsonLinesSink<W: Write> {
    writer: W,
    write_error: Option<std::io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            write_error: None,
        }
    }
}

impl<W: Write> ParticleSink for JsonLinesSink<W> {
    fn on_sample(&mut self, particle: Particle) {
        if self.write_error.is_some() {
            return;
        }
        let result = serde_json::to_string(&particle)
            .map_err(|e| std::io::Error::other(e.to_string()))
            .and_then(|line| writeln!(self.writer, "{}", line));
        if let Err(error) = result {
            self.write_error = Some(error);
        }
    }

    fn on_state(&mut self, _state: ParseState, _stream_fully_ingested: bool) {
        // Checkpointing is the harvester's job.
    }

    fn on_exception(&mut self, exception: Recoverable) {
        warn!("Recoverable parse exception: {}", exception);
    }
}

/// Ingest a file, emitting particles and checkpointing parse state
async fn process(args: ProcessArgs, cancel: CancellationToken) -> Result<IngestStats> {
    let config = ParserConfig::new(args.format);
    let harvester = FileHarvester::new(&args.input_path, config)
        .with_follow(args.follow, Duration::from_millis(args.poll_interval_ms));

    if args.fresh && harvester.state_path().exists() {
        std::fs::remove_file(harvester.state_path())
            .map_err(|e| Error::io("Failed to remove existing checkpoint", e))?;
    }

    let stats = match args.output_path {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .map_err(|e| Error::io(format!("Failed to create {}", path.display()), e))?;
            let mut sink = JsonLinesSink::new(std::io::BufWriter::new(file));
            let stats = harvester.run(&mut sink, cancel).await?;
            finish_sink(sink)?;
            stats
        }
        None => {
            let mut sink = JsonLinesSink::new(std::io::stdout().lock());
            let stats = harvester.run(&mut sink, cancel).await?;
            finish_sink(sink)?;
            stats
        }
    };

    report_stats(&args.input_path.display().to_string(), &stats);
    Ok(stats)
}

/// Surface any deferred write failure from the sink
fn finish_sink<W: Write>(mut sink: JsonLinesSink<W>) -> Result<()> {
    if let Some(error) = sink.write_error.take() {
        return Err(Error::io("Failed to write particle output", error));
    }
    sink.writer
        .flush()
        .map_err(|e| Error::io("Failed to flush particle output", e))
}

/// Sink that counts particles without emitting them
#[derive(Default)]
struct DiscardingSink {
    exceptions: usize,
}

impl ParticleSink for DiscardingSink {
    fn on_sample(&mut self, _particle: Particle) {}

    fn on_state(&mut self, _state: ParseState, _stream_fully_ingested: bool) {}

    fn on_exception(&mut self, exception: Recoverable) {
        self.exceptions += 1;
        warn!("Recoverable parse exception: {}", exception);
    }
}

/// Dry-run a file and report statistics without checkpoints or output
async fn validate(args: ValidateArgs) -> Result<IngestStats> {
    let config = ParserConfig::new(args.format);
    let stream_id = args.input_path.display().to_string();
    let mut engine = ParserEngine::new(config, stream_id.clone())?;
    let mut sink = DiscardingSink::default();

    let content = tokio::fs::read(&args.input_path)
        .await
        .map_err(|e| Error::io(format!("Failed to read {}", args.input_path.display()), e))?;

    engine.add_data(&content, Utc::now())?;
    engine.poll(&mut sink)?;
    engine.close(&mut sink)?;

    let stats = engine.stats().clone();
    report_stats(&stream_id, &stats);
    Ok(stats)
}

/// Print a summary in the same shape for both commands
fn report_stats(source: &str, stats: &IngestStats) {
    println!();
    println!("Ingestion summary for {}", source);
    println!("  chunks matched:      {}", stats.chunks_matched);
    println!(
        "  particles emitted:   {} ({} metadata)",
        stats.particles_emitted, stats.metadata_particles
    );
    println!("  recoverable errors:  {}", stats.recoverable_errors);
    println!("  non-data bytes:      {}", stats.non_data_bytes);
    println!("  success rate:        {:.1}%", stats.success_rate());
}

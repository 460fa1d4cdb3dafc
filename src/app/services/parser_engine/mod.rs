//! Parser driver loop
//!
//! This module ties the chunker, format handler, and parse state together:
//! it pulls non-data and data chunks in strict stream order, emits
//! particles through the sink exactly once, and pushes an owned parse
//! state snapshot after every mutation so the owning harvester can
//! checkpoint durably at any moment.

pub mod resume;
pub mod stats;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::app::models::Particle;
use crate::app::services::chunker::{Chunk, Chunker, NonDataSpan};
use crate::app::services::formats::FormatHandler;
use crate::app::services::parse_state::ParseState;
use crate::config::ParserConfig;
use crate::{Error, Recoverable, Result};
pub use stats::IngestStats;

/// Where the driver loop stands after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// No complete chunk is available; feed more bytes and poll again
    AwaitingChunk,
    /// The stream was closed; no further bytes will be accepted
    Done,
}

/// Result of one poll of the driver loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Particles emitted during this poll
    pub particles_emitted: usize,

    /// Engine status after the poll
    pub status: EngineStatus,
}

/// Receiver for the engine's three event channels
///
/// `on_state` hands over an owned snapshot, never a live reference, so a
/// persisted checkpoint cannot alias state the loop keeps mutating.
pub trait ParticleSink {
    /// One successfully built particle, in stream order
    fn on_sample(&mut self, particle: Particle);

    /// Parse state after a mutation; `stream_fully_ingested` signals the
    /// source may be archived
    fn on_state(&mut self, state: ParseState, stream_fully_ingested: bool);

    /// One recoverable per-record or per-span failure
    fn on_exception(&mut self, exception: Recoverable);
}

/// The per-stream parsing engine
///
/// Single-threaded and cooperative: the only suspension point is
/// [`ParserEngine::poll`] returning with `AwaitingChunk`, after which the
/// caller supplies more bytes via [`ParserEngine::add_data`] and polls
/// again. The engine itself never sleeps and never performs I/O.
pub struct ParserEngine {
    config: ParserConfig,
    stream_id: String,
    chunker: Chunker,
    state: ParseState,
    format: FormatHandler,
    status: EngineStatus,
    stats: IngestStats,
}

impl std::fmt::Debug for ParserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserEngine")
            .field("stream_id", &self.stream_id)
            .field("format", &self.config.format)
            .field("position", &self.state.position())
            .field("status", &self.status)
            .finish()
    }
}

impl ParserEngine {
    /// Open a fresh stream
    pub fn new(config: ParserConfig, stream_id: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let stream_id = stream_id.into();
        let format = FormatHandler::for_config(&config)?;
        let chunker = Chunker::new(format.sieves()?, config.buffer_limit);

        info!("Opened stream '{}' as {}", stream_id, config.format);
        Ok(Self {
            config,
            stream_id,
            chunker,
            state: ParseState::new(),
            format,
            status: EngineStatus::AwaitingChunk,
            stats: IngestStats::new(),
        })
    }

    /// Stream identifier this engine was opened with
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Current parse state (live reference, for inspection only)
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Ingestion counters
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Current engine status
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Push a fragment of the stream into the engine
    pub fn add_data(&mut self, data: &[u8], arrival: DateTime<Utc>) -> Result<()> {
        if self.status == EngineStatus::Done {
            return Err(Error::configuration(format!(
                "Stream '{}' is closed and accepts no more data",
                self.stream_id
            )));
        }
        self.chunker.add_data(data, arrival)
    }

    /// Drain everything currently extractable, in strict stream order
    ///
    /// Returns with `AwaitingChunk` when no complete chunk remains; this
    /// is a polling return, not a blocking wait.
    pub fn poll(&mut self, sink: &mut dyn ParticleSink) -> Result<PollSummary> {
        if self.status == EngineStatus::Done {
            return Ok(PollSummary {
                particles_emitted: 0,
                status: EngineStatus::Done,
            });
        }

        let mut emitted = 0;
        loop {
            while let Some(span) = self.chunker.next_non_data(true)? {
                self.report_non_data(span, sink)?;
            }

            match self.chunker.next_data()? {
                Some(chunk) => emitted += self.consume_chunk(chunk, sink)?,
                None => break,
            }
        }

        Ok(PollSummary {
            particles_emitted: emitted,
            status: EngineStatus::AwaitingChunk,
        })
    }

    /// Close the stream: drain, surface trailing bytes, go terminal
    ///
    /// Closing with unmatched bytes still buffered is legitimate; those
    /// bytes are reported as a trailing-data warning, never dropped
    /// invisibly.
    pub fn close(&mut self, sink: &mut dyn ParticleSink) -> Result<PollSummary> {
        if self.status == EngineStatus::Done {
            return Ok(PollSummary {
                particles_emitted: 0,
                status: EngineStatus::Done,
            });
        }

        let summary = self.poll(sink)?;

        if let Some(span) = self.chunker.take_remaining() {
            warn!(
                "Stream '{}' closed with {} unparsed trailing bytes at {}",
                self.stream_id,
                span.data.len(),
                span.start
            );
            self.stats.recoverable_errors += 1;
            self.stats.non_data_bytes += span.data.len() as u64;
            sink.on_exception(Recoverable::TrailingBytes {
                start: span.start,
                len: span.data.len(),
            });
            self.state.advance_to(span.end)?;
        }

        self.status = EngineStatus::Done;
        self.push_state(sink, true);

        info!(
            "Closed stream '{}': {} particles, {} recoverable errors",
            self.stream_id, self.stats.particles_emitted, self.stats.recoverable_errors
        );
        Ok(PollSummary {
            particles_emitted: summary.particles_emitted,
            status: EngineStatus::Done,
        })
    }

    /// Report one non-data span and advance past it
    fn report_non_data(&mut self, span: NonDataSpan, sink: &mut dyn ParticleSink) -> Result<()> {
        let position = self.state.position();
        let exception = if span.start < position {
            // The stream produced bytes it had already claimed to have
            // fully processed; report the framing bug, keep going.
            Recoverable::NonDataBeforePosition {
                start: span.start,
                end: span.end,
                position,
            }
        } else {
            Recoverable::UnexpectedNonData {
                start: span.start,
                end: span.end,
                preview: span.preview(),
            }
        };

        self.stats.recoverable_errors += 1;
        self.stats.non_data_bytes += span.data.len() as u64;
        sink.on_exception(exception);

        self.state.advance_to(span.end.max(position))?;
        self.push_state(sink, false);
        Ok(())
    }

    /// Decode one chunk and emit its particles with state bookkeeping
    fn consume_chunk(&mut self, chunk: Chunk, sink: &mut dyn ParticleSink) -> Result<usize> {
        self.stats.chunks_matched += 1;
        debug!(
            "Consuming chunk [{}, {}) on stream '{}'",
            chunk.start, chunk.end, self.stream_id
        );

        let output = self
            .format
            .handle_chunk(&chunk, &mut self.state, &self.stream_id)?;
        let mut emitted = 0;

        for exception in output.exceptions {
            self.stats.recoverable_errors += 1;
            sink.on_exception(exception);
        }

        if let Some(metadata) = output.metadata {
            if self.config.emit_metadata && !self.state.metadata_sent() {
                sink.on_sample(metadata);
                self.state.mark_metadata_sent();
                self.stats.particles_emitted += 1;
                self.stats.metadata_particles += 1;
                emitted += 1;
                self.push_state(sink, false);
            }
        }

        let total = output.records.len();
        if total > 1 {
            // Multi-record block: per-record bookkeeping so a restart
            // mid-block resumes at the correct sub-record.
            self.state.begin_block(chunk.start, chunk.end, total as u32)?;
            let skip = self.state.block_emitted(chunk.start) as usize;
            if skip > 0 {
                debug!(
                    "Skipping {} already-delivered records of block at {}",
                    skip, chunk.start
                );
            }

            for particle in output.records.into_iter().skip(skip) {
                sink.on_sample(particle);
                self.state.record_block_emission(chunk.start)?;
                self.stats.particles_emitted += 1;
                emitted += 1;
                self.push_state(sink, false);
            }
            self.state.complete_block(chunk.start)?;
        } else {
            for particle in output.records {
                sink.on_sample(particle);
                self.stats.particles_emitted += 1;
                emitted += 1;
            }
        }

        self.state.advance_to(chunk.end)?;
        self.push_state(sink, false);
        Ok(emitted)
    }

    /// Hand the sink an owned snapshot of the current state
    fn push_state(&mut self, sink: &mut dyn ParticleSink, stream_fully_ingested: bool) {
        let mut snapshot = self.state.clone();
        let buffered = self.chunker.buffered();
        snapshot.set_unprocessed(if buffered > 0 {
            vec![(self.chunker.base(), self.chunker.base() + buffered as u64)]
        } else {
            Vec::new()
        });
        sink.on_state(snapshot, stream_fully_ingested);
    }
}

//! Particle Ingest Library
//!
//! A Rust library for converting raw oceanographic instrument telemetry
//! (glider ASCII tables, SIO framed binary blocks, CSPP profiler files,
//! live packet feeds) into structured, timestamped particle records.
//!
//! This library provides tools for:
//! - Incremental chunking of arbitrarily fragmented byte streams
//! - Format-specific record matching inside noisy or mixed payloads
//! - Durable parse-state checkpoints so ingestion survives restarts
//! - Building typed particles with derived timestamps and quality flags
//! - A driver loop that emits particles exactly once, in stream order
//! - Recoverable per-record error reporting that never halts a stream

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod chunker;
        pub mod formats;
        pub mod parse_state;
        pub mod parser_engine;
        pub mod particle_builder;
    }
    pub mod adapters {
        pub mod filesystem;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{FieldValue, Particle, QualityFlag};
pub use app::services::parser_engine::{ParserEngine, ParticleSink};
pub use config::{FormatKind, ParserConfig};

/// Result type alias for particle ingestion
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error types for ingestion operations
///
/// Everything here aborts the owning stream. Per-record and per-span
/// failures are *not* errors in this sense; they travel through the
/// exception channel as [`Recoverable`] values and the stream keeps going.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Two sieves (or one sieve twice) claimed overlapping byte ranges
    #[error(
        "Ambiguous framing: overlapping record claims [{first_start}, {first_end}) and [{second_start}, {second_end})"
    )]
    AmbiguousFraming {
        first_start: u64,
        first_end: u64,
        second_start: u64,
        second_end: u64,
    },

    /// Unconsumed buffer grew past the configured bound
    #[error("Chunker buffer overflow: {buffered} bytes buffered, limit is {limit}")]
    BufferOverflow { buffered: usize, limit: usize },

    /// Required stream preamble/header is absent or short at stream open
    #[error("Missing preamble in stream '{stream}': {message}")]
    MissingPreamble { stream: String, message: String },

    /// Restored parse state blob is corrupt or missing required fields
    #[error("Parse state restore failed: {message}")]
    StateRestore { message: String },

    /// Parse state snapshot could not be serialized or deserialized
    #[error("Parse state serialization error: {message}")]
    StateSerialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Restored position lies beyond the end of the stream
    #[error("Resume position {position} exceeds stream length {stream_length}")]
    ResumeBounds { position: u64, stream_length: u64 },

    /// In-progress block bookkeeping is internally inconsistent
    #[error("Inconsistent block bookkeeping: {emitted} records emitted of {total} total")]
    InconsistentBlock { emitted: u32, total: u32 },

    /// An advance would move the parse position backwards
    #[error("Position regression: at {current}, advance requested to {requested}")]
    PositionRegression { current: u64, requested: u64 },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing-preamble error
    pub fn missing_preamble(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingPreamble {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a state restore error
    pub fn state_restore(message: impl Into<String>) -> Self {
        Self::StateRestore {
            message: message.into(),
        }
    }

    /// Create a state serialization error
    pub fn state_serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::StateSerialization {
            message: message.into(),
            source,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

/// Recoverable per-record and per-span conditions
///
/// Reported through the sink's exception channel; the offending bytes are
/// still consumed so the stream always makes forward progress.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Recoverable {
    /// One record's fields failed decode or validation
    #[error("Sample decode failed at offset {offset}: {reason}")]
    SampleDecode { offset: u64, reason: String },

    /// A matched record failed its checksum
    #[error(
        "Checksum mismatch at offset {offset}: declared {declared:#06x}, computed {computed:#06x}"
    )]
    BadChecksum {
        offset: u64,
        declared: u16,
        computed: u16,
    },

    /// Bytes between records matched no known record shape
    #[error("Unexpected non-data at [{start}, {end}): {preview}")]
    UnexpectedNonData {
        start: u64,
        end: u64,
        preview: String,
    },

    /// Non-data appeared before a position already marked consumed
    #[error("Non-data at [{start}, {end}) precedes consumed position {position}")]
    NonDataBeforePosition { start: u64, end: u64, position: u64 },

    /// The stream closed with unmatched bytes still buffered
    #[error("Stream closed with {len} unparsed trailing bytes at offset {start}")]
    TrailingBytes { start: u64, len: usize },
}

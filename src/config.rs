//! Configuration management and validation.
//!
//! Provides the per-stream static configuration handed to the engine at
//! construction: which instrument format to parse, buffer bounds, and the
//! numeric tuning constants (timer rollover slack, tick rates) that differ
//! between instrument families.

use crate::constants::{DEFAULT_BUFFER_LIMIT, packet};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported instrument format families
///
/// Resolved once at engine construction; every format is a fixed sieve plus
/// a fixed particle field table, never a runtime lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Glider ASCII telemetry tables with self-describing preambles
    Glider,
    /// SIO controller framed binary blocks
    Sio,
    /// CSPP profiler tab-delimited uplink files
    Cspp,
    /// Live telemetry packet envelopes
    Packet,
}

impl FormatKind {
    /// All supported format names, for CLI help and validation messages
    pub fn all_names() -> &'static [&'static str] {
        &["glider", "sio", "cspp", "packet"]
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FormatKind::Glider => "glider",
            FormatKind::Sio => "sio",
            FormatKind::Cspp => "cspp",
            FormatKind::Packet => "packet",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for FormatKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "glider" => Ok(FormatKind::Glider),
            "sio" => Ok(FormatKind::Sio),
            "cspp" => Ok(FormatKind::Cspp),
            "packet" => Ok(FormatKind::Packet),
            other => Err(Error::configuration(format!(
                "Unknown format '{}': expected one of {}",
                other,
                FormatKind::all_names().join(", ")
            ))),
        }
    }
}

/// Tuning for formats that embed a wrapping hardware tick counter
///
/// The slack threshold decides when a counter value lower than its
/// predecessor means the counter wrapped rather than jittered. It varies
/// per instrument family and is deliberately configuration, not behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerConfig {
    /// Counter period: the value at which the hardware counter wraps
    pub period: f64,

    /// Backward jump larger than this is treated as a rollover
    pub slack: f64,

    /// Counter ticks per second
    pub tick_rate_hz: f64,

    /// POSIX seconds corresponding to counter epoch zero
    pub base_time: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period: packet::DEFAULT_TICK_PERIOD,
            slack: packet::DEFAULT_ROLLOVER_SLACK,
            tick_rate_hz: packet::DEFAULT_TICK_RATE_HZ,
            base_time: 0.0,
        }
    }
}

impl TimerConfig {
    /// Validate tuning values for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.period <= 0.0 {
            return Err(Error::configuration(format!(
                "Timer period {} must be positive",
                self.period
            )));
        }

        if self.slack <= 0.0 || self.slack >= self.period {
            return Err(Error::configuration(format!(
                "Timer slack {} must lie strictly between 0 and the period {}",
                self.slack, self.period
            )));
        }

        if self.tick_rate_hz <= 0.0 {
            return Err(Error::configuration(format!(
                "Tick rate {} Hz must be positive",
                self.tick_rate_hz
            )));
        }

        Ok(())
    }
}

/// Per-stream static configuration for the parser engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Instrument format family this stream carries
    pub format: FormatKind,

    /// Maximum unconsumed bytes the chunker may hold
    pub buffer_limit: usize,

    /// Whether the format's one-shot metadata particle should be emitted
    pub emit_metadata: bool,

    /// Wrapping-counter tuning, used by formats with hardware tick clocks
    pub timer: TimerConfig,
}

impl ParserConfig {
    /// Create a configuration for the given format with default tuning
    pub fn new(format: FormatKind) -> Self {
        Self {
            format,
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            emit_metadata: true,
            timer: TimerConfig::default(),
        }
    }

    /// Validate the configuration before a stream is opened
    pub fn validate(&self) -> Result<()> {
        if self.buffer_limit == 0 {
            return Err(Error::configuration(
                "Buffer limit must be greater than zero".to_string(),
            ));
        }

        self.timer.validate()?;

        debug!(
            "Validated parser config: format={}, buffer_limit={}",
            self.format, self.buffer_limit
        );
        Ok(())
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new(FormatKind::Glider)
    }
}

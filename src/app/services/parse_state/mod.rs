//! Durable parse-state bookkeeping
//!
//! This module provides the single structure that lets a stream resume
//! after a restart at exactly the right byte and semantic point: the
//! monotonic parse position, the one-shot metadata flag, in-progress
//! multi-record block bookkeeping, and the wrapping-timer tracker.

pub mod timer;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TimerConfig;
use crate::constants::STATE_FORMAT_VERSION;
use crate::{Error, Result};
pub use timer::TimerTracker;

/// Progress through one multi-record block
///
/// A framed block may wrap several fixed-width records; if the process
/// dies after emitting some of them, this entry lets the resumed stream
/// skip exactly the records already delivered downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProgress {
    /// Stream offset of the block's first byte
    pub start: u64,

    /// Stream offset one past the block's last byte
    pub end: u64,

    /// Records the block wraps in total
    pub total_records: u32,

    /// Records already emitted from this block
    pub records_emitted: u32,
}

impl BlockProgress {
    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(Error::state_restore(format!(
                "Block span [{}, {}) is empty or inverted",
                self.start, self.end
            )));
        }

        if self.records_emitted > self.total_records {
            return Err(Error::InconsistentBlock {
                emitted: self.records_emitted,
                total: self.total_records,
            });
        }

        Ok(())
    }
}

/// Durable per-stream parse state
///
/// Mutated exactly once per fully parsed record and handed to the owning
/// driver layer as an owned snapshot on every mutation, so checkpoints
/// never alias a structure still being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseState {
    version: u32,
    position: u64,
    metadata_sent: bool,
    in_process: Vec<BlockProgress>,
    unprocessed: Vec<(u64, u64)>,
    timer: TimerTracker,
    columns: Vec<String>,
    preamble: Vec<(String, String)>,
    header_lines_seen: u32,
}

impl ParseState {
    /// Create fresh state for a stream starting at byte zero
    pub fn new() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            position: 0,
            metadata_sent: false,
            in_process: Vec::new(),
            unprocessed: Vec::new(),
            timer: TimerTracker::default(),
            columns: Vec::new(),
            preamble: Vec::new(),
            header_lines_seen: 0,
        }
    }

    /// Restore state from a serialized snapshot
    ///
    /// A corrupt or foreign blob must not silently parse from byte zero,
    /// so both deserialization failures and inconsistent bookkeeping are
    /// fatal here.
    pub fn from_json(blob: &str) -> Result<Self> {
        let state: ParseState = serde_json::from_str(blob)
            .map_err(|e| Error::state_restore(format!("Snapshot did not deserialize: {}", e)))?;
        state.validate()?;
        debug!(
            "Restored parse state: position={}, metadata_sent={}, blocks={}",
            state.position,
            state.metadata_sent,
            state.in_process.len()
        );
        Ok(state)
    }

    /// Serialize the state to its durable snapshot form
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::state_serialization("Snapshot serialization failed", e))
    }

    /// Validate restored or constructed state
    pub fn validate(&self) -> Result<()> {
        if self.version != STATE_FORMAT_VERSION {
            return Err(Error::state_restore(format!(
                "Snapshot version {} is not the supported version {}",
                self.version, STATE_FORMAT_VERSION
            )));
        }

        for block in &self.in_process {
            block.validate()?;
            if block.start < self.position {
                return Err(Error::state_restore(format!(
                    "In-progress block at {} lies before parse position {}",
                    block.start, self.position
                )));
            }
        }

        for (start, end) in &self.unprocessed {
            if end <= start {
                return Err(Error::state_restore(format!(
                    "Unprocessed span [{}, {}) is empty or inverted",
                    start, end
                )));
            }
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Position
    // -------------------------------------------------------------------------

    /// Byte offset of the stream fully parsed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Advance the parse position; it never decreases
    pub fn advance_to(&mut self, offset: u64) -> Result<()> {
        if offset < self.position {
            return Err(Error::PositionRegression {
                current: self.position,
                requested: offset,
            });
        }
        self.position = offset;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // One-shot metadata
    // -------------------------------------------------------------------------

    /// Whether the stream's one-shot metadata particle has been emitted
    pub fn metadata_sent(&self) -> bool {
        self.metadata_sent
    }

    /// Record that the one-shot metadata particle went out
    pub fn mark_metadata_sent(&mut self) {
        self.metadata_sent = true;
    }

    // -------------------------------------------------------------------------
    // Multi-record block bookkeeping
    // -------------------------------------------------------------------------

    /// Begin (or rejoin, after resume) a multi-record block
    pub fn begin_block(&mut self, start: u64, end: u64, total_records: u32) -> Result<()> {
        if let Some(existing) = self.in_process.iter().find(|b| b.start == start) {
            if existing.end != end || existing.total_records != total_records {
                return Err(Error::state_restore(format!(
                    "Restored block at {} disagrees with stream contents: [{}, {}) x{} vs [{}, {}) x{}",
                    start,
                    existing.start,
                    existing.end,
                    existing.total_records,
                    start,
                    end,
                    total_records
                )));
            }
            return Ok(());
        }

        let block = BlockProgress {
            start,
            end,
            total_records,
            records_emitted: 0,
        };
        block.validate()?;
        self.in_process.push(block);
        Ok(())
    }

    /// Records already emitted from the block starting at `start`
    pub fn block_emitted(&self, start: u64) -> u32 {
        self.in_process
            .iter()
            .find(|b| b.start == start)
            .map(|b| b.records_emitted)
            .unwrap_or(0)
    }

    /// Count one more record emitted from the block starting at `start`
    pub fn record_block_emission(&mut self, start: u64) -> Result<()> {
        let block = self
            .in_process
            .iter_mut()
            .find(|b| b.start == start)
            .ok_or_else(|| {
                Error::state_restore(format!("No in-progress block starts at {}", start))
            })?;

        if block.records_emitted >= block.total_records {
            return Err(Error::InconsistentBlock {
                emitted: block.records_emitted + 1,
                total: block.total_records,
            });
        }
        block.records_emitted += 1;
        Ok(())
    }

    /// Retire a fully emitted block
    pub fn complete_block(&mut self, start: u64) -> Result<()> {
        let index = self
            .in_process
            .iter()
            .position(|b| b.start == start)
            .ok_or_else(|| {
                Error::state_restore(format!("No in-progress block starts at {}", start))
            })?;

        let block = self.in_process[index];
        if block.records_emitted != block.total_records {
            return Err(Error::InconsistentBlock {
                emitted: block.records_emitted,
                total: block.total_records,
            });
        }
        self.in_process.remove(index);
        Ok(())
    }

    /// In-progress blocks, earliest first
    pub fn in_process(&self) -> &[BlockProgress] {
        &self.in_process
    }

    // -------------------------------------------------------------------------
    // Unprocessed spans
    // -------------------------------------------------------------------------

    /// Replace the record of byte spans read but not yet matched
    pub fn set_unprocessed(&mut self, spans: Vec<(u64, u64)>) {
        self.unprocessed = spans;
    }

    /// Byte spans read but not yet matched
    pub fn unprocessed(&self) -> &[(u64, u64)] {
        &self.unprocessed
    }

    // -------------------------------------------------------------------------
    // Timer rollover
    // -------------------------------------------------------------------------

    /// Feed one hardware counter value; returns the derived monotonic value
    pub fn record_timer(&mut self, ticks: f64, config: &TimerConfig) -> f64 {
        self.timer.observe(ticks, config)
    }

    /// Rollover epochs seen so far
    pub fn timer_epochs(&self) -> u32 {
        self.timer.rollover_epochs()
    }

    // -------------------------------------------------------------------------
    // Format-specific derived state (glider column declarations)
    // -------------------------------------------------------------------------

    /// Columns the stream's preamble declared (empty until parsed)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Record the stream's declared column set
    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    /// Record one parsed preamble key/value pair
    pub fn push_preamble(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.preamble.push((key.into(), value.into()));
    }

    /// Look up a preamble value by key
    pub fn preamble_value(&self, key: &str) -> Option<&str> {
        self.preamble
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Preamble and label lines consumed so far
    pub fn header_lines_seen(&self) -> u32 {
        self.header_lines_seen
    }

    /// Count one more preamble or label line as consumed
    pub fn bump_header_lines(&mut self) {
        self.header_lines_seen += 1;
    }
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

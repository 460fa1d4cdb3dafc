//! Ingestion statistics
//!
//! Counters tracking how a stream parsed, for CLI reporting and for
//! deciding whether a recoverable-error rate deserves operator attention.

use serde::{Deserialize, Serialize};

/// Simple ingestion statistics for one stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    /// Chunks the sieves recognized
    pub chunks_matched: usize,

    /// Particles emitted, metadata included
    pub particles_emitted: usize,

    /// Of those, one-shot metadata particles
    pub metadata_particles: usize,

    /// Recoverable per-record and per-span failures
    pub recoverable_errors: usize,

    /// Bytes that matched no record shape
    pub non_data_bytes: u64,
}

impl IngestStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self {
            chunks_matched: 0,
            particles_emitted: 0,
            metadata_particles: 0,
            recoverable_errors: 0,
            non_data_bytes: 0,
        }
    }

    /// Emissions as a percentage of emissions plus failures
    pub fn success_rate(&self) -> f64 {
        let attempts = self.particles_emitted + self.recoverable_errors;
        if attempts == 0 {
            0.0
        } else {
            (self.particles_emitted as f64 / attempts as f64) * 100.0
        }
    }

    /// Check if the stream parsed mostly cleanly (>90% success rate)
    pub fn is_clean(&self) -> bool {
        self.success_rate() > 90.0
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

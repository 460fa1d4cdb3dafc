//! Wrapping hardware-counter tracking
//!
//! Several instrument families embed a fixed-width tick counter in their
//! records. The counter wraps; deriving a monotonic timestamp requires
//! counting rollover epochs. A backward jump larger than the configured
//! slack means the counter wrapped; smaller backward jumps are jitter and
//! must not bump the epoch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TimerConfig;

/// Rollover-epoch tracker for one stream's hardware counter
///
/// Only the observation history persists in parse state; the period and
/// slack stay in configuration so retuning an instrument never requires
/// rewriting checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimerTracker {
    rollover_epochs: u32,
    last_value: Option<f64>,
}

impl TimerTracker {
    /// Feed one raw counter value; returns the unwrapped monotonic value
    ///
    /// The derived value is `epochs * period + value`, in counter ticks.
    pub fn observe(&mut self, value: f64, config: &TimerConfig) -> f64 {
        if let Some(last) = self.last_value {
            if last - value > config.slack {
                self.rollover_epochs += 1;
                debug!(
                    "Timer rollover detected: {} -> {} (epoch {})",
                    last, value, self.rollover_epochs
                );
            }
        }
        self.last_value = Some(value);
        self.rollover_epochs as f64 * config.period + value
    }

    /// Rollover epochs counted so far
    pub fn rollover_epochs(&self) -> u32 {
        self.rollover_epochs
    }

    /// Most recent raw counter value observed
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }
}

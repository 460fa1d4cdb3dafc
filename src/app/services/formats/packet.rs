//! Live telemetry packet envelope format
//!
//! Live feeds deliver length-prefixed envelopes: sync bytes, channel,
//! a wrapping hardware tick counter, payload length, payload, and an
//! additive checksum. The tick counter is the only clock the packets
//! carry; the parse state's rollover tracker unwraps it into a monotonic
//! internal timestamp.

use std::ops::Range;

use tracing::debug;

use super::{ChunkOutput, additive_checksum, be_i16, be_u16, be_u32};
use crate::app::models::{FieldValue, Particle, Provenance, TimestampKind, utc_from_posix};
use crate::app::services::chunker::{Chunk, Sieve};
use crate::app::services::parse_state::ParseState;
use crate::config::TimerConfig;
use crate::constants::packet;
use crate::{Recoverable, Result};

/// Sieve claiming complete packet envelopes
#[derive(Debug)]
pub struct PacketSieve;

impl Sieve for PacketSieve {
    fn name(&self) -> &'static str {
        "packet_envelope"
    }

    fn scan(&self, window: &[u8]) -> Vec<Range<usize>> {
        let mut claims = Vec::new();
        let mut from = 0;

        while from + packet::SYNC.len() <= window.len() {
            if window[from..from + 2] != packet::SYNC {
                from += 1;
                continue;
            }

            if from + packet::HEADER_LEN > window.len() {
                // Envelope header still arriving.
                break;
            }

            let payload_len = be_u16(window, from + 8) as usize;
            if payload_len > packet::MAX_PAYLOAD_LEN {
                // Implausible length: this sync was noise.
                from += 1;
                continue;
            }

            let total = packet::HEADER_LEN + payload_len + packet::CHECKSUM_LEN;
            if from + total > window.len() {
                // Declared length exceeds what has arrived: wait.
                break;
            }

            claims.push(from..from + total);
            from += total;
        }

        claims
    }
}

/// Packet format handler
#[derive(Debug)]
pub struct PacketFormat {
    timer: TimerConfig,
}

impl PacketFormat {
    /// Create the handler with its per-instrument timer tuning
    pub fn new(timer: TimerConfig) -> Self {
        Self { timer }
    }

    /// One sieve: complete envelopes
    pub fn sieves(&self) -> Result<Vec<Box<dyn Sieve>>> {
        Ok(vec![Box::new(PacketSieve)])
    }

    /// Decode one envelope into a velocity sample particle
    pub fn handle_chunk(
        &self,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let data = &chunk.data;
        let channel = be_u16(data, 2);
        let ticks = be_u32(data, 4);
        let payload_len = be_u16(data, 8) as usize;
        let payload = &data[packet::HEADER_LEN..packet::HEADER_LEN + payload_len];

        let declared = be_u16(data, packet::HEADER_LEN + payload_len);
        let computed = additive_checksum(payload);
        if declared != computed {
            return Ok(ChunkOutput::exception(Recoverable::BadChecksum {
                offset: chunk.start,
                declared,
                computed,
            }));
        }

        if payload_len != packet::PAYLOAD_LEN {
            return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                offset: chunk.start,
                reason: format!(
                    "Unsupported payload length {} (expected {})",
                    payload_len,
                    packet::PAYLOAD_LEN
                ),
            }));
        }

        // Only validated envelopes feed the rollover tracker.
        let unwrapped = state.record_timer(ticks as f64, &self.timer);
        let seconds = self.timer.base_time + unwrapped / self.timer.tick_rate_hz;
        let internal = match utc_from_posix(seconds) {
            Some(internal) => internal,
            None => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: format!("Derived packet time {} is out of range", seconds),
                }));
            }
        };

        debug!(
            "Packet on channel {} at offset {}: ticks={} epochs={}",
            channel,
            chunk.start,
            ticks,
            state.timer_epochs()
        );

        let values = vec![
            ("channel".to_string(), FieldValue::Integer(channel as i64)),
            ("tick_count".to_string(), FieldValue::Integer(ticks as i64)),
            (
                "velocity_east".to_string(),
                FieldValue::Float(be_i16(payload, 0) as f64 / 1000.0),
            ),
            (
                "velocity_north".to_string(),
                FieldValue::Float(be_i16(payload, 2) as f64 / 1000.0),
            ),
            (
                "velocity_up".to_string(),
                FieldValue::Float(be_i16(payload, 4) as f64 / 1000.0),
            ),
            (
                "amplitude".to_string(),
                FieldValue::Integer(be_i16(payload, 6) as i64),
            ),
        ];

        let particle = Particle::new(
            stream_id.to_string(),
            "packet_velocity".to_string(),
            Some(internal),
            chunk.arrival,
            TimestampKind::Internal,
            Provenance {
                start: chunk.start,
                end: chunk.end,
            },
            values,
        )?;

        Ok(ChunkOutput {
            metadata: None,
            records: vec![particle],
            exceptions: Vec::new(),
        })
    }
}

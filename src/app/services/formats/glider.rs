//! Glider ASCII telemetry format
//!
//! Glider segment files are self-describing: a fixed `key: value`
//! preamble, three label rows (column names, units, byte sizes), then
//! whitespace-delimited data rows where `NaN` marks a sensor that did not
//! report this cycle. Each file declares its own column set, so the
//! science particle reconciles every row against its fixed field table.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::ChunkOutput;
use crate::app::models::{FieldValue, Particle, Provenance, TimestampKind, utc_from_posix};
use crate::app::services::chunker::{Chunk, RegexSieve, Sieve};
use crate::app::services::parse_state::ParseState;
use crate::app::services::particle_builder::{
    FieldKind, FieldSpec, ParticleSpec, coerce_token, reconcile_fields,
};
use crate::constants::glider;
use crate::{Error, Recoverable, Result};

/// Glider format handler
#[derive(Debug)]
pub struct GliderFormat {
    science_spec: ParticleSpec,
}

impl GliderFormat {
    /// Create the handler with its fixed science field table
    pub fn new() -> Self {
        let fields = glider::SCIENCE_COLUMNS
            .iter()
            .map(|&name| FieldSpec::new(name, FieldKind::Float))
            .collect();
        Self {
            science_spec: ParticleSpec::new("glider_science", fields),
        }
    }

    /// One sieve: every complete line is a candidate record
    pub fn sieves(&self) -> Result<Vec<Box<dyn Sieve>>> {
        Ok(vec![Box::new(RegexSieve::new(
            "glider_line",
            r"(?s-u)[^\n]*\n",
        )?)])
    }

    /// Decode one line chunk according to header progress
    pub fn handle_chunk(
        &self,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let preamble_len = glider::REQUIRED_PREAMBLE_KEYS.len() as u32;
        let header_len = preamble_len + glider::LABEL_LINE_COUNT;
        let seen = state.header_lines_seen();

        let line = match std::str::from_utf8(&chunk.data) {
            Ok(line) => line.trim_end_matches(|c| c == '\r' || c == '\n'),
            Err(_) if seen < header_len => {
                return Err(Error::missing_preamble(
                    stream_id,
                    format!("Header line at offset {} is not valid text", chunk.start),
                ));
            }
            Err(_) => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: "Data row is not valid text".to_string(),
                }));
            }
        };

        if seen < preamble_len {
            self.consume_preamble_line(line, seen, state, stream_id)?;
            return Ok(ChunkOutput::default());
        }

        if seen < header_len {
            return self.consume_label_line(line, seen - preamble_len, chunk, state, stream_id);
        }

        self.decode_data_row(line, chunk, state, stream_id)
    }

    /// Parse one `key: value` preamble line; any surprise here is fatal
    fn consume_preamble_line(
        &self,
        line: &str,
        index: u32,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<()> {
        let expected_key = glider::REQUIRED_PREAMBLE_KEYS[index as usize];
        let (key, value) = line.split_once(':').ok_or_else(|| {
            Error::missing_preamble(
                stream_id,
                format!("Expected '{}: <value>', found '{}'", expected_key, line),
            )
        })?;

        if key.trim() != expected_key {
            return Err(Error::missing_preamble(
                stream_id,
                format!("Expected preamble key '{}', found '{}'", expected_key, key.trim()),
            ));
        }

        state.push_preamble(expected_key, value.trim());
        state.bump_header_lines();
        debug!("Consumed preamble line {}: {}", index, expected_key);
        Ok(())
    }

    /// Parse one of the three label rows; the last one yields metadata
    fn consume_label_line(
        &self,
        line: &str,
        label_index: u32,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let declared: usize = state
            .preamble_value("sensor_count")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                Error::missing_preamble(stream_id, "Preamble sensor_count is not a number")
            })?;

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != declared {
            return Err(Error::missing_preamble(
                stream_id,
                format!(
                    "Label row {} has {} columns, preamble declared {}",
                    label_index,
                    tokens.len(),
                    declared
                ),
            ));
        }

        if label_index == 0 {
            state.set_columns(tokens.iter().map(|t| t.to_string()).collect());
        }
        state.bump_header_lines();

        // Units and byte-size rows carry nothing the particles need; the
        // column-name row completes once all three are consumed.
        if label_index + 1 < glider::LABEL_LINE_COUNT {
            return Ok(ChunkOutput::default());
        }

        Ok(ChunkOutput {
            metadata: Some(self.build_metadata(chunk, state, stream_id)?),
            records: Vec::new(),
            exceptions: Vec::new(),
        })
    }

    /// Build the one-shot metadata particle from the stored preamble
    fn build_metadata(
        &self,
        chunk: &Chunk,
        state: &ParseState,
        stream_id: &str,
    ) -> Result<Particle> {
        let fileopen = state.preamble_value("fileopen_time").unwrap_or_default();
        let internal = NaiveDateTime::parse_from_str(fileopen, glider::FILEOPEN_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| {
                Error::missing_preamble(
                    stream_id,
                    format!("Unparseable fileopen_time '{}': {}", fileopen, e),
                )
            })?;

        let values = ["glider_label", "mission_name", "segment_name"]
            .iter()
            .map(|key| {
                let value = state
                    .preamble_value(key)
                    .map(|v| FieldValue::Text(v.to_string()))
                    .unwrap_or(FieldValue::Absent);
                (key.to_string(), value)
            })
            .collect();

        Particle::new(
            stream_id.to_string(),
            "glider_metadata".to_string(),
            Some(internal),
            chunk.arrival,
            TimestampKind::Internal,
            Provenance {
                start: 0,
                end: chunk.end,
            },
            values,
        )
    }

    /// Decode one whitespace-delimited data row
    fn decode_data_row(
        &self,
        line: &str,
        chunk: &Chunk,
        state: &ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let columns = state.columns();
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.is_empty() {
            // Blank line between segments; nothing to decode.
            return Ok(ChunkOutput::default());
        }

        if tokens.len() != columns.len() {
            return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                offset: chunk.start,
                reason: format!(
                    "Row has {} columns, file declared {}",
                    tokens.len(),
                    columns.len()
                ),
            }));
        }

        let mut available: Vec<(String, FieldValue)> = Vec::with_capacity(columns.len());
        for (column, token) in columns.iter().zip(&tokens) {
            match coerce_token(token, FieldKind::Float) {
                Ok(value) => available.push((column.clone(), value)),
                Err(reason) => {
                    return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                        offset: chunk.start,
                        reason: format!("Column '{}': {}", column, reason),
                    }));
                }
            }
        }

        let mission_time = available
            .iter()
            .find(|(name, _)| name == glider::TIMESTAMP_COLUMN)
            .and_then(|(_, value)| value.as_f64());
        let internal = match mission_time.and_then(utc_from_posix) {
            Some(internal) => internal,
            None => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: format!("Row carries no usable {}", glider::TIMESTAMP_COLUMN),
                }));
            }
        };

        let values = match reconcile_fields(&self.science_spec, &available) {
            Some(values) => values,
            None => {
                // Row belongs to an engineering-only cycle; expected.
                warn!(
                    "Row at offset {} carries no science fields; skipping",
                    chunk.start
                );
                return Ok(ChunkOutput::default());
            }
        };

        let particle = Particle::new(
            stream_id.to_string(),
            self.science_spec.particle_type.to_string(),
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

impl Default for GliderFormat {
    fn default() -> Self {
        Self::new()
    }
}

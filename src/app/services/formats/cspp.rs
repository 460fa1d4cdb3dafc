//! CSPP profiler uplink format
//!
//! Coastal Surface-Piercing Profiler uplink files carry a `key: value`
//! header section followed by tab-delimited rows: profiler timestamp,
//! depth, a suspect flag, then instrument measurements that may be `NaN`.
//! Rows matching neither shape are non-data and get reported, not parsed.

use tracing::debug;

use super::ChunkOutput;
use crate::app::models::{FieldValue, Particle, Provenance, TimestampKind, utc_from_posix};
use crate::app::services::chunker::{Chunk, RegexSieve, Sieve};
use crate::app::services::parse_state::ParseState;
use crate::app::services::particle_builder::{
    FieldKind, FieldSpec, ParticleSpec, coerce_token, reconcile_fields,
};
use crate::constants::cspp;
use crate::{Recoverable, Result};

/// CSPP format handler
#[derive(Debug)]
pub struct CsppFormat {
    data_spec: ParticleSpec,
}

impl CsppFormat {
    /// Create the handler with its fixed data field table
    pub fn new() -> Result<Self> {
        let mut fields = vec![
            FieldSpec::new("profiler_timestamp", FieldKind::Float),
            FieldSpec::new("pressure_depth", FieldKind::Float),
        ];
        fields.extend(
            cspp::VALUE_COLUMNS
                .iter()
                .map(|&name| FieldSpec::new(name, FieldKind::Float)),
        );

        Ok(Self {
            data_spec: ParticleSpec::new("cspp_instrument", fields),
        })
    }

    /// Two sieves: header lines and tab-delimited data rows
    pub fn sieves(&self) -> Result<Vec<Box<dyn Sieve>>> {
        Ok(vec![
            Box::new(RegexSieve::new(
                "cspp_header_line",
                r"(?m-u)^[A-Za-z][A-Za-z0-9 ]*:[ \t][^\n]*\n",
            )?),
            Box::new(RegexSieve::new(
                "cspp_data_row",
                r"(?m-u)^\d+\.\d+\t\d+\.\d+\t[yn](\t[^\t\n]*)*\r?\n",
            )?),
        ])
    }

    /// Decode one header line or data row
    pub fn handle_chunk(
        &self,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let line = match std::str::from_utf8(&chunk.data) {
            Ok(line) => line.trim_end_matches(|c| c == '\r' || c == '\n'),
            Err(_) => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: "Matched line is not valid text".to_string(),
                }));
            }
        };

        if line.as_bytes().first().is_some_and(u8::is_ascii_digit) {
            self.decode_data_row(line, chunk, stream_id)
        } else {
            self.consume_header_line(line, chunk, state, stream_id)
        }
    }

    /// Consume one `key: value` header line
    ///
    /// Only the source-file line yields a particle; the rest are stored
    /// for provenance and otherwise silent.
    fn consume_header_line(
        &self,
        line: &str,
        chunk: &Chunk,
        state: &mut ParseState,
        stream_id: &str,
    ) -> Result<ChunkOutput> {
        let (key, value) = match line.split_once(':') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: format!("Header line without separator: '{}'", line),
                }));
            }
        };

        state.push_preamble(key, value);
        debug!("CSPP header line: {} = {}", key, value);

        if key != cspp::SOURCE_FILE_KEY {
            return Ok(ChunkOutput::default());
        }

        let metadata = Particle::new(
            stream_id.to_string(),
            "cspp_metadata".to_string(),
            None,
            chunk.arrival,
            TimestampKind::Ingestion,
            Provenance {
                start: chunk.start,
                end: chunk.end,
            },
            vec![(
                "source_file".to_string(),
                FieldValue::Text(value.to_string()),
            )],
        )?;

        Ok(ChunkOutput {
            metadata: Some(metadata),
            records: Vec::new(),
            exceptions: Vec::new(),
        })
    }

    /// Decode one tab-delimited data row
    fn decode_data_row(&self, line: &str, chunk: &Chunk, stream_id: &str) -> Result<ChunkOutput> {
        let tokens: Vec<&str> = line.split('\t').collect();
        if tokens.len() < 3 {
            return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                offset: chunk.start,
                reason: format!("Row has only {} columns", tokens.len()),
            }));
        }

        let mut available: Vec<(String, FieldValue)> = Vec::new();
        for (index, (name, token)) in [("profiler_timestamp", tokens[0]), ("pressure_depth", tokens[1])]
            .into_iter()
            .enumerate()
        {
            match coerce_token(token, FieldKind::Float) {
                Ok(value) => available.push((name.to_string(), value)),
                Err(reason) => {
                    return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                        offset: chunk.start,
                        reason: format!("Column {}: {}", index, reason),
                    }));
                }
            }
        }

        let suspect = tokens[2] == cspp::SUSPECT_FLAG;

        for (name, token) in cspp::VALUE_COLUMNS.iter().zip(tokens.iter().skip(3)) {
            match coerce_token(token, FieldKind::Float) {
                Ok(value) => available.push((name.to_string(), value)),
                Err(reason) => {
                    return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                        offset: chunk.start,
                        reason: format!("Column '{}': {}", name, reason),
                    }));
                }
            }
        }

        let internal = available
            .first()
            .and_then(|(_, value)| value.as_f64())
            .and_then(utc_from_posix);
        let internal = match internal {
            Some(internal) => internal,
            None => {
                return Ok(ChunkOutput::exception(Recoverable::SampleDecode {
                    offset: chunk.start,
                    reason: "Profiler timestamp is out of range".to_string(),
                }));
            }
        };

        let values = match reconcile_fields(&self.data_spec, &available) {
            Some(values) => values,
            None => return Ok(ChunkOutput::default()),
        };

        let mut particle = Particle::new(
            stream_id.to_string(),
            self.data_spec.particle_type.to_string(),
            Some(internal),
            chunk.arrival,
            TimestampKind::Internal,
            Provenance {
                start: chunk.start,
                end: chunk.end,
            },
            values,
        )?;

        if suspect {
            particle.annotate("profiler flagged row as suspect");
        }

        Ok(ChunkOutput {
            metadata: None,
            records: vec![particle],
            exceptions: Vec::new(),
        })
    }
}

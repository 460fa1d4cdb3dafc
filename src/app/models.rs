//! Data models for particle ingestion
//!
//! This module contains the core data structures for representing decoded
//! instrument records ("particles"), their field values, timestamps, and
//! quality annotations.

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Field Values
// =============================================================================

/// One decoded field value inside a particle
///
/// `Absent` is a valid, expected state for sparse column formats: a row may
/// simply not carry a value for one of the particle's declared fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Decoded integer value
    Integer(i64),
    /// Decoded floating-point value
    Float(f64),
    /// Decoded text value
    Text(String),
    /// Field declared by the particle but absent in this record
    Absent,
}

impl FieldValue {
    /// Return the value as f64 when it is numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// True when a value is actually present
    pub fn is_present(&self) -> bool {
        !matches!(self, FieldValue::Absent)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Absent => write!(f, "null"),
        }
    }
}

// =============================================================================
// Timestamps and Quality
// =============================================================================

/// Which of a particle's timestamps downstream consumers should prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    /// Timestamp decoded from the instrument data itself
    Internal,
    /// Wall-clock time at which the bytes arrived for ingestion
    Ingestion,
}

impl std::fmt::Display for TimestampKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampKind::Internal => write!(f, "internal"),
            TimestampKind::Ingestion => write!(f, "ingestion"),
        }
    }
}

/// Quality assessment attached to an emitted particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// Record decoded cleanly
    Ok,
    /// Record decoded but carries an exception annotation
    Flagged,
}

impl QualityFlag {
    /// True when the particle decoded without annotations
    pub fn is_ok(self) -> bool {
        self == QualityFlag::Ok
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityFlag::Ok => write!(f, "ok"),
            QualityFlag::Flagged => write!(f, "flagged"),
        }
    }
}

// =============================================================================
// Particle Record Structure
// =============================================================================

/// Byte-range provenance of a particle within its source stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Stream offset of the first byte the particle was decoded from
    pub start: u64,

    /// Stream offset one past the last byte
    pub end: u64,
}

/// A decoded, typed instrument record
///
/// Particles carry an ordered field table (order follows the particle
/// spec's declaration, not insertion accident), two timestamps with a
/// preference selector, a quality flag, and byte-range provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Identifier of the stream of origin (file name, connection label)
    pub stream_id: String,

    /// Particle variant name (e.g. "glider_science", "sio_metadata")
    pub particle_type: String,

    /// Timestamp decoded from the data, when the format encodes one
    pub internal_timestamp: Option<DateTime<Utc>>,

    /// Arrival time of the bytes this particle was decoded from
    pub ingestion_timestamp: DateTime<Utc>,

    /// Which timestamp downstream consumers should prefer
    pub preferred_timestamp: TimestampKind,

    /// Quality assessment for this record
    pub quality: QualityFlag,

    /// Annotations explaining a `Flagged` quality, empty when `Ok`
    pub annotations: Vec<String>,

    /// Byte range the particle was decoded from
    pub provenance: Provenance,

    /// Ordered field name/value pairs
    pub values: Vec<(String, FieldValue)>,
}

impl Particle {
    /// Create a new particle with validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream_id: String,
        particle_type: String,
        internal_timestamp: Option<DateTime<Utc>>,
        ingestion_timestamp: DateTime<Utc>,
        preferred_timestamp: TimestampKind,
        provenance: Provenance,
        values: Vec<(String, FieldValue)>,
    ) -> Result<Self> {
        let particle = Self {
            stream_id,
            particle_type,
            internal_timestamp,
            ingestion_timestamp,
            preferred_timestamp,
            quality: QualityFlag::Ok,
            annotations: Vec::new(),
            provenance,
            values,
        };

        particle.validate()?;
        Ok(particle)
    }

    /// Validate particle data for consistency
    pub fn validate(&self) -> Result<()> {
        if self.stream_id.trim().is_empty() {
            return Err(Error::configuration(
                "Particle stream id cannot be empty".to_string(),
            ));
        }

        if self.particle_type.trim().is_empty() {
            return Err(Error::configuration(
                "Particle type cannot be empty".to_string(),
            ));
        }

        if self.provenance.end <= self.provenance.start {
            return Err(Error::configuration(format!(
                "Particle provenance [{}, {}) is empty or inverted",
                self.provenance.start, self.provenance.end
            )));
        }

        if self.preferred_timestamp == TimestampKind::Internal
            && self.internal_timestamp.is_none()
        {
            return Err(Error::configuration(
                "Preferred timestamp is internal but no internal timestamp was decoded".to_string(),
            ));
        }

        Ok(())
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// The timestamp selected by the preference flag
    pub fn preferred_time(&self) -> DateTime<Utc> {
        match self.preferred_timestamp {
            TimestampKind::Internal => self
                .internal_timestamp
                .unwrap_or(self.ingestion_timestamp),
            TimestampKind::Ingestion => self.ingestion_timestamp,
        }
    }

    /// Attach an exception annotation, degrading quality to `Flagged`
    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotations.push(note.into());
        self.quality = QualityFlag::Flagged;
    }

    /// Number of fields carrying an actual value
    pub fn present_field_count(&self) -> usize {
        self.values.iter().filter(|(_, v)| v.is_present()).count()
    }
}

/// Convert fractional POSIX seconds to a UTC timestamp
///
/// Sub-second precision is kept to the nanosecond; out-of-range values
/// (far outside the representable chrono range) return `None`.
pub fn utc_from_posix(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1e9).round() as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

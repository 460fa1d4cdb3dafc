//! Typed particle assembly from matched records
//!
//! This module provides the field tables each particle variant declares,
//! the type-coercion helpers that turn raw tokens into typed values, and
//! the field-presence reconciliation used by sparse column formats.

use tracing::debug;

use crate::app::models::FieldValue;
use crate::constants::NAN_TOKEN;

/// Declared type of one particle field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole-number value
    Integer,
    /// Floating-point value
    Float,
    /// Free-text value
    Text,
}

/// One field a particle variant declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as emitted in the particle
    pub name: &'static str,

    /// Declared value type
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Shorthand constructor
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Fixed field table for one particle variant
///
/// Resolved once at stream construction; emission order always follows
/// the declaration order here, never map iteration accidents.
#[derive(Debug, Clone)]
pub struct ParticleSpec {
    /// Particle variant name (e.g. "glider_science")
    pub particle_type: &'static str,

    /// Declared fields, in emission order
    pub fields: Vec<FieldSpec>,
}

impl ParticleSpec {
    /// Create a spec from a declaration table
    pub fn new(particle_type: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self {
            particle_type,
            fields,
        }
    }
}

// =============================================================================
// Token Coercion
// =============================================================================

/// Coerce one raw token to its declared field type
///
/// The instrument NaN sentinel (and an empty token) is a valid absent
/// value, not an error; anything else that fails to parse is a decode
/// failure the caller reports as a recoverable sample exception.
pub fn coerce_token(token: &str, kind: FieldKind) -> std::result::Result<FieldValue, String> {
    let trimmed = token.trim();

    if trimmed.is_empty() || trimmed == NAN_TOKEN {
        return Ok(FieldValue::Absent);
    }

    match kind {
        FieldKind::Integer => trimmed
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|e| format!("Invalid integer '{}': {}", trimmed, e)),
        FieldKind::Float => trimmed
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|e| format!("Invalid float '{}': {}", trimmed, e)),
        FieldKind::Text => Ok(FieldValue::Text(trimmed.to_string())),
    }
}

/// Parse a fixed-width ASCII hex field (SIO timestamps, lengths, checksums)
pub fn parse_hex_u32(token: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(token.trim(), 16)
        .map_err(|e| format!("Invalid hex value '{}': {}", token, e))
}

// =============================================================================
// Field-Presence Reconciliation
// =============================================================================

/// Reconcile a row's available values against a particle's field table
///
/// Any declared field the row does not carry (or carries as absent) is
/// emitted as [`FieldValue::Absent`]. A row carrying **none** of the
/// declared fields produces no particle at all: it belongs to a different
/// particle type, which is expected, not an error.
pub fn reconcile_fields(
    spec: &ParticleSpec,
    available: &[(String, FieldValue)],
) -> Option<Vec<(String, FieldValue)>> {
    let mut present = 0usize;
    let values: Vec<(String, FieldValue)> = spec
        .fields
        .iter()
        .map(|field| {
            let value = available
                .iter()
                .find(|(name, value)| name == field.name && value.is_present())
                .map(|(_, value)| value.clone())
                .unwrap_or(FieldValue::Absent);
            if value.is_present() {
                present += 1;
            }
            (field.name.to_string(), value)
        })
        .collect();

    if present == 0 {
        debug!(
            "Row carries none of the {} fields declared by '{}'",
            spec.fields.len(),
            spec.particle_type
        );
        return None;
    }

    Some(values)
}

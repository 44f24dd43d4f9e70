//! Measurement line encoding/decoding
//!
//! This module provides functions to decode the comma-separated measurement
//! lines arriving on the ingest socket, and to encode them for the feeder
//! and for tests.
//!
//! Two wire variants are accepted, distinguished by field arity:
//!
//! - Reduced (8 fields): `timestamp, entity_id, serving_x, serving_y,
//!   serving_sinr, neigh1_sinr, neigh2_sinr, neigh3_sinr`
//! - Full (18 fields): `timestamp, entity_id`, then four groups of
//!   `anchor_id, anchor_x, anchor_y, sinr` for serving + 3 neighbors
//!
//! Timestamps arrive as floats and are truncated to integer milliseconds.
//! Ids and coordinates are signed integers; SINR values are doubles on the
//! raw 0-127 scale and may be negative.

use thiserror::Error;

use ranloc_common::{AnchorObservation, Measurement, WireVariant};

/// Field count of the reduced wire variant
pub const REDUCED_FIELD_COUNT: usize = 8;

/// Field count of the full wire variant
pub const FULL_FIELD_COUNT: usize = 18;

/// Errors that can occur during measurement line decoding
#[derive(Debug, Error)]
pub enum IngestCodecError {
    /// Empty line
    #[error("empty line")]
    Empty,

    /// Unknown field arity
    #[error("wrong field count: expected 8 or 18, got {0}")]
    FieldCount(usize),

    /// A field failed numeric parsing
    #[error("field {index} ({name}): invalid value {value:?}")]
    InvalidField {
        /// Zero-based field position
        index: usize,
        /// Field name in the wire layout
        name: &'static str,
        /// The offending text
        value: String,
    },
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, IngestCodecError>;

/// Decodes one measurement line into a `Measurement`.
pub fn decode(line: &str) -> Result<Measurement> {
    let line = line.trim();
    if line.is_empty() {
        return Err(IngestCodecError::Empty);
    }

    let fields: Vec<&str> = line.split(',').collect();
    match fields.len() {
        REDUCED_FIELD_COUNT => decode_reduced(&fields),
        FULL_FIELD_COUNT => decode_full(&fields),
        other => Err(IngestCodecError::FieldCount(other)),
    }
}

fn decode_reduced(fields: &[&str]) -> Result<Measurement> {
    let timestamp_ms = parse_timestamp(fields, 0)?;
    let entity_id = parse_u64(fields, 1, "entity_id")?;

    let serving = AnchorObservation {
        anchor_id: None,
        x: Some(parse_i64(fields, 2, "serving_x")? as f64),
        y: Some(parse_i64(fields, 3, "serving_y")? as f64),
        sinr_raw: parse_f64(fields, 4, "serving_sinr")?,
    };
    let neighbors = vec![
        AnchorObservation::sinr_only(parse_f64(fields, 5, "neigh1_sinr")?),
        AnchorObservation::sinr_only(parse_f64(fields, 6, "neigh2_sinr")?),
        AnchorObservation::sinr_only(parse_f64(fields, 7, "neigh3_sinr")?),
    ];

    Ok(Measurement {
        timestamp_ms,
        entity_id,
        serving,
        neighbors,
        variant: WireVariant::Reduced,
    })
}

fn decode_full(fields: &[&str]) -> Result<Measurement> {
    const GROUP_NAMES: [(&str, &str, &str, &str); 4] = [
        ("serving_id", "serving_x", "serving_y", "serving_sinr"),
        ("neigh1_id", "neigh1_x", "neigh1_y", "neigh1_sinr"),
        ("neigh2_id", "neigh2_x", "neigh2_y", "neigh2_sinr"),
        ("neigh3_id", "neigh3_x", "neigh3_y", "neigh3_sinr"),
    ];

    let timestamp_ms = parse_timestamp(fields, 0)?;
    let entity_id = parse_u64(fields, 1, "entity_id")?;

    let parse_group = |group: usize| -> Result<AnchorObservation> {
        let names = GROUP_NAMES[group];
        let base = 2 + group * 4;
        Ok(AnchorObservation::full(
            parse_i32(fields, base, names.0)?,
            parse_i64(fields, base + 1, names.1)? as f64,
            parse_i64(fields, base + 2, names.2)? as f64,
            parse_f64(fields, base + 3, names.3)?,
        ))
    };

    let serving = parse_group(0)?;
    let mut neighbors = Vec::with_capacity(3);
    for group in 1..4 {
        neighbors.push(parse_group(group)?);
    }

    Ok(Measurement {
        timestamp_ms,
        entity_id,
        serving,
        neighbors,
        variant: WireVariant::Full,
    })
}

/// Encodes a measurement back into its wire line (no trailing newline).
pub fn encode(measurement: &Measurement) -> String {
    let mut fields: Vec<String> = vec![
        measurement.timestamp_ms.to_string(),
        measurement.entity_id.to_string(),
    ];

    match measurement.variant {
        WireVariant::Reduced => {
            let serving = &measurement.serving;
            fields.push((serving.x.unwrap_or(0.0) as i64).to_string());
            fields.push((serving.y.unwrap_or(0.0) as i64).to_string());
            fields.push(serving.sinr_raw.to_string());
            for neighbor in &measurement.neighbors {
                fields.push(neighbor.sinr_raw.to_string());
            }
        }
        WireVariant::Full => {
            for obs in measurement.observations() {
                fields.push(obs.anchor_id.unwrap_or(0).to_string());
                fields.push((obs.x.unwrap_or(0.0) as i64).to_string());
                fields.push((obs.y.unwrap_or(0.0) as i64).to_string());
                fields.push(obs.sinr_raw.to_string());
            }
        }
    }

    fields.join(",")
}

fn parse_timestamp(fields: &[&str], index: usize) -> Result<i64> {
    // Timestamps arrive as floats; truncate to integer milliseconds
    Ok(parse_f64(fields, index, "timestamp")? as i64)
}

fn parse_f64(fields: &[&str], index: usize, name: &'static str) -> Result<f64> {
    let raw = fields[index].trim();
    raw.parse().map_err(|_| IngestCodecError::InvalidField {
        index,
        name,
        value: raw.to_string(),
    })
}

fn parse_i64(fields: &[&str], index: usize, name: &'static str) -> Result<i64> {
    let raw = fields[index].trim();
    raw.parse().map_err(|_| IngestCodecError::InvalidField {
        index,
        name,
        value: raw.to_string(),
    })
}

fn parse_i32(fields: &[&str], index: usize, name: &'static str) -> Result<i32> {
    let raw = fields[index].trim();
    raw.parse().map_err(|_| IngestCodecError::InvalidField {
        index,
        name,
        value: raw.to_string(),
    })
}

fn parse_u64(fields: &[&str], index: usize, name: &'static str) -> Result<u64> {
    let raw = fields[index].trim();
    raw.parse().map_err(|_| IngestCodecError::InvalidField {
        index,
        name,
        value: raw.to_string(),
    })
}

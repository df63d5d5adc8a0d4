//! Tabular codec for the telemetry log
//!
//! One header row, then one comma-separated row per snapshot:
//! ```text
//! timestamp,battery,height,altitude,barometer,temperature,pitch,roll,yaw,speed_x,speed_y,speed_z
//! 2026-10-16T09:30:01.000042Z,87,112,109,1012.25,31.5,-2,1,178,0,0,0
//! ```
//!
//! No field ever contains a comma, so rows are written without quoting.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::TelemetrySnapshot;

/// Column names, in file order
pub const COLUMNS: [&str; 12] = [
    "timestamp",
    "battery",
    "height",
    "altitude",
    "barometer",
    "temperature",
    "pitch",
    "roll",
    "yaw",
    "speed_x",
    "speed_y",
    "speed_z",
];

/// Errors that can occur while decoding a telemetry table
#[derive(Error, Debug)]
pub enum TelemetryCodecError {
    #[error("Unexpected header: {0}")]
    HeaderMismatch(String),

    #[error("Missing header row")]
    MissingHeader,

    #[error("Expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("Line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<TelemetryCodecError>,
    },
}

/// The header row, without line terminator
pub fn header() -> String {
    COLUMNS.join(",")
}

/// Encode one snapshot as a row, without line terminator
pub fn encode_row(snapshot: &TelemetrySnapshot) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{}",
        snapshot
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        snapshot.battery,
        snapshot.height,
        snapshot.tof_altitude,
        snapshot.barometer,
        snapshot.temperature,
        snapshot.pitch,
        snapshot.roll,
        snapshot.yaw,
        snapshot.speed_x,
        snapshot.speed_y,
        snapshot.speed_z,
    )
}

/// Decode one row back into a snapshot
pub fn decode_row(row: &str) -> Result<TelemetrySnapshot, TelemetryCodecError> {
    let fields: Vec<&str> = row.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != COLUMNS.len() {
        return Err(TelemetryCodecError::FieldCount {
            expected: COLUMNS.len(),
            found: fields.len(),
        });
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| invalid(COLUMNS[0], fields[0]))?;

    Ok(TelemetrySnapshot {
        timestamp,
        battery: parse_field(fields[1], COLUMNS[1])?,
        height: parse_field(fields[2], COLUMNS[2])?,
        tof_altitude: parse_field(fields[3], COLUMNS[3])?,
        barometer: parse_field(fields[4], COLUMNS[4])?,
        temperature: parse_field(fields[5], COLUMNS[5])?,
        pitch: parse_field(fields[6], COLUMNS[6])?,
        roll: parse_field(fields[7], COLUMNS[7])?,
        yaw: parse_field(fields[8], COLUMNS[8])?,
        speed_x: parse_field(fields[9], COLUMNS[9])?,
        speed_y: parse_field(fields[10], COLUMNS[10])?,
        speed_z: parse_field(fields[11], COLUMNS[11])?,
    })
}

/// Decode a whole table, header included
///
/// Blank lines are skipped. Errors carry the 1-based line number.
pub fn decode_table(text: &str) -> Result<Vec<TelemetrySnapshot>, TelemetryCodecError> {
    let mut lines = text.lines().enumerate();

    let (_, first) = lines.next().ok_or(TelemetryCodecError::MissingHeader)?;
    if first.trim_end() != header() {
        return Err(TelemetryCodecError::HeaderMismatch(first.to_string()));
    }

    let mut snapshots = Vec::new();
    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let snapshot = decode_row(line).map_err(|e| TelemetryCodecError::AtLine {
            line: index + 1,
            source: Box::new(e),
        })?;
        snapshots.push(snapshot);
    }

    Ok(snapshots)
}

fn parse_field<T: std::str::FromStr>(
    value: &str,
    field: &'static str,
) -> Result<T, TelemetryCodecError> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &'static str, value: &str) -> TelemetryCodecError {
    TelemetryCodecError::InvalidField {
        field,
        value: value.to_string(),
    }
}

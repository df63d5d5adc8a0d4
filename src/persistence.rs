//! Telemetry persistence - writes the session's telemetry log to a table file

use groundctl_shared::{codec, TelemetryCodecError, TelemetrySnapshot};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors reading or writing a telemetry file
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Telemetry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Telemetry file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: TelemetryCodecError,
    },
}

/// Write every snapshot to `path`, replacing any previous file
///
/// An empty log writes nothing and returns `Ok(None)`.
pub fn write_telemetry(
    path: &Path,
    snapshots: &[TelemetrySnapshot],
) -> Result<Option<PathBuf>, PersistError> {
    if snapshots.is_empty() {
        println!("No telemetry data to save.");
        return Ok(None);
    }

    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    writeln!(out, "{}", codec::header()).map_err(io_err)?;
    for snapshot in snapshots {
        writeln!(out, "{}", codec::encode_row(snapshot)).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    info!(
        "[SESSION] Wrote {} snapshots to {}",
        snapshots.len(),
        path.display()
    );
    println!("\nTelemetry log saved to: {}", path.display());
    Ok(Some(path.to_path_buf()))
}

/// Read a telemetry file written by [`write_telemetry`]
pub fn read_telemetry(path: &Path) -> Result<Vec<TelemetrySnapshot>, PersistError> {
    let text = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    codec::decode_table(&text).map_err(|source| PersistError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

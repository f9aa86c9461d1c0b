//! Export of report results as flat rows.
//!
//! Supports pretty-printing, JSON logging, CSV overwrite/append and gzip.

pub mod tables;

use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tracing::{debug, info};

pub use tables::Table;

/// Logs any value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends a serializable record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes `table` to `path`, replacing any previous export.
///
/// With `gzip`, the file is compressed and `.gz` is appended to its name.
/// Returns the path actually written.
pub fn write_table(path: &Path, table: &Table, gzip: bool) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let target = if gzip {
        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        path.to_path_buf()
    };

    let file = File::create(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;

    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_csv(&mut encoder, table)?;
        encoder.finish()?.flush()?;
    } else {
        let mut file = file;
        write_csv(&mut file, table)?;
        file.flush()?;
    }

    info!(path = %target.display(), rows = table.rows.len(), gzip, "Wrote export");
    Ok(target)
}

/// Compresses a finished file to `<path>.gz` and removes the original.
pub fn gzip_file(path: &Path) -> Result<PathBuf> {
    let contents =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&contents)?;
    let compressed = encoder.finish()?;

    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    let target = PathBuf::from(name);
    fs::write(&target, compressed)?;
    fs::remove_file(path)?;

    info!(path = %target.display(), "Compressed file");
    Ok(target)
}

/// Serializes `table` as CSV into any writer.
pub fn write_csv<W: Write>(out: W, table: &Table) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

//! Tabular ingestion: raw upload → typed records.

pub mod coerce;
pub mod columns;
pub mod records;
pub mod table;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::IngestError;
use columns::ColumnMap;
use records::{MappedRow, RecordSchema};
use table::RawTable;

/// Row counters for one upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub admitted: usize,
    pub dropped: usize,
    /// Canonical fields that found no header.
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub report: LoadReport,
}

/// Normalizes `table` with the record type's own identity fields.
pub fn normalize<T: RecordSchema>(table: &RawTable) -> Result<Normalized<T>, IngestError> {
    normalize_with(table, T::IDENTITY)
}

/// Normalizes `table`, admitting only rows whose `identity` fields are all present.
///
/// An identity entry of the form `a|b` is satisfied by either field. A required
/// field listed in `T::DATE_FIELDS` must also parse as a date. The whole upload is
/// rejected when some identity entry has no matching column at all.
#[tracing::instrument(skip(table), fields(rows = table.len()))]
pub fn normalize_with<T: RecordSchema>(
    table: &RawTable,
    identity: &[&str],
) -> Result<Normalized<T>, IngestError> {
    let columns = ColumnMap::resolve(&table.headers, T::COLUMNS);

    for entry in identity {
        if !entry.split('|').any(|field| columns.contains(field)) {
            return Err(IngestError::MissingColumn(entry.to_string()));
        }
    }

    let mut records = Vec::with_capacity(table.len());
    let mut dropped = 0;

    for idx in 0..table.len() {
        let row = MappedRow::new(table, &columns, idx);
        if admits::<T>(&row, identity) {
            records.push(T::from_row(&row));
        } else {
            debug!(row = idx + 2, "Dropping row without identity fields");
            dropped += 1;
        }
    }

    let report = LoadReport {
        total_rows: table.len(),
        admitted: records.len(),
        dropped,
        missing_columns: columns
            .missing(T::COLUMNS)
            .into_iter()
            .map(String::from)
            .collect(),
    };

    info!(
        admitted = report.admitted,
        dropped = report.dropped,
        missing = ?report.missing_columns,
        "Normalized upload"
    );

    Ok(Normalized { records, report })
}

/// Reads an upload from disk and normalizes it.
pub fn load<T: RecordSchema>(path: &Path) -> Result<Normalized<T>, IngestError> {
    let table = RawTable::from_path(path)?;
    normalize(&table)
}

/// Like [`load`] with a caller-chosen identity.
pub fn load_with<T: RecordSchema>(
    path: &Path,
    identity: &[&str],
) -> Result<Normalized<T>, IngestError> {
    let table = RawTable::from_path(path)?;
    normalize_with(&table, identity)
}

fn admits<T: RecordSchema>(row: &MappedRow<'_>, identity: &[&str]) -> bool {
    identity.iter().all(|entry| {
        entry.split('|').any(|field| {
            if !row.has_value(field) {
                return false;
            }
            !T::DATE_FIELDS.iter().any(|d| *d == field) || row.date(field).is_some()
        })
    })
}

//! Uploaded extracts as a header row plus string rows.
//!
//! Both delimited text and spreadsheets land in the same [`RawTable`] shape
//! before any header matching happens.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use tracing::debug;

use crate::error::IngestError;

/// Header row and data rows exactly as uploaded (cells trimmed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parses comma-separated text with a header row. Quoted fields may contain commas.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        check_headers(&headers)?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
            if row.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row);
        }

        debug!(columns = headers.len(), rows = rows.len(), "Parsed delimited upload");
        Ok(Self { headers, rows })
    }

    pub fn from_csv_str(text: &str) -> Result<Self, IngestError> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Reads the first worksheet of an `.xlsx`/`.xls`/`.xlsb`/`.ods` file.
    ///
    /// Numeric and date cells are rendered as their plain serial numbers so
    /// that the coercion layer sees Excel dates the same way for every format.
    pub fn from_spreadsheet(path: &Path) -> Result<Self, IngestError> {
        let mut workbook = open_workbook_auto(path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::Spreadsheet("workbook has no sheets".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut grid = range.rows();
        let headers: Vec<String> = grid
            .next()
            .ok_or(IngestError::MissingHeader)?
            .iter()
            .map(cell_text)
            .collect();
        check_headers(&headers)?;

        let rows: Vec<Vec<String>> = grid
            .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
            .filter(|r| r.iter().any(|v| !v.is_empty()))
            .collect();

        debug!(
            sheet = %sheet_name,
            columns = headers.len(),
            rows = rows.len(),
            "Parsed spreadsheet upload"
        );
        Ok(Self { headers, rows })
    }

    /// Dispatches on the file extension.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "txt" => Self::from_csv_reader(File::open(path)?),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Self::from_spreadsheet(path),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Cell at `col` in `row`, or an empty string for short rows.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn check_headers(headers: &[String]) -> Result<(), IngestError> {
    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::MissingHeader);
    }
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}

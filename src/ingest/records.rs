//! Tagged record shapes, one per upload kind.
//!
//! Each type carries its own column-matcher table and identity fields and is
//! built from a [`MappedRow`] exactly once.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use super::coerce::{parse_date, parse_number, parse_number_opt, parse_time};
use super::columns::{ColumnMap, ColumnMatcher};
use super::table::RawTable;

/// One uploaded row seen through a resolved [`ColumnMap`].
pub struct MappedRow<'a> {
    table: &'a RawTable,
    columns: &'a ColumnMap,
    row: usize,
}

impl<'a> MappedRow<'a> {
    pub fn new(table: &'a RawTable, columns: &'a ColumnMap, row: usize) -> Self {
        Self { table, columns, row }
    }

    /// Trimmed cell text; empty when the field has no column.
    pub fn text(&self, field: &str) -> &'a str {
        self.columns
            .index(field)
            .map(|col| self.table.cell(self.row, col))
            .unwrap_or("")
    }

    pub fn owned(&self, field: &str) -> String {
        self.text(field).to_string()
    }

    pub fn has_value(&self, field: &str) -> bool {
        !self.text(field).is_empty()
    }

    pub fn has_column(&self, field: &str) -> bool {
        self.columns.contains(field)
    }

    pub fn number(&self, field: &str) -> f64 {
        parse_number(self.text(field))
    }

    pub fn number_opt(&self, field: &str) -> Option<f64> {
        parse_number_opt(self.text(field))
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        parse_date(self.text(field))
    }

    pub fn time(&self, field: &str) -> Option<NaiveTime> {
        parse_time(self.text(field))
    }
}

/// Shape of one upload kind.
pub trait RecordSchema: Sized {
    /// Canonical field → header keywords, applied in order.
    const COLUMNS: &'static [ColumnMatcher];

    /// Fields that must be non-empty for a row to be admitted. `a|b` is satisfied
    /// by either field.
    const IDENTITY: &'static [&'static str];

    /// Fields that, when required for identity, must also coerce to a date.
    const DATE_FIELDS: &'static [&'static str] = &[];

    fn from_row(row: &MappedRow<'_>) -> Self;
}

/// Route-coverage log row: one route, one vehicle, one operating day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoiRecord {
    pub route_name: String,
    pub vehicle_number: String,
    pub ward: String,
    pub zone: String,
    pub date: Option<NaiveDate>,
    pub total: f64,
    pub covered: f64,
    pub not_covered: f64,
    pub coverage: f64,
}

impl PoiRecord {
    /// Point-level coverage for this row, `0` when nothing was scheduled.
    pub fn coverage_ratio(&self) -> f64 {
        if self.total > 0.0 {
            self.covered / self.total
        } else {
            0.0
        }
    }
}

pub const POI_COLUMNS: &[ColumnMatcher] = &[
    ColumnMatcher::new("route_name", &["route name", "route"]),
    ColumnMatcher::new("vehicle_number", &["vehicle number", "vehicle no", "vehicle"]),
    ColumnMatcher::new("ward", &["ward name", "ward"]),
    ColumnMatcher::new("zone", &["zone & circle", "zone-circle", "zone"]),
    ColumnMatcher::new("date", &["date"]),
    ColumnMatcher::new("not_covered", &["not covered"]),
    ColumnMatcher::new("covered", &["covered"]),
    ColumnMatcher::new("coverage", &["coverage"]),
    ColumnMatcher::new("total", &["total poi", "total"]),
];

impl RecordSchema for PoiRecord {
    const COLUMNS: &'static [ColumnMatcher] = POI_COLUMNS;
    const IDENTITY: &'static [&'static str] = &["ward"];
    const DATE_FIELDS: &'static [&'static str] = &["date"];

    fn from_row(row: &MappedRow<'_>) -> Self {
        let total = row.number("total");
        let covered = row.number("covered");
        let not_covered = if row.has_column("not_covered") {
            row.number("not_covered")
        } else {
            total - covered
        };
        PoiRecord {
            route_name: row.owned("route_name"),
            vehicle_number: row.owned("vehicle_number"),
            ward: row.owned("ward"),
            zone: row.owned("zone"),
            date: row.date("date"),
            total,
            covered,
            not_covered,
            coverage: row.number("coverage"),
        }
    }
}

/// Household KYC register row, or one pre-aggregated ward line when the upload
/// carries a customer count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KycRecord {
    pub ward: String,
    pub customer_count: Option<f64>,
    pub supervisor_id: String,
    pub supervisor_name: String,
    pub supervisor_mobile: String,
    pub zone: String,
    pub date: Option<NaiveDate>,
}

impl KycRecord {
    /// Households this row stands for.
    pub fn weight(&self) -> f64 {
        self.customer_count.unwrap_or(1.0)
    }
}

pub const KYC_COLUMNS: &[ColumnMatcher] = &[
    ColumnMatcher::new("customer_count", &["customer count"]),
    ColumnMatcher::new("supervisor_id", &["supervisor id", "supervisor_id", "=id"]),
    ColumnMatcher::new("supervisor_name", &["supervisor name", "supervisor_name", "=name"]),
    ColumnMatcher::new(
        "supervisor_mobile",
        &["supervisor number", "supervisor_number", "mobile"],
    ),
    ColumnMatcher::new("ward", &["ward name", "ward no", "ward"]),
    ColumnMatcher::new("zone", &["zone-circle", "zone"]),
    ColumnMatcher::new("date", &["date"]),
];

impl RecordSchema for KycRecord {
    const COLUMNS: &'static [ColumnMatcher] = KYC_COLUMNS;
    const IDENTITY: &'static [&'static str] = &["ward|supervisor_id|supervisor_name"];

    fn from_row(row: &MappedRow<'_>) -> Self {
        let customer_count = if row.has_column("customer_count") {
            Some(row.number("customer_count"))
        } else {
            None
        };
        KycRecord {
            ward: row.owned("ward"),
            customer_count,
            supervisor_id: row.owned("supervisor_id"),
            supervisor_name: row.owned("supervisor_name"),
            supervisor_mobile: row.owned("supervisor_mobile"),
            zone: row.owned("zone"),
            date: row.date("date"),
        }
    }
}

/// Static QR master-list row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrMasterRecord {
    pub qr_id: String,
    pub ward: String,
    pub zone: String,
    pub building: String,
    pub site_name: String,
    pub kind: String,
}

pub const QR_MASTER_COLUMNS: &[ColumnMatcher] = &[
    ColumnMatcher::new("qr_id", &["qr code id", "qr_code_id", "qr code", "qr id"]),
    ColumnMatcher::new("ward", &["ward"]),
    ColumnMatcher::new("zone", &["zone & circle", "zone"]),
    ColumnMatcher::new("building", &["building/street", "building", "street"]),
    ColumnMatcher::new("site_name", &["site name", "site"]),
    ColumnMatcher::new("kind", &["=type", "category"]),
];

impl RecordSchema for QrMasterRecord {
    const COLUMNS: &'static [ColumnMatcher] = QR_MASTER_COLUMNS;
    const IDENTITY: &'static [&'static str] = &["qr_id"];

    fn from_row(row: &MappedRow<'_>) -> Self {
        QrMasterRecord {
            qr_id: row.owned("qr_id"),
            ward: row.owned("ward"),
            zone: row.owned("zone"),
            building: row.owned("building"),
            site_name: row.owned("site_name"),
            kind: row.owned("kind"),
        }
    }
}

/// QR scan-log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub qr_id: String,
    pub date: Option<NaiveDate>,
    pub scanned_by: String,
    pub before_time: Option<NaiveTime>,
    pub after_time: Option<NaiveTime>,
}

pub const SCAN_COLUMNS: &[ColumnMatcher] = &[
    ColumnMatcher::new(
        "qr_id",
        &[
            "qr code id",
            "qr_code_id",
            "qr code",
            "qr id",
            "=content",
            "=data",
            "serial number",
            "barcode",
        ],
    ),
    ColumnMatcher::new(
        "before_time",
        &["before clean time", "before scan", "beforescan", "in time", "start time", "time in"],
    ),
    ColumnMatcher::new(
        "after_time",
        &["after clean time", "after scan", "afterscan", "out time", "end time", "time out"],
    ),
    ColumnMatcher::new("date", &["date of scan", "scan date", "date", "timestamp", "=time"]),
    ColumnMatcher::new(
        "scanned_by",
        &["supervisor name", "scan id", "scanner", "=user", "employee name"],
    ),
];

impl RecordSchema for ScanRecord {
    const COLUMNS: &'static [ColumnMatcher] = SCAN_COLUMNS;
    const IDENTITY: &'static [&'static str] = &["qr_id"];

    fn from_row(row: &MappedRow<'_>) -> Self {
        let scanned_by = row.text("scanned_by");
        ScanRecord {
            qr_id: row.owned("qr_id"),
            date: row.date("date"),
            scanned_by: if scanned_by.is_empty() {
                "Unknown".to_string()
            } else {
                scanned_by.to_string()
            },
            before_time: row.time("before_time"),
            after_time: row.time("after_time"),
        }
    }
}

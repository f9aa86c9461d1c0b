//! Flat row views of every report, with stable column order.

use chrono::NaiveDate;

use crate::aggregate::{AggregateBucket, Aggregation, CoverageMatrix, Totals};
use crate::changes::RouteMatrix;
use crate::ingest::coerce::{DateStyle, format_time_12h};
use crate::metrics::{KycGapReport, SupervisorCount, WardGap, ZonalCount};
use crate::qr_status::{QrStatusReport, ScanStatus};

pub const GRAND_TOTAL: &str = "Grand Total";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Table {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell by header name.
    pub fn value(&self, row: usize, header: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == header)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// Whole numbers without decimals, anything else to two places.
pub fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub fn percent(value: f64) -> String {
    format!("{value:.2}")
}

fn opt_date(date: Option<NaiveDate>, style: DateStyle) -> String {
    date.map(|d| style.format(d)).unwrap_or_default()
}

fn measures(total: f64, covered: f64, not_covered: f64, coverage: f64) -> [String; 4] {
    [number(total), number(covered), number(not_covered), percent(coverage)]
}

fn bucket_measures(b: &AggregateBucket) -> [String; 4] {
    measures(b.total_scheduled, b.total_covered, b.total_not_covered, b.display_coverage())
}

fn totals_measures(t: &Totals) -> [String; 4] {
    measures(t.total_scheduled, t.total_covered, t.total_not_covered, t.display_coverage())
}

/// One row per bucket followed by the grand total row.
pub fn aggregation_table(aggregation: &Aggregation, style: DateStyle) -> Table {
    let mut headers: Vec<String> = aggregation
        .dimensions
        .iter()
        .map(|d| d.header().to_string())
        .collect();
    headers.extend(
        ["Entries", "Routes", "Vehicles", "Total POI", "Covered", "Not Covered", "Coverage %"]
            .map(String::from),
    );
    let mut table = Table::new(headers);

    for bucket in &aggregation.buckets {
        let mut row = bucket.key.render(style);
        row.push(bucket.entry_count.to_string());
        row.push(bucket.route_names.len().to_string());
        row.push(bucket.vehicles.len().to_string());
        row.extend(bucket_measures(bucket));
        table.push(row);
    }

    let mut total = vec![String::new(); aggregation.dimensions.len().max(1)];
    total[0] = GRAND_TOTAL.to_string();
    total.push(aggregation.totals.entry_count.to_string());
    total.push(String::new());
    total.push(String::new());
    total.extend(totals_measures(&aggregation.totals));
    table.push(total);
    table
}

/// Row key, then covered/total/coverage for each date, then the row total.
pub fn coverage_matrix_table(matrix: &CoverageMatrix, style: DateStyle) -> Table {
    let mut headers = vec![matrix.row_dimension.header().to_string()];
    for date in &matrix.dates {
        let label = style.format(*date);
        headers.push(format!("{label} Covered"));
        headers.push(format!("{label} Total"));
        headers.push(format!("{label} Coverage %"));
    }
    headers.extend(["Total POI", "Covered", "Not Covered", "Coverage %"].map(String::from));
    let mut table = Table::new(headers);

    for row in &matrix.rows {
        let mut cells = vec![row.key.render(style)];
        for date in &matrix.dates {
            match row.cell(*date) {
                Some(b) => cells.extend([
                    number(b.total_covered),
                    number(b.total_scheduled),
                    percent(b.display_coverage()),
                ]),
                None => cells.extend([String::new(), String::new(), String::new()]),
            }
        }
        cells.extend(totals_measures(&row.total));
        table.push(cells);
    }

    let mut total = vec![GRAND_TOTAL.to_string()];
    for date in &matrix.dates {
        let t = matrix.column_totals.get(date).cloned().unwrap_or_default();
        total.extend([
            number(t.total_covered),
            number(t.total_scheduled),
            percent(t.display_coverage()),
        ]);
    }
    total.extend(totals_measures(&matrix.totals));
    table.push(total);
    table
}

/// Routes with at least `min_changes` changes, one vehicle column per date,
/// closed by per-date total and covered rows.
pub fn route_matrix_table(matrix: &RouteMatrix, min_changes: usize, style: DateStyle) -> Table {
    let dates = matrix.axis.dates();
    let mut headers: Vec<String> = ["Ward", "Zone", "Supervisor", "Zonal Head", "Route Name"]
        .map(String::from)
        .to_vec();
    headers.extend(dates.iter().map(|d| style.format(*d)));
    headers.extend(["Changes", "Unique Vehicles"].map(String::from));
    let mut table = Table::new(headers);

    for route in matrix.with_min_changes(min_changes) {
        let h = &route.history;
        let mut row = vec![
            h.ward.clone(),
            h.zone.clone(),
            h.supervisor.clone(),
            h.zonal_head.clone(),
            h.route_name.clone(),
        ];
        row.extend(
            dates
                .iter()
                .map(|d| h.per_date.get(d).map(|e| e.vehicle.clone()).unwrap_or_default()),
        );
        row.push(route.summary.change_count.to_string());
        row.push(
            route
                .summary
                .unique_vehicles
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" | "),
        );
        table.push(row);
    }

    let totals = &matrix.day_totals;
    table.push(day_row("Total POI", dates, |d| {
        number(totals.get(d).map(|t| t.total).unwrap_or_default())
    }));
    table.push(day_row("Covered", dates, |d| {
        number(totals.get(d).map(|t| t.covered).unwrap_or_default())
    }));
    table.push(day_row("Coverage %", dates, |d| {
        percent(totals.get(d).map(|t| t.coverage_percent()).unwrap_or_default())
    }));
    table
}

fn day_row(label: &str, dates: &[NaiveDate], value: impl Fn(&NaiveDate) -> String) -> Vec<String> {
    let mut row = vec![label.to_string()];
    row.extend(std::iter::repeat_n(String::new(), 4));
    row.extend(dates.iter().map(value));
    row.extend([String::new(), String::new()]);
    row
}

fn gap_cells(gap: &WardGap) -> [String; 4] {
    [
        number(gap.target),
        number(gap.current),
        number(gap.gap),
        percent(gap.coverage_percent),
    ]
}

pub fn kyc_gap_table(report: &KycGapReport) -> Table {
    let mut table = Table::new(["Ward No", "Ward Name", "Target", "Done", "Gap", "Coverage %"]);
    for row in &report.rows {
        let mut cells = vec![row.ward_number.clone(), row.ward_name.clone()];
        cells.extend(gap_cells(&row.metrics));
        table.push(cells);
    }
    if report.unassigned > 0.0 {
        table.push(vec![
            crate::reference::UNASSIGNED.to_string(),
            String::new(),
            String::new(),
            number(report.unassigned),
            String::new(),
            String::new(),
        ]);
    }
    let mut total = vec![GRAND_TOTAL.to_string(), String::new()];
    total.extend(gap_cells(&report.total));
    table.push(total);
    table
}

pub fn supervisor_count_table(counts: &[SupervisorCount]) -> Table {
    let mut table = Table::new([
        "Employee ID",
        "Name",
        "Mobile",
        "Zonal Head",
        "Wards",
        "KYC Count",
        "Ward Breakdown",
        "In Master List",
    ]);
    for c in counts {
        let breakdown = c
            .ward_counts
            .iter()
            .map(|(ward, n)| format!("{ward}: {n}"))
            .collect::<Vec<_>>()
            .join("; ");
        table.push(vec![
            c.employee_id.clone(),
            c.name.clone(),
            c.mobile.clone(),
            c.zone.clone(),
            c.wards.clone(),
            c.count.to_string(),
            breakdown,
            if c.is_master { "Yes" } else { "No" }.to_string(),
        ]);
    }
    let total: usize = counts.iter().map(|c| c.count).sum();
    table.push(vec![
        GRAND_TOTAL.to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        total.to_string(),
        String::new(),
        String::new(),
    ]);
    table
}

pub fn zonal_table(rollup: &[ZonalCount]) -> Table {
    let mut table = Table::new(["Zonal Head", "Supervisors", "KYC Count"]);
    for z in rollup {
        table.push(vec![
            z.zonal_head.clone(),
            z.supervisors.to_string(),
            z.kyc_count.to_string(),
        ]);
    }
    table
}

pub fn qr_status_table(report: &QrStatusReport, style: DateStyle) -> Table {
    let mut table = Table::new([
        "QR Code ID",
        "Ward",
        "Zone",
        "Assigned To",
        "Zonal Head",
        "Building/Street",
        "Site Name",
        "Type",
        "Status",
        "Scanned By",
        "Scan Date",
        "Before Clean",
        "After Clean",
        "Time Difference",
    ]);
    for row in &report.rows {
        table.push(vec![
            row.qr_id.clone(),
            row.ward.clone(),
            row.zone.clone(),
            row.assigned_to.clone(),
            row.zonal_head.clone(),
            row.building.clone(),
            row.site_name.clone(),
            row.kind.clone(),
            match row.status {
                ScanStatus::Scanned => "Scanned",
                ScanStatus::Pending => "Pending",
            }
            .to_string(),
            row.scanned_by.clone().unwrap_or_default(),
            opt_date(row.scan_date, style),
            row.before_time.map(format_time_12h).unwrap_or_default(),
            row.after_time.map(format_time_12h).unwrap_or_default(),
            row.time_difference().unwrap_or_default(),
        ]);
    }
    table
}

pub fn unknown_scan_table(report: &QrStatusReport, style: DateStyle) -> Table {
    let mut table = Table::new(["QR Code ID", "Scanned By", "Scan Date", "Scans"]);
    for u in &report.unknown {
        table.push(vec![
            u.qr_id.clone(),
            u.scanned_by.clone(),
            opt_date(u.scan_date, style),
            u.scans.to_string(),
        ]);
    }
    table
}

//! QR master list reconciled against scan logs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::ingest::coerce::{format_duration, minutes_between};
use crate::ingest::records::{QrMasterRecord, ScanRecord};
use crate::reference::{ResolveOptions, Resolver};

pub const UNDERGROUND_DUSTBIN: &str = "Underground Dustbin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Scanned,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrStatusRow {
    pub qr_id: String,
    pub ward: String,
    pub zone: String,
    pub assigned_to: String,
    pub zonal_head: String,
    pub building: String,
    pub site_name: String,
    pub kind: String,
    pub status: ScanStatus,
    pub scanned_by: Option<String>,
    pub scan_date: Option<NaiveDate>,
    pub before_time: Option<NaiveTime>,
    pub after_time: Option<NaiveTime>,
}

impl QrStatusRow {
    /// `Xm`/`Xh Ym` between the before and after clean times, when both exist.
    pub fn time_difference(&self) -> Option<String> {
        match (self.before_time, self.after_time) {
            (Some(before), Some(after)) => Some(format_duration(minutes_between(before, after))),
            _ => None,
        }
    }
}

/// A scanned code that is not on the master list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownScan {
    pub qr_id: String,
    pub scanned_by: String,
    pub scan_date: Option<NaiveDate>,
    pub scans: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusTally {
    pub total: usize,
    pub scanned: usize,
    pub pending: usize,
}

impl StatusTally {
    fn add(&mut self, status: ScanStatus) {
        self.total += 1;
        match status {
            ScanStatus::Scanned => self.scanned += 1,
            ScanStatus::Pending => self.pending += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QrStats {
    pub total: usize,
    pub scanned: usize,
    pub pending: usize,
    pub unknown: usize,
    /// Rounded to a whole percent.
    pub scanned_percent: u32,
    pub by_zone: BTreeMap<String, StatusTally>,
    pub by_zonal_head: BTreeMap<String, StatusTally>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QrStatusReport {
    pub rows: Vec<QrStatusRow>,
    pub unknown: Vec<UnknownScan>,
    /// Every scan date seen, newest first, whether or not a date filter is set.
    pub available_dates: Vec<NaiveDate>,
    pub stats: QrStats,
}

impl QrStatusReport {
    #[tracing::instrument(
        skip_all,
        fields(master = master.len(), scans = scans.len(), date = ?date)
    )]
    pub fn build(
        master: &[QrMasterRecord],
        scans: &[ScanRecord],
        resolver: &Resolver<'_>,
        date: Option<NaiveDate>,
    ) -> Self {
        let options = ResolveOptions::default();
        let mut rows: Vec<QrStatusRow> = Vec::with_capacity(master.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for m in master {
            let resolution = resolver.resolve_ward(&m.ward, &options);
            let row = QrStatusRow {
                qr_id: m.qr_id.trim().to_string(),
                ward: m.ward.clone(),
                zone: resolver.data().zone_name(&m.zone),
                assigned_to: resolution.supervisor_name().to_string(),
                zonal_head: resolution.zonal_head().to_string(),
                building: m.building.clone(),
                site_name: m.site_name.clone(),
                kind: classify(&m.site_name, &m.kind),
                status: ScanStatus::Pending,
                scanned_by: None,
                scan_date: None,
                before_time: None,
                after_time: None,
            };
            match index.get(&row.qr_id) {
                Some(&i) => rows[i] = row,
                None => {
                    index.insert(row.qr_id.clone(), rows.len());
                    rows.push(row);
                }
            }
        }

        let mut unknown: Vec<UnknownScan> = Vec::new();
        let mut dates = BTreeSet::new();

        for scan in scans {
            if let Some(d) = scan.date {
                dates.insert(d);
            }
            if date.is_some() && scan.date != date {
                continue;
            }

            let qr_id = scan.qr_id.trim();
            match index.get(qr_id) {
                Some(&i) => {
                    let row = &mut rows[i];
                    if row.status == ScanStatus::Pending {
                        row.status = ScanStatus::Scanned;
                        row.scanned_by = Some(scan.scanned_by.clone());
                        row.scan_date = scan.date;
                    }
                    if scan.before_time.is_some() {
                        row.before_time = scan.before_time;
                    }
                    if scan.after_time.is_some() {
                        row.after_time = scan.after_time;
                    }
                }
                None => match unknown.iter_mut().find(|u| u.qr_id == qr_id) {
                    Some(u) => u.scans += 1,
                    None => {
                        debug!(qr_id, "Scan of a code missing from the master list");
                        unknown.push(UnknownScan {
                            qr_id: qr_id.to_string(),
                            scanned_by: scan.scanned_by.clone(),
                            scan_date: scan.date,
                            scans: 1,
                        });
                    }
                },
            }
        }

        let stats = summarize(&rows, unknown.len());
        info!(
            total = stats.total,
            scanned = stats.scanned,
            pending = stats.pending,
            unknown = stats.unknown,
            "Built QR status report"
        );

        QrStatusReport {
            rows,
            unknown,
            available_dates: dates.into_iter().rev().collect(),
            stats,
        }
    }
}

fn classify(site_name: &str, kind: &str) -> String {
    let upper = site_name.to_uppercase();
    if upper.contains("UNDERGROUND") || upper.contains("UNDER GROUND") {
        UNDERGROUND_DUSTBIN.to_string()
    } else {
        kind.trim().to_string()
    }
}

fn summarize(rows: &[QrStatusRow], unknown: usize) -> QrStats {
    let mut stats = QrStats {
        unknown,
        ..Default::default()
    };
    let mut all = StatusTally::default();
    for row in rows {
        all.add(row.status);
        stats.by_zone.entry(row.zone.clone()).or_default().add(row.status);
        stats
            .by_zonal_head
            .entry(row.zonal_head.clone())
            .or_default()
            .add(row.status);
    }
    stats.total = all.total;
    stats.scanned = all.scanned;
    stats.pending = all.pending;
    stats.scanned_percent = if all.total > 0 {
        (all.scanned as f64 / all.total as f64 * 100.0).round() as u32
    } else {
        0
    };
    stats
}

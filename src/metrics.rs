//! Target-vs-actual metrics for household KYC tracking.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{RecordFilter, pct};
use crate::ingest::coerce::natural_cmp;
use crate::ingest::records::KycRecord;
use crate::reference::ward::{first_digit_run, strip_leading_zeros};
use crate::reference::{ReferenceData, ResolveOptions, Resolver, Supervisor, UNASSIGNED};

/// Gap and coverage of one target. `gap` is negative when the target is exceeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WardGap {
    pub target: f64,
    pub current: f64,
    pub gap: f64,
    pub coverage_percent: f64,
}

pub fn ward_gap(target: f64, current: f64) -> WardGap {
    WardGap {
        target,
        current,
        gap: target - current,
        coverage_percent: pct(current, target),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KycGapRow {
    pub ward_number: String,
    pub ward_name: String,
    #[serde(flatten)]
    pub metrics: WardGap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KycGapReport {
    pub rows: Vec<KycGapRow>,
    /// Households whose ward is missing or has no target.
    pub unassigned: f64,
    pub total: WardGap,
}

impl KycGapReport {
    /// One row per ward in the target table, in natural ward order.
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub fn build(records: &[KycRecord], reference: &ReferenceData) -> Self {
        let mut done: BTreeMap<String, f64> = reference
            .ward_targets
            .keys()
            .map(|k| (strip_leading_zeros(k), 0.0))
            .collect();
        let mut unassigned = 0.0;

        for record in records {
            let slot = first_digit_run(&record.ward)
                .map(|n| strip_leading_zeros(&n))
                .and_then(|n| done.get_mut(&n));
            match slot {
                Some(count) => *count += record.weight(),
                None => {
                    debug!(ward = %record.ward, "KYC row has no target ward");
                    unassigned += record.weight();
                }
            }
        }

        let mut rows: Vec<KycGapRow> = done
            .into_iter()
            .map(|(number, current)| {
                let target = reference.ward_target(&number).unwrap_or(0.0);
                KycGapRow {
                    ward_name: reference.ward_name(&number).unwrap_or_default().to_string(),
                    metrics: ward_gap(target, current),
                    ward_number: number,
                }
            })
            .collect();
        rows.sort_by(|a, b| natural_cmp(&a.ward_number, &b.ward_number));

        let target: f64 = rows.iter().map(|r| r.metrics.target).sum();
        let current: f64 = rows.iter().map(|r| r.metrics.current).sum();

        info!(wards = rows.len(), unassigned, "Built KYC gap report");
        KycGapReport {
            rows,
            unassigned,
            total: ward_gap(target, current),
        }
    }
}

/// KYC rows attributed to one supervisor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorCount {
    pub employee_id: String,
    pub name: String,
    pub mobile: String,
    /// Zonal head for master-list supervisors, otherwise the upload's zone.
    pub zone: String,
    pub wards: String,
    pub count: usize,
    pub ward_counts: BTreeMap<String, usize>,
    pub is_master: bool,
}

/// Which supervisors a count report covers.
#[derive(Debug, Clone, Default)]
pub struct CountScope {
    /// Department restriction and exclusions for master-list supervisors.
    pub options: ResolveOptions,
    /// List every in-scope master-list supervisor, at zero when they have no rows.
    pub seed_roster: bool,
    /// Only supervisors covering one of these wards; empty keeps everyone.
    pub wards: Vec<String>,
}

impl CountScope {
    fn includes(&self, supervisor: &Supervisor) -> bool {
        self.options.allows(supervisor)
            && (self.wards.is_empty()
                || self.wards.iter().any(|w| Resolver::covers_ward(supervisor, w)))
    }
}

fn master_entry(s: &Supervisor) -> SupervisorCount {
    SupervisorCount {
        employee_id: s.employee_id.clone(),
        name: s.name.clone(),
        mobile: s.mobile.clone(),
        zone: or_unassigned(&s.zonal_head),
        wards: s.ward_set.display(),
        count: 0,
        ward_counts: BTreeMap::new(),
        is_master: true,
    }
}

fn count_key(entry: &SupervisorCount) -> String {
    if entry.employee_id.is_empty() {
        entry.name.to_lowercase()
    } else {
        entry.employee_id.to_uppercase()
    }
}

/// Counts KYC rows per supervisor, matched by employee id then by name.
///
/// Rows matched to a master-list supervisor outside `scope` are left out. Rows
/// matching nobody keep their raw id and name; with a ward restriction they
/// must also come from one of those wards. Sorted by count, highest first.
/// Rows with neither id nor name go to `Unknown`.
#[tracing::instrument(skip_all, fields(records = records.len(), roster = scope.seed_roster))]
pub fn supervisor_counts(
    records: &[KycRecord],
    resolver: &Resolver<'_>,
    scope: &CountScope,
) -> Vec<SupervisorCount> {
    let mut stats: BTreeMap<String, SupervisorCount> = BTreeMap::new();
    let mut excluded = 0;

    if scope.seed_roster {
        for s in resolver.roster(&scope.options) {
            if scope.includes(s) {
                let entry = master_entry(s);
                stats.entry(count_key(&entry)).or_insert(entry);
            }
        }
    }

    let ward_filter = RecordFilter {
        wards: scope.wards.clone(),
        ..RecordFilter::default()
    };

    for record in records {
        let master = resolver.by_id_or_name(&record.supervisor_id, &record.supervisor_name);
        let raw_id = record.supervisor_id.trim().to_uppercase();
        let raw_name = record.supervisor_name.trim();

        let in_scope = match master {
            Some(s) => scope.includes(s),
            None => ward_filter.matches_ward(&record.ward),
        };
        if !in_scope {
            excluded += 1;
            continue;
        }

        let entry = match master {
            Some(s) => master_entry(s),
            None => SupervisorCount {
                employee_id: raw_id.clone(),
                name: if raw_name.is_empty() {
                    "Unknown".to_string()
                } else {
                    raw_name.to_string()
                },
                mobile: record.supervisor_mobile.trim().to_string(),
                zone: or_unassigned(&record.zone),
                wards: "N/A".to_string(),
                count: 0,
                ward_counts: BTreeMap::new(),
                is_master: false,
            },
        };

        let key = count_key(&entry);
        let ward = if record.ward.trim().is_empty() { "Unknown" } else { record.ward.trim() };

        let slot = stats.entry(key).or_insert(entry);
        slot.count += 1;
        *slot.ward_counts.entry(ward.to_string()).or_default() += 1;
    }

    let mut out: Vec<SupervisorCount> = stats.into_values().collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| natural_cmp(&a.name, &b.name)));

    if excluded > 0 {
        debug!(excluded, "Left out KYC rows outside the supervisor scope");
    }
    info!(
        supervisors = out.len(),
        unmatched = out.iter().filter(|s| !s.is_master).count(),
        idle = out.iter().filter(|s| s.count == 0).count(),
        "Counted KYC rows per supervisor"
    );
    out
}

fn or_unassigned(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        UNASSIGNED.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalCount {
    pub zonal_head: String,
    pub supervisors: usize,
    pub kyc_count: usize,
}

/// Supervisors and KYC rows per zonal head, highest count first.
pub fn zonal_rollup(counts: &[SupervisorCount]) -> Vec<ZonalCount> {
    let mut by_zone: BTreeMap<&str, ZonalCount> = BTreeMap::new();
    for s in counts {
        let z = by_zone.entry(s.zone.as_str()).or_insert_with(|| ZonalCount {
            zonal_head: s.zone.clone(),
            supervisors: 0,
            kyc_count: 0,
        });
        z.supervisors += 1;
        z.kyc_count += s.count;
    }

    let mut out: Vec<ZonalCount> = by_zone.into_values().collect();
    out.sort_by(|a, b| match b.kyc_count.cmp(&a.kyc_count) {
        Ordering::Equal => natural_cmp(&a.zonal_head, &b.zonal_head),
        other => other,
    });
    out
}

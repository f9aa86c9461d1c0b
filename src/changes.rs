//! Route × date vehicle tracking and change counting.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{RecordFilter, pct};
use crate::ingest::coerce::natural_cmp;
use crate::ingest::records::PoiRecord;
use crate::reference::{ResolveOptions, Resolver, UNASSIGNED, canonical_ward};

/// Fields a route-log row needs before it can take part in change detection.
pub const ROUTE_IDENTITY: &[&str] = &["route_name", "vehicle_number", "date"];

/// Sorted, de-duplicated calendar dates shared by every route of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateAxis(Vec<NaiveDate>);

impl DateAxis {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let set: BTreeSet<NaiveDate> = dates.into_iter().collect();
        DateAxis(set.into_iter().collect())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A route's record on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayEntry {
    pub vehicle: String,
    pub total: f64,
    pub covered: f64,
    pub coverage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteHistory {
    pub route_name: String,
    pub ward: String,
    pub zone: String,
    pub supervisor: String,
    pub zonal_head: String,
    pub per_date: BTreeMap<NaiveDate, DayEntry>,
}

/// Result of walking one route along the axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSummary {
    pub change_count: usize,
    pub unique_vehicles: BTreeSet<String>,
}

impl RouteHistory {
    pub fn new(route_name: &str, ward: &str, zone: &str) -> Self {
        RouteHistory {
            route_name: route_name.to_string(),
            ward: ward.to_string(),
            zone: zone.to_string(),
            supervisor: UNASSIGNED.to_string(),
            zonal_head: UNASSIGNED.to_string(),
            per_date: BTreeMap::new(),
        }
    }

    /// Records `vehicle` for `date`; a later entry for the same date replaces an earlier one.
    pub fn record(&mut self, date: NaiveDate, vehicle: &str, total: f64, covered: f64) {
        self.per_date.insert(
            date,
            DayEntry {
                vehicle: vehicle.trim().to_string(),
                total,
                covered,
                coverage_percent: pct(covered, total),
            },
        );
    }

    /// Counts adjacent vehicle changes along `axis`. Dates without an entry are
    /// skipped and do not reset the last seen vehicle.
    pub fn detect_changes(&self, axis: &DateAxis) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        let mut last_seen: Option<&str> = None;

        for date in axis.dates() {
            let Some(entry) = self.per_date.get(date) else {
                continue;
            };
            let vehicle = entry.vehicle.as_str();
            if last_seen.is_some_and(|prev| prev != vehicle) {
                summary.change_count += 1;
            }
            last_seen = Some(vehicle);
            summary.unique_vehicles.insert(vehicle.to_string());
        }

        summary
    }
}

/// Per-date sums across every route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayTotals {
    pub total: f64,
    pub covered: f64,
}

impl DayTotals {
    pub fn coverage_percent(&self) -> f64 {
        pct(self.covered, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
    pub history: RouteHistory,
    pub summary: ChangeSummary,
}

/// All route histories of one upload, on a common date axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteMatrix {
    pub axis: DateAxis,
    pub routes: Vec<RouteRow>,
    pub day_totals: BTreeMap<NaiveDate, DayTotals>,
}

impl RouteMatrix {
    /// Builds one history per (ward, route), cumulative over every date. Ward
    /// spellings that differ only by leading zeros share a history.
    ///
    /// Records without a route, a vehicle or a date carry no vehicle assignment
    /// and are skipped.
    #[tracing::instrument(skip(records, resolver), fields(records = records.len()))]
    pub fn build(
        records: &[PoiRecord],
        filter: &RecordFilter,
        resolver: Option<Resolver<'_>>,
        options: &ResolveOptions,
    ) -> Self {
        let mut histories: BTreeMap<(String, String), RouteHistory> = BTreeMap::new();
        let mut skipped = 0;

        for record in filter.apply(records) {
            let route = record.route_name.trim();
            let vehicle = record.vehicle_number.trim();
            let Some(date) = record.date.filter(|_| !route.is_empty() && !vehicle.is_empty())
            else {
                skipped += 1;
                continue;
            };
            let ward = canonical_ward(&record.ward);
            let key = (ward.clone(), route.to_string());
            histories
                .entry(key)
                .or_insert_with(|| {
                    let zone = match resolver {
                        Some(r) => r.data().zone_name(&record.zone),
                        None => record.zone.trim().to_string(),
                    };
                    RouteHistory::new(route, &ward, &zone)
                })
                .record(date, vehicle, record.total, record.covered);
        }
        if skipped > 0 {
            debug!(skipped, "Skipped records without route, vehicle or date");
        }

        let axis = DateAxis::new(histories.values().flat_map(|h| h.per_date.keys().copied()));

        let mut routes: Vec<RouteRow> = histories
            .into_values()
            .map(|mut history| {
                if let Some(r) = resolver {
                    let resolution = r.resolve_ward(&history.ward, options);
                    history.supervisor = resolution.supervisor_name().to_string();
                    history.zonal_head = resolution.zonal_head().to_string();
                }
                let summary = history.detect_changes(&axis);
                RouteRow { history, summary }
            })
            .collect();

        routes.sort_by(|a, b| {
            natural_cmp(&a.history.ward, &b.history.ward)
                .then_with(|| natural_cmp(&a.history.route_name, &b.history.route_name))
        });

        let mut day_totals: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
        for row in &routes {
            for (date, entry) in &row.history.per_date {
                let t = day_totals.entry(*date).or_default();
                t.total += entry.total;
                t.covered += entry.covered;
            }
        }

        info!(
            routes = routes.len(),
            dates = axis.len(),
            changed = routes.iter().filter(|r| r.summary.change_count > 0).count(),
            "Built route matrix"
        );

        RouteMatrix {
            axis,
            routes,
            day_totals,
        }
    }

    /// Routes with at least `min_changes` vehicle changes.
    pub fn with_min_changes(&self, min_changes: usize) -> Vec<&RouteRow> {
        self.routes
            .iter()
            .filter(|r| r.summary.change_count >= min_changes)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::test_support::poi;
    use crate::reference::fixtures::reference;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn history(seq: &[(u32, &str)]) -> RouteHistory {
        let mut h = RouteHistory::new("R1", "1-Birjapur", "1");
        for (d, v) in seq {
            h.record(day(*d), v, 10.0, 5.0);
        }
        h
    }

    #[test]
    fn test_change_count_over_full_axis() {
        let axis = DateAxis::new((1..=5).map(day));
        let h = history(&[(1, "A"), (2, "A"), (3, "B"), (4, "B"), (5, "A")]);
        let summary = h.detect_changes(&axis);
        assert_eq!(summary.change_count, 3);
        assert_eq!(summary.unique_vehicles.len(), 2);
    }

    #[test]
    fn test_missing_date_is_skipped_not_a_change() {
        let axis = DateAxis::new((1..=5).map(day));
        let h = history(&[(1, "A"), (2, "A"), (4, "B"), (5, "A")]);
        assert_eq!(h.detect_changes(&axis).change_count, 2);
    }

    #[test]
    fn test_single_vehicle_never_changes() {
        let axis = DateAxis::new((1..=3).map(day));
        let h = history(&[(3, "A"), (1, "A")]);
        assert_eq!(h.detect_changes(&axis).change_count, 0);
    }

    #[test]
    fn test_axis_sorts_calendar_dates() {
        let axis = DateAxis::new([day(10), day(2), day(10)]);
        assert_eq!(axis.dates(), &[day(2), day(10)]);
    }

    #[test]
    fn test_route_matrix_resolves_and_totals() {
        let records = vec![
            poi("10-Gandhi Nagar", "R10", "V1", Some((2, 1)), 10.0, 5.0),
            poi("2-Atas", "R2", "V1", Some((10, 1)), 10.0, 5.0),
            poi("2-Atas", "R2", "V2", Some((2, 1)), 10.0, 10.0),
            poi("2-Atas", "R2", "V9", Some((2, 1)), 10.0, 7.0),
            poi("2-Atas", "", "V3", Some((2, 1)), 10.0, 10.0),
        ];
        let data = reference();
        let matrix = RouteMatrix::build(
            &records,
            &RecordFilter::default(),
            Some(Resolver::new(&data)),
            &ResolveOptions::default(),
        );

        assert_eq!(matrix.routes.len(), 2);
        assert_eq!(matrix.routes[0].history.ward, "2-Atas");
        assert_eq!(matrix.routes[0].history.supervisor, "Asha Verma");
        assert_eq!(matrix.routes[0].history.zone, "City Zone");
        // last row for 2 Jan wins: V9, then V1 on 10 Jan
        assert_eq!(matrix.routes[0].summary.change_count, 1);
        assert_eq!(matrix.routes[1].history.zonal_head, "Ravi Kumar");

        let jan2 = matrix.day_totals.get(&day(2)).unwrap();
        assert_eq!(jan2.total, 20.0);
        assert_eq!(jan2.covered, 12.0);
        assert_eq!(matrix.with_min_changes(1).len(), 1);
    }

    #[test]
    fn test_blank_vehicle_cell_is_not_a_change() {
        let records = vec![
            poi("1-Birjapur", "R1", "A", Some((1, 1)), 10.0, 5.0),
            poi("1-Birjapur", "R1", " ", Some((2, 1)), 10.0, 5.0),
            poi("1-Birjapur", "R1", "A", Some((3, 1)), 10.0, 5.0),
        ];
        let matrix = RouteMatrix::build(
            &records,
            &RecordFilter::default(),
            None,
            &ResolveOptions::default(),
        );

        assert_eq!(matrix.routes.len(), 1);
        let summary = &matrix.routes[0].summary;
        assert_eq!(summary.change_count, 0);
        assert_eq!(summary.unique_vehicles, BTreeSet::from(["A".to_string()]));
        assert!(!matrix.day_totals.contains_key(&day(2)));
    }

    #[test]
    fn test_zero_padded_ward_spelling_shares_one_route() {
        let records = vec![
            poi("1-Birjapur", "R1", "A", Some((1, 1)), 10.0, 5.0),
            poi("01-Birjapur", "R1", "B", Some((2, 1)), 10.0, 5.0),
            poi("1-Birjapur", "R1", "A", Some((3, 1)), 10.0, 5.0),
        ];
        let data = reference();
        let matrix = RouteMatrix::build(
            &records,
            &RecordFilter::default(),
            Some(Resolver::new(&data)),
            &ResolveOptions::default(),
        );

        assert_eq!(matrix.routes.len(), 1);
        assert_eq!(matrix.routes[0].history.ward, "1-Birjapur");
        assert_eq!(matrix.routes[0].history.supervisor, "Asha Verma");
        assert_eq!(matrix.routes[0].summary.change_count, 2);
    }
}

//! Grouping engine: records → ordered buckets with sums, counts and coverage.
//!
//! Buckets are created lazily per key, mutated only while folding, and read-only
//! afterwards. The grand total is always recomputed from the buckets.

pub mod filter;
pub mod key;
pub mod matrix;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::ingest::records::PoiRecord;
use crate::reference::{ResolveOptions, Resolver, UNASSIGNED, canonical_ward};

pub use filter::RecordFilter;
pub use key::{Dimension, GroupKey, KeyPart};
pub use matrix::CoverageMatrix;

/// Label for records with no parseable date in a date-keyed view.
pub const UNDATED: &str = "Undated";

/// Scheduled/covered quantities of one record.
pub trait Measured {
    fn scheduled(&self) -> f64;
    fn covered(&self) -> f64;
    fn not_covered(&self) -> f64;
    fn date(&self) -> Option<NaiveDate>;
    fn ward(&self) -> &str;
    fn zone(&self) -> &str {
        ""
    }
    fn vehicle(&self) -> &str {
        ""
    }
    fn route(&self) -> &str {
        ""
    }
}

impl Measured for PoiRecord {
    fn scheduled(&self) -> f64 {
        self.total
    }
    fn covered(&self) -> f64 {
        self.covered
    }
    fn not_covered(&self) -> f64 {
        self.not_covered
    }
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }
    fn ward(&self) -> &str {
        &self.ward
    }
    fn zone(&self) -> &str {
        &self.zone
    }
    fn vehicle(&self) -> &str {
        &self.vehicle_number
    }
    fn route(&self) -> &str {
        &self.route_name
    }
}

/// Percentage of `part` in `total`, `0` when `total` is not positive.
pub fn pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub key: GroupKey,
    pub total_scheduled: f64,
    pub total_covered: f64,
    pub total_not_covered: f64,
    pub entry_count: usize,
    pub route_names: BTreeSet<String>,
    pub vehicles: BTreeSet<String>,
    pub wards: BTreeSet<String>,
}

impl AggregateBucket {
    pub fn new(key: GroupKey) -> Self {
        AggregateBucket {
            key,
            total_scheduled: 0.0,
            total_covered: 0.0,
            total_not_covered: 0.0,
            entry_count: 0,
            route_names: BTreeSet::new(),
            vehicles: BTreeSet::new(),
            wards: BTreeSet::new(),
        }
    }

    pub fn add<T: Measured + ?Sized>(&mut self, record: &T) {
        self.total_scheduled += record.scheduled();
        self.total_covered += record.covered();
        self.total_not_covered += record.not_covered();
        self.entry_count += 1;
        insert_non_empty(&mut self.route_names, record.route());
        insert_non_empty(&mut self.vehicles, record.vehicle());
        insert_non_empty(&mut self.wards, record.ward());
    }

    /// Unclamped ratio of the sums.
    pub fn coverage_percent(&self) -> f64 {
        pct(self.total_covered, self.total_scheduled)
    }

    /// Ratio as shown to users, capped to `[0, 100]`.
    pub fn display_coverage(&self) -> f64 {
        self.coverage_percent().clamp(0.0, 100.0)
    }
}

fn insert_non_empty(set: &mut BTreeSet<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        set.insert(value.to_string());
    }
}

/// Grand-total row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub total_scheduled: f64,
    pub total_covered: f64,
    pub total_not_covered: f64,
    pub entry_count: usize,
}

impl Totals {
    pub fn from_buckets<'a>(buckets: impl IntoIterator<Item = &'a AggregateBucket>) -> Self {
        buckets.into_iter().fold(Totals::default(), |mut t, b| {
            t.total_scheduled += b.total_scheduled;
            t.total_covered += b.total_covered;
            t.total_not_covered += b.total_not_covered;
            t.entry_count += b.entry_count;
            t
        })
    }

    pub fn coverage_percent(&self) -> f64 {
        pct(self.total_covered, self.total_scheduled)
    }

    pub fn display_coverage(&self) -> f64 {
        self.coverage_percent().clamp(0.0, 100.0)
    }
}

/// Which records an aggregation looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Mode {
    /// Only the most recent calendar date present in the input.
    LatestSnapshot,
    #[default]
    Cumulative,
}

/// Most recent date across `records`, compared as calendar dates.
pub fn latest_date<'a, T: Measured + 'a>(
    records: impl IntoIterator<Item = &'a T>,
) -> Option<NaiveDate> {
    records.into_iter().filter_map(|r| r.date()).max()
}

/// Restricts `records` according to `mode`. Undated records never belong to a snapshot.
pub fn select<'a, T: Measured>(
    records: Vec<&'a T>,
    mode: Mode,
) -> (Vec<&'a T>, Option<NaiveDate>) {
    match mode {
        Mode::Cumulative => (records, None),
        Mode::LatestSnapshot => {
            let latest = latest_date(records.iter().copied());
            let kept = records
                .into_iter()
                .filter(|r| latest.is_some() && r.date() == latest)
                .collect();
            (kept, latest)
        }
    }
}

/// Ordered buckets plus their grand total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub dimensions: Vec<Dimension>,
    pub buckets: Vec<AggregateBucket>,
    pub totals: Totals,
    /// Set when built in [`Mode::LatestSnapshot`].
    pub snapshot_date: Option<NaiveDate>,
}

impl Aggregation {
    /// Folds pre-keyed records into buckets ordered by key.
    pub fn from_keyed<'a, T, I>(dimensions: &[Dimension], keyed: I) -> Self
    where
        T: Measured + 'a,
        I: IntoIterator<Item = (GroupKey, &'a T)>,
    {
        let mut map: BTreeMap<GroupKey, AggregateBucket> = BTreeMap::new();
        for (key, record) in keyed {
            map.entry(key.clone())
                .or_insert_with(|| AggregateBucket::new(key))
                .add(record);
        }
        let buckets: Vec<AggregateBucket> = map.into_values().collect();
        let totals = Totals::from_buckets(&buckets);
        Aggregation {
            dimensions: dimensions.to_vec(),
            buckets,
            totals,
            snapshot_date: None,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&AggregateBucket> {
        self.buckets.iter().find(|b| &b.key == key)
    }

    /// Adds zero buckets for calendar days in `[from, to]` that have no records.
    /// Only meaningful for a view keyed by [`Dimension::Date`] alone.
    pub fn fill_dates(&mut self, from: NaiveDate, to: NaiveDate) {
        if self.dimensions != [Dimension::Date] {
            return;
        }
        let present: BTreeSet<NaiveDate> = self
            .buckets
            .iter()
            .filter_map(|b| b.key.parts().first().and_then(KeyPart::as_date))
            .collect();
        for day in from.iter_days().take_while(|d| *d <= to) {
            if !present.contains(&day) {
                self.buckets
                    .push(AggregateBucket::new(GroupKey::single(KeyPart::Date(day))));
            }
        }
        self.buckets.sort_by(|a, b| a.key.cmp(&b.key));
    }
}

/// Dimension values for route-coverage records.
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    pub resolver: Option<Resolver<'a>>,
    pub options: &'a ResolveOptions,
}

impl<'a> KeyContext<'a> {
    pub fn new(resolver: Option<Resolver<'a>>, options: &'a ResolveOptions) -> Self {
        Self { resolver, options }
    }

    pub fn part<T: Measured>(&self, record: &T, dimension: Dimension) -> KeyPart {
        match dimension {
            Dimension::Ward => {
                KeyPart::text(or_sentinel(&canonical_ward(record.ward()), UNASSIGNED))
            }
            Dimension::Zone => match self.resolver {
                Some(r) => KeyPart::text(r.data().zone_name(record.zone())),
                None => KeyPart::text(or_sentinel(record.zone(), "-")),
            },
            Dimension::Supervisor => KeyPart::text(self.resolve(record).supervisor_name()),
            Dimension::ZonalHead => KeyPart::text(self.resolve(record).zonal_head()),
            Dimension::Date => match record.date() {
                Some(d) => KeyPart::Date(d),
                None => KeyPart::text(UNDATED),
            },
            Dimension::Vehicle => KeyPart::text(or_sentinel(record.vehicle(), "Unknown")),
            Dimension::Route => KeyPart::text(or_sentinel(record.route(), "Unknown")),
        }
    }

    pub fn key<T: Measured>(&self, record: &T, dimensions: &[Dimension]) -> GroupKey {
        GroupKey(dimensions.iter().map(|d| self.part(record, *d)).collect())
    }

    fn resolve<T: Measured>(&self, record: &T) -> crate::reference::Resolution<'a> {
        match self.resolver {
            Some(r) => r.resolve_ward(record.ward(), self.options),
            None => crate::reference::Resolution::Unassigned,
        }
    }
}

fn or_sentinel(value: &str, sentinel: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        sentinel.to_string()
    } else {
        value.to_string()
    }
}

/// Filter, select by mode, key and fold in one call.
#[tracing::instrument(skip(records, ctx), fields(records = records.len()))]
pub fn aggregate<T: Measured>(
    records: &[T],
    dimensions: &[Dimension],
    mode: Mode,
    filter: &RecordFilter,
    ctx: &KeyContext<'_>,
) -> Aggregation {
    let (selected, snapshot_date) = select(filter.apply(records), mode);
    let mut aggregation = Aggregation::from_keyed(
        dimensions,
        selected.into_iter().map(|r| (ctx.key(r, dimensions), r)),
    );
    aggregation.snapshot_date = snapshot_date;

    let unassigned = aggregation
        .buckets
        .iter()
        .filter(|b| b.key.parts().iter().any(|p| *p == KeyPart::text(UNASSIGNED)))
        .map(|b| b.entry_count)
        .sum::<usize>();
    debug!(
        buckets = aggregation.len(),
        entries = aggregation.totals.entry_count,
        unassigned,
        ?snapshot_date,
        "Aggregated records"
    );
    aggregation
}

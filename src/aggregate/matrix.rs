use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::{
    AggregateBucket, Dimension, GroupKey, KeyContext, KeyPart, Measured, RecordFilter, Totals,
};

/// One cell per (row key, date); missing cells mean no records that day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    pub key: KeyPart,
    pub cells: BTreeMap<NaiveDate, AggregateBucket>,
    pub total: Totals,
}

impl MatrixRow {
    pub fn cell(&self, date: NaiveDate) -> Option<&AggregateBucket> {
        self.cells.get(&date)
    }
}

/// Row dimension × chronological date axis, cumulative over the filtered input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageMatrix {
    pub row_dimension: Dimension,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<MatrixRow>,
    pub column_totals: BTreeMap<NaiveDate, Totals>,
    pub totals: Totals,
    /// Records left out because they have no date.
    pub undated: usize,
}

impl CoverageMatrix {
    #[tracing::instrument(skip(records, ctx), fields(records = records.len()))]
    pub fn build<T: Measured>(
        records: &[T],
        row_dimension: Dimension,
        filter: &RecordFilter,
        ctx: &KeyContext<'_>,
    ) -> Self {
        let mut grid: BTreeMap<KeyPart, BTreeMap<NaiveDate, AggregateBucket>> = BTreeMap::new();
        let mut dates = BTreeSet::new();
        let mut undated = 0;

        for record in filter.apply(records) {
            let Some(date) = record.date() else {
                undated += 1;
                continue;
            };
            let row_key = ctx.part(record, row_dimension);
            dates.insert(date);
            grid.entry(row_key.clone())
                .or_default()
                .entry(date)
                .or_insert_with(|| {
                    AggregateBucket::new(GroupKey(vec![row_key, KeyPart::Date(date)]))
                })
                .add(record);
        }

        let rows: Vec<MatrixRow> = grid
            .into_iter()
            .map(|(key, cells)| MatrixRow {
                total: Totals::from_buckets(cells.values()),
                key,
                cells,
            })
            .collect();

        let column_totals = dates
            .iter()
            .map(|d| (*d, Totals::from_buckets(rows.iter().filter_map(|r| r.cells.get(d)))))
            .collect();

        let totals = Totals::from_buckets(rows.iter().flat_map(|r| r.cells.values()));

        CoverageMatrix {
            row_dimension,
            dates: dates.into_iter().collect(),
            rows,
            column_totals,
            totals,
            undated,
        }
    }
}

use chrono::NaiveDate;
use serde::Serialize;

use crate::reference::WardKey;
use crate::reference::ward::strip_leading_zeros;

use super::Measured;

/// Inclusive date range plus ward allow-list, applied before aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Raw ward strings or bare numbers; empty means every ward.
    pub wards: Vec<String>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none() && self.wards.is_empty()
    }

    /// A record with no date fails any date bound.
    pub fn matches<T: Measured>(&self, record: &T) -> bool {
        self.matches_date(record.date()) && self.matches_ward(record.ward())
    }

    pub fn matches_date(&self, date: Option<NaiveDate>) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    pub fn matches_ward(&self, raw: &str) -> bool {
        if self.wards.is_empty() {
            return true;
        }
        let key = WardKey::parse(raw);
        let number = key.normalized_number();
        self.wards.iter().any(|wanted| {
            let wanted = wanted.trim();
            if wanted.eq_ignore_ascii_case(raw.trim()) {
                return true;
            }
            match (number.as_deref(), WardKey::parse(wanted).number) {
                (Some(n), Some(w)) => strip_leading_zeros(&w) == n,
                _ => false,
            }
        })
    }

    pub fn apply<'a, T: Measured>(&self, records: &'a [T]) -> Vec<&'a T> {
        records.iter().filter(|r| self.matches(*r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = RecordFilter {
            from: Some(day(2)),
            to: Some(day(4)),
            ..Default::default()
        };
        assert!(!filter.matches_date(Some(day(1))));
        assert!(filter.matches_date(Some(day(2))));
        assert!(filter.matches_date(Some(day(4))));
        assert!(!filter.matches_date(None));
        assert!(RecordFilter::default().matches_date(None));
    }

    #[test]
    fn test_ward_allow_list_matches_number_or_text() {
        let filter = RecordFilter {
            wards: vec!["01".into(), "Civil Lines".into()],
            ..Default::default()
        };
        assert!(filter.matches_ward("1-Birjapur"));
        assert!(filter.matches_ward("civil lines"));
        assert!(!filter.matches_ward("10-Gandhi Nagar"));
    }
}

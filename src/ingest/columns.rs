//! Declarative header matching.
//!
//! Each report describes its canonical fields as a table of [`ColumnMatcher`]s;
//! [`ColumnMap::resolve`] is the one function that applies such a table to an
//! uploaded header row.

use std::collections::HashMap;

/// Canonical field name plus the keyword alternatives that identify its column.
///
/// Keywords are lowercase. A header matches when its trimmed lowercase text equals a
/// keyword (first pass) or contains one (second pass). Keywords written `=word`
/// only take part in the first pass; use them for short words like `id`.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMatcher {
    pub field: &'static str,
    pub keywords: &'static [&'static str],
}

impl ColumnMatcher {
    pub const fn new(field: &'static str, keywords: &'static [&'static str]) -> Self {
        Self { field, keywords }
    }
}

/// Canonical field → column index for one uploaded header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: HashMap<&'static str, usize>,
}

impl ColumnMap {
    /// Applies `matchers` in order. A header claimed by an earlier field is not
    /// offered to later ones; fields without a match are simply absent.
    pub fn resolve(headers: &[String], matchers: &[ColumnMatcher]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut claimed = vec![false; headers.len()];
        let mut columns = HashMap::new();

        for matcher in matchers {
            let exact = normalized.iter().enumerate().find(|(idx, h)| {
                !claimed[*idx]
                    && matcher
                        .keywords
                        .iter()
                        .any(|k| h.as_str() == k.trim_start_matches('='))
            });

            let found = exact.or_else(|| {
                normalized.iter().enumerate().find(|(idx, h)| {
                    !claimed[*idx]
                        && matcher
                            .keywords
                            .iter()
                            .any(|k| !k.starts_with('=') && h.contains(*k))
                })
            });

            if let Some((idx, _)) = found {
                claimed[idx] = true;
                columns.insert(matcher.field, idx);
            }
        }

        Self { columns }
    }

    pub fn index(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Fields from `matchers` that found no column.
    pub fn missing<'a>(&self, matchers: &'a [ColumnMatcher]) -> Vec<&'a str> {
        matchers
            .iter()
            .filter(|m| !self.columns.contains_key(m.field))
            .map(|m| m.field)
            .collect()
    }
}

/// Lowercase, trimmed, inner whitespace collapsed.
pub fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[ColumnMatcher] = &[
        ColumnMatcher::new("not_covered", &["not covered"]),
        ColumnMatcher::new("covered", &["covered"]),
        ColumnMatcher::new("date", &["date of scan", "date"]),
        ColumnMatcher::new("qr_id", &["qr code id", "qr code", "qr id"]),
        ColumnMatcher::new("supervisor_id", &["supervisor id", "=id"]),
    ];

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_beats_substring() {
        let map = ColumnMap::resolve(&headers(&["Scan Date Time", "Date"]), TABLE);
        assert_eq!(map.index("date"), Some(1));
    }

    #[test]
    fn test_substring_match_when_no_exact() {
        let map = ColumnMap::resolve(&headers(&["Sr", "Date Of Scan (IST)"]), TABLE);
        assert_eq!(map.index("date"), Some(1));
    }

    #[test]
    fn test_claimed_header_is_not_reused() {
        let map = ColumnMap::resolve(&headers(&["Not Covered POI", "Covered POI"]), TABLE);
        assert_eq!(map.index("not_covered"), Some(0));
        assert_eq!(map.index("covered"), Some(1));
    }

    #[test]
    fn test_case_and_spacing_are_ignored() {
        let map = ColumnMap::resolve(&headers(&["  QR   CODE ID "]), TABLE);
        assert_eq!(map.index("qr_id"), Some(0));
    }

    #[test]
    fn test_exact_only_keyword_skips_substrings() {
        let map = ColumnMap::resolve(&headers(&["Paid", "Provider"]), TABLE);
        assert!(!map.contains("supervisor_id"));

        let map = ColumnMap::resolve(&headers(&["Paid", "ID"]), TABLE);
        assert_eq!(map.index("supervisor_id"), Some(1));
    }

    #[test]
    fn test_unmatched_field_is_absent() {
        let map = ColumnMap::resolve(&headers(&["Route Name"]), TABLE);
        assert!(!map.contains("covered"));
        assert_eq!(map.missing(TABLE).len(), TABLE.len());
    }
}

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Ward reference parsed from upload text such as `49-Daimpiriyal Nagar`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WardKey {
    pub number: Option<String>,
    pub label: Option<String>,
}

impl WardKey {
    /// Splits at the first hyphen: leading digits before it are the number, the
    /// rest is the label. Without a hyphen, an all-digit value is a bare number and
    /// anything else is a label (its first digit run, if any, is the number).
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some((head, tail)) = raw.split_once('-') {
            let number = leading_digits(head.trim()).or_else(|| first_digit_run(head));
            let label = tail.trim();
            return WardKey {
                number,
                label: (!label.is_empty()).then(|| label.to_string()),
            };
        }

        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            return WardKey {
                number: Some(raw.to_string()),
                label: None,
            };
        }

        WardKey {
            number: first_digit_run(raw),
            label: (!raw.is_empty()).then(|| raw.to_string()),
        }
    }

    /// Number with leading zeros removed (`"01"` → `"1"`).
    pub fn normalized_number(&self) -> Option<String> {
        self.number.as_deref().map(strip_leading_zeros)
    }

    pub fn is_empty(&self) -> bool {
        self.number.is_none() && self.label.is_none()
    }
}

impl fmt::Display for WardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.number, &self.label) {
            (Some(n), Some(l)) => write!(f, "{n}-{l}"),
            (Some(n), None) => write!(f, "{n}"),
            (None, Some(l)) => write!(f, "{l}"),
            (None, None) => Ok(()),
        }
    }
}

/// Wards a supervisor is responsible for.
///
/// `Unrestricted` is the `N/A` sentinel from the master list and is not the same
/// thing as an empty restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WardSet {
    Unrestricted,
    Wards(BTreeSet<String>),
}

impl WardSet {
    /// Parses the comma-joined master-list column.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("n/a")
            || trimmed.eq_ignore_ascii_case("na")
        {
            return WardSet::Unrestricted;
        }
        WardSet::Wards(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, WardSet::Unrestricted)
    }

    /// Exact membership; an unrestricted set contains nothing here.
    pub fn contains_exact(&self, number: &str) -> bool {
        match self {
            WardSet::Unrestricted => false,
            WardSet::Wards(set) => set.contains(number),
        }
    }

    /// Membership ignoring leading zeros on both sides.
    pub fn contains_normalized(&self, number: &str) -> bool {
        let wanted = strip_leading_zeros(number);
        match self {
            WardSet::Unrestricted => false,
            WardSet::Wards(set) => set.iter().any(|w| strip_leading_zeros(w) == wanted),
        }
    }

    /// Membership filtering: unrestricted covers every ward.
    pub fn covers(&self, number: &str) -> bool {
        self.is_unrestricted() || self.contains_normalized(number)
    }

    /// Rendering for export, `N/A` when unrestricted.
    pub fn display(&self) -> String {
        match self {
            WardSet::Unrestricted => "N/A".to_string(),
            WardSet::Wards(set) => set.iter().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

pub fn strip_leading_zeros(number: &str) -> String {
    let stripped = number.trim().trim_start_matches('0');
    if stripped.is_empty() && !number.trim().is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Grouping label for upload ward text: a leading number loses its zeros, so
/// `01-Birjapur` and `1-Birjapur` land together. Other text is only trimmed.
pub fn canonical_ward(raw: &str) -> String {
    let raw = raw.trim();
    if let Some((head, tail)) = raw.split_once('-')
        && !head.trim().is_empty()
        && head.trim().chars().all(|c| c.is_ascii_digit())
    {
        return format!("{}-{}", strip_leading_zeros(head), tail.trim());
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        return strip_leading_zeros(raw);
    }
    raw.to_string()
}

fn leading_digits(text: &str) -> Option<String> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!digits.is_empty()).then_some(digits)
}

/// First run of ASCII digits anywhere in `text`.
pub fn first_digit_run(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    leading_digits(&text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ward_key_splits_at_first_hyphen() {
        let key = WardKey::parse(" 49-Daimpiriyal Nagar-East ");
        assert_eq!(key.number.as_deref(), Some("49"));
        assert_eq!(key.label.as_deref(), Some("Daimpiriyal Nagar-East"));
    }

    #[test]
    fn test_ward_key_bare_forms() {
        assert_eq!(WardKey::parse("01").number.as_deref(), Some("01"));
        assert_eq!(WardKey::parse("01").normalized_number().as_deref(), Some("1"));

        let label = WardKey::parse("Birjapur");
        assert_eq!(label.number, None);
        assert_eq!(label.label.as_deref(), Some("Birjapur"));

        assert_eq!(WardKey::parse("Ward 12").number.as_deref(), Some("12"));
        assert!(WardKey::parse("  ").is_empty());
    }

    #[test]
    fn test_ward_set_sentinels() {
        assert!(WardSet::parse("N/A").is_unrestricted());
        assert!(WardSet::parse("na").is_unrestricted());
        assert!(WardSet::parse("").is_unrestricted());

        let set = WardSet::parse("1, 02,13");
        assert!(set.contains_exact("02"));
        assert!(!set.contains_exact("2"));
        assert!(set.contains_normalized("2"));
        assert!(!set.covers("7"));
        assert!(WardSet::Unrestricted.covers("7"));
        assert!(!WardSet::Unrestricted.contains_exact("7"));
    }

    #[test]
    fn test_strip_leading_zeros_keeps_zero() {
        assert_eq!(strip_leading_zeros("007"), "7");
        assert_eq!(strip_leading_zeros("00"), "0");
        assert_eq!(strip_leading_zeros(""), "");
    }

    #[test]
    fn test_canonical_ward_merges_zero_padded_numbers() {
        assert_eq!(canonical_ward("01-Birjapur"), "1-Birjapur");
        assert_eq!(canonical_ward(" 1 - Birjapur "), "1-Birjapur");
        assert_eq!(canonical_ward("007"), "7");
        assert_eq!(canonical_ward("Ward 01"), "Ward 01");
        assert_eq!(canonical_ward(""), "");
    }
}

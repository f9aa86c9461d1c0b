use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::ingest::coerce::{DateStyle, natural_cmp};

/// Grouping dimension a report can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimension {
    Ward,
    Zone,
    Supervisor,
    ZonalHead,
    Date,
    Vehicle,
    Route,
}

impl Dimension {
    pub fn header(self) -> &'static str {
        match self {
            Dimension::Ward => "Ward",
            Dimension::Zone => "Zone",
            Dimension::Supervisor => "Supervisor",
            Dimension::ZonalHead => "Zonal Head",
            Dimension::Date => "Date",
            Dimension::Vehicle => "Vehicle Number",
            Dimension::Route => "Route Name",
        }
    }
}

/// One component of a bucket key.
///
/// Text parts order naturally (`2-x` before `10-x`), dates chronologically,
/// and every date sorts before any text part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum KeyPart {
    Date(NaiveDate),
    Text(String),
}

impl KeyPart {
    pub fn text(value: impl Into<String>) -> Self {
        KeyPart::Text(value.into())
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            KeyPart::Date(d) => Some(*d),
            KeyPart::Text(_) => None,
        }
    }

    pub fn render(&self, style: DateStyle) -> String {
        match self {
            KeyPart::Date(d) => style.format(*d),
            KeyPart::Text(t) => t.clone(),
        }
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Date(a), KeyPart::Date(b)) => a.cmp(b),
            (KeyPart::Text(a), KeyPart::Text(b)) => natural_cmp(a, b),
            (KeyPart::Date(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Date(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DateStyle::default()))
    }
}

/// Composite bucket key, compared part by part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(pub Vec<KeyPart>);

impl GroupKey {
    pub fn single(part: KeyPart) -> Self {
        GroupKey(vec![part])
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn render(&self, style: DateStyle) -> Vec<String> {
        self.0.iter().map(|p| p.render(style)).collect()
    }
}

//! Static ward → supervisor → zonal-head mapping and key resolution.

pub mod resolver;
pub mod ward;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use resolver::{Resolution, ResolveOptions, Resolver};
pub use ward::{WardKey, WardSet, canonical_ward};

/// Sentinel name for records that match no reference entity.
pub const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Department {
    Ucc,
    CAndT,
    KycTeam,
    Other(String),
}

impl Department {
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "UCC" => Department::Ucc,
            "C&T" | "C & T" | "CANDT" => Department::CAndT,
            "KYC-TEAM" | "KYC TEAM" | "KYC" => Department::KycTeam,
            _ => Department::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Department::Ucc => write!(f, "UCC"),
            Department::CAndT => write!(f, "C&T"),
            Department::KycTeam => write!(f, "KYC-Team"),
            Department::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One master-list row. Immutable for the life of a report session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Supervisor {
    pub employee_id: String,
    pub name: String,
    pub mobile: String,
    pub department: Department,
    pub ward_set: WardSet,
    pub zone_circle: String,
    pub zonal_head: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupervisorRow {
    #[serde(alias = "employeeId")]
    emp_id: String,
    name: String,
    #[serde(default)]
    mobile: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    ward: String,
    #[serde(default)]
    zonal: String,
    #[serde(default)]
    zone_circle: String,
}

impl From<SupervisorRow> for Supervisor {
    fn from(row: SupervisorRow) -> Self {
        Supervisor {
            employee_id: row.emp_id.trim().to_string(),
            name: row.name.trim().to_string(),
            mobile: row.mobile.trim().to_string(),
            department: Department::parse(&row.department),
            ward_set: WardSet::parse(&row.ward),
            zone_circle: row.zone_circle.trim().to_string(),
            zonal_head: row.zonal.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WardEntry {
    pub number: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceFile {
    #[serde(default)]
    supervisors: Vec<SupervisorRow>,
    #[serde(default)]
    wards: Vec<WardEntry>,
    #[serde(default)]
    zone_aliases: BTreeMap<String, String>,
    #[serde(default)]
    ward_targets: BTreeMap<String, f64>,
}

/// Everything static a report joins against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub supervisors: Vec<Supervisor>,
    pub wards: Vec<WardEntry>,
    pub zone_aliases: BTreeMap<String, String>,
    /// Ward number → household KYC target.
    pub ward_targets: BTreeMap<String, f64>,
}

impl ReferenceData {
    pub fn from_json(text: &str) -> Result<Self> {
        let file: ReferenceFile =
            serde_json::from_str(text).context("Failed to parse reference data")?;
        Ok(ReferenceData {
            supervisors: file.supervisors.into_iter().map(Supervisor::from).collect(),
            wards: file.wards,
            zone_aliases: file.zone_aliases,
            ward_targets: file.ward_targets,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference data {}", path.display()))?;
        let data = Self::from_json(&text)?;
        info!(
            supervisors = data.supervisors.len(),
            wards = data.wards.len(),
            targets = data.ward_targets.len(),
            "Loaded reference data"
        );
        Ok(data)
    }

    /// Maps a raw `Zone & Circle` value through the alias table; empty becomes `-`.
    pub fn zone_name(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return "-".to_string();
        }
        self.zone_aliases
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Target for a ward number, ignoring leading zeros.
    pub fn ward_target(&self, number: &str) -> Option<f64> {
        let wanted = ward::strip_leading_zeros(number);
        self.ward_targets
            .iter()
            .find(|(k, _)| ward::strip_leading_zeros(k) == wanted)
            .map(|(_, v)| *v)
    }

    pub fn ward_name(&self, number: &str) -> Option<&str> {
        let wanted = ward::strip_leading_zeros(number);
        self.wards
            .iter()
            .find(|w| ward::strip_leading_zeros(&w.number) == wanted)
            .map(|w| w.name.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ReferenceData;

    pub const REFERENCE_JSON: &str = r#"{
        "supervisors": [
            {"empId": "CT01", "name": "Asha Verma", "mobile": "9000000001", "department": "C&T", "ward": "1, 2", "zonal": "Ravi Kumar", "zoneCircle": "1"},
            {"empId": "CT02", "name": "Mohan Lal", "mobile": "9000000002", "department": "C&T", "ward": "10,49", "zonal": "Ravi Kumar"},
            {"employeeId": "ucc07", "name": "Sita Devi", "mobile": "9000000003", "department": "UCC", "ward": "2", "zonal": "Neha Singh"},
            {"empId": "KT01", "name": "Float Team", "mobile": "", "department": "KYC Team", "ward": "N/A", "zonal": "Neha Singh"}
        ],
        "wards": [
            {"number": "1", "name": "Birjapur"},
            {"number": "2", "name": "Atas"},
            {"number": "10", "name": "Gandhi Nagar"},
            {"number": "49", "name": "Daimpiriyal Nagar"}
        ],
        "zoneAliases": {"1": "City Zone", "2": "Civil Lines"},
        "wardTargets": {"1": 100, "2": 200, "49": 50}
    }"#;

    pub fn reference() -> ReferenceData {
        ReferenceData::from_json(REFERENCE_JSON).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::reference;
    use super::*;

    #[test]
    fn test_reference_json_accepts_both_id_fields() {
        let data = reference();
        assert_eq!(data.supervisors.len(), 4);
        assert_eq!(data.supervisors[2].employee_id, "ucc07");
        assert_eq!(data.supervisors[2].department, Department::Ucc);
        assert_eq!(data.supervisors[0].zone_circle, "1");
        assert!(data.supervisors[3].ward_set.is_unrestricted());
    }

    #[test]
    fn test_zone_alias_lookup() {
        let data = reference();
        assert_eq!(data.zone_name("1"), "City Zone");
        assert_eq!(data.zone_name("7"), "7");
        assert_eq!(data.zone_name(" "), "-");
    }

    #[test]
    fn test_ward_target_ignores_leading_zeros() {
        let data = reference();
        assert_eq!(data.ward_target("01"), Some(100.0));
        assert_eq!(data.ward_target("3"), None);
        assert_eq!(data.ward_name("049"), Some("Daimpiriyal Nagar"));
    }

    #[test]
    fn test_department_parse() {
        assert_eq!(Department::parse("c&t"), Department::CAndT);
        assert_eq!(Department::parse("KYC-Team"), Department::KycTeam);
        assert_eq!(Department::parse("Sanitation"), Department::Other("Sanitation".into()));
        assert_eq!(Department::CAndT.to_string(), "C&T");
    }

    #[test]
    fn test_bad_reference_json_is_an_error() {
        assert!(ReferenceData::from_json("{\"supervisors\": [{}]}").is_err());
    }
}

use tracing::debug;

use super::ward::{WardKey, strip_leading_zeros};
use super::{Department, ReferenceData, Supervisor, UNASSIGNED};

/// Per-call restriction on which supervisors may answer a ward lookup.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Only supervisors of this department.
    pub department: Option<Department>,
    /// Departments left out of this view.
    pub exclude: Vec<Department>,
}

impl ResolveOptions {
    pub fn department(department: Department) -> Self {
        Self {
            department: Some(department),
            exclude: Vec::new(),
        }
    }

    pub fn excluding(departments: &[Department]) -> Self {
        Self {
            department: None,
            exclude: departments.to_vec(),
        }
    }

    /// Whether `supervisor` may take part under these options.
    pub fn allows(&self, supervisor: &Supervisor) -> bool {
        if self.exclude.contains(&supervisor.department) {
            return false;
        }
        self.department
            .as_ref()
            .is_none_or(|d| *d == supervisor.department)
    }
}

/// Outcome of a lookup. Never silently empty: a miss is [`Resolution::Unassigned`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    Matched(&'a Supervisor),
    Unassigned,
}

impl<'a> Resolution<'a> {
    pub fn supervisor(&self) -> Option<&'a Supervisor> {
        match self {
            Resolution::Matched(s) => Some(s),
            Resolution::Unassigned => None,
        }
    }

    pub fn supervisor_name(&self) -> &'a str {
        match self {
            Resolution::Matched(s) => s.name.as_str(),
            Resolution::Unassigned => UNASSIGNED,
        }
    }

    pub fn zonal_head(&self) -> &'a str {
        match self {
            Resolution::Matched(s) if !s.zonal_head.is_empty() => s.zonal_head.as_str(),
            _ => UNASSIGNED,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }
}

/// Single canonical lookup over [`ReferenceData`].
///
/// Ward lookups try, in order: exact ward number, ward label via the ward
/// directory, leading-zero-normalized number, then [`Resolution::Unassigned`].
/// Supervisors with an unrestricted ward set never answer a ward lookup.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    data: &'a ReferenceData,
}

impl<'a> Resolver<'a> {
    pub fn new(data: &'a ReferenceData) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &'a ReferenceData {
        self.data
    }

    pub fn resolve_ward(&self, raw: &str, options: &ResolveOptions) -> Resolution<'a> {
        self.resolve_key(&WardKey::parse(raw), options)
    }

    pub fn resolve_key(&self, key: &WardKey, options: &ResolveOptions) -> Resolution<'a> {
        let candidates = || {
            self.data
                .supervisors
                .iter()
                .filter(|s| options.allows(s) && !s.ward_set.is_unrestricted())
        };

        if let Some(number) = key.number.as_deref()
            && let Some(found) = candidates().find(|s| s.ward_set.contains_exact(number))
        {
            return Resolution::Matched(found);
        }

        if let Some(label) = key.label.as_deref()
            && let Some(entry) = self
                .data
                .wards
                .iter()
                .find(|w| w.name.trim().eq_ignore_ascii_case(label.trim()))
            && let Some(found) = candidates().find(|s| s.ward_set.contains_exact(&entry.number))
        {
            return Resolution::Matched(found);
        }

        if let Some(number) = key.number.as_deref() {
            let normalized = strip_leading_zeros(number);
            let label_number = key.label.as_deref().and_then(|label| {
                self.data
                    .wards
                    .iter()
                    .find(|w| w.name.trim().eq_ignore_ascii_case(label.trim()))
                    .map(|w| w.number.as_str())
            });
            if let Some(found) = candidates().find(|s| {
                s.ward_set.contains_normalized(&normalized)
                    || label_number.is_some_and(|n| s.ward_set.contains_normalized(n))
            }) {
                return Resolution::Matched(found);
            }
        }

        debug!(ward = %key, "Ward did not resolve to a supervisor");
        Resolution::Unassigned
    }

    /// Case- and whitespace-insensitive employee id lookup.
    pub fn by_employee_id(&self, id: &str) -> Option<&'a Supervisor> {
        let wanted = id.trim().to_uppercase();
        if wanted.is_empty() {
            return None;
        }
        self.data
            .supervisors
            .iter()
            .find(|s| s.employee_id.trim().to_uppercase() == wanted)
    }

    /// Employee id first, then case-insensitive name.
    pub fn by_id_or_name(&self, id: &str, name: &str) -> Option<&'a Supervisor> {
        self.by_employee_id(id).or_else(|| {
            let wanted = name.trim().to_lowercase();
            if wanted.is_empty() {
                return None;
            }
            self.data
                .supervisors
                .iter()
                .find(|s| s.name.trim().to_lowercase() == wanted)
        })
    }

    /// Every supervisor of `department`, unrestricted ones included.
    pub fn members_of(&self, department: &Department) -> Vec<&'a Supervisor> {
        self.data
            .supervisors
            .iter()
            .filter(|s| s.department == *department)
            .collect()
    }

    /// Master-list supervisors visible under `options`, in reference order.
    pub fn roster(&self, options: &ResolveOptions) -> Vec<&'a Supervisor> {
        let candidates = match &options.department {
            Some(department) => self.members_of(department),
            None => self.data.supervisors.iter().collect(),
        };
        candidates.into_iter().filter(|s| options.allows(s)).collect()
    }

    /// Membership filter: does `supervisor` cover this ward? Unrestricted covers all.
    pub fn covers_ward(supervisor: &Supervisor, raw_ward: &str) -> bool {
        match WardKey::parse(raw_ward).number {
            Some(number) => supervisor.ward_set.covers(&number),
            None => supervisor.ward_set.is_unrestricted(),
        }
    }
}

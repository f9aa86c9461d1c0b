//! Working dataset of one report, from upload until the next upload.

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{Measured, RecordFilter, pct};
use crate::error::SimulationError;
use crate::ingest::records::PoiRecord;
use crate::ingest::{LoadReport, Normalized};

/// Share of `total` given to a zero-coverage record when simulating.
pub const ZERO_COVERAGE_BUMP: f64 = 0.60;

/// Owns the records one report works on.
///
/// The first simulation keeps a baseline copy of the uploaded data; [`restore`]
/// puts it back. Starting a new upload means dropping the session.
///
/// [`restore`]: ReportSession::restore
#[derive(Debug, Clone)]
pub struct ReportSession<T> {
    working: Vec<T>,
    baseline: Option<Vec<T>>,
    load: LoadReport,
}

impl<T: Clone> ReportSession<T> {
    pub fn new(records: Vec<T>, load: LoadReport) -> Self {
        ReportSession {
            working: records,
            baseline: None,
            load,
        }
    }

    pub fn records(&self) -> &[T] {
        &self.working
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load
    }

    pub fn is_simulated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Puts the uploaded data back. Returns `false` when nothing was simulated.
    pub fn restore(&mut self) -> bool {
        match self.baseline.take() {
            Some(original) => {
                self.working = original;
                info!("Restored uploaded data");
                true
            }
            None => false,
        }
    }

    fn original(&self) -> &[T] {
        self.baseline.as_deref().unwrap_or(&self.working)
    }
}

impl<T: Clone> From<Normalized<T>> for ReportSession<T> {
    fn from(n: Normalized<T>) -> Self {
        ReportSession::new(n.records, n.report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub affected: usize,
    pub before_percent: f64,
    pub after_percent: f64,
}

impl ReportSession<PoiRecord> {
    /// Scales `covered` on every in-scope record towards `target` (a ratio in `(0, 1]`).
    ///
    /// Always computed from the uploaded data, so repeated calls do not compound.
    /// Each record is capped at its own total; zero-coverage records get
    /// [`ZERO_COVERAGE_BUMP`] of their total. Out-of-scope records are untouched.
    pub fn simulate_coverage(
        &mut self,
        scope: &RecordFilter,
        target: f64,
    ) -> Result<SimulationOutcome, SimulationError> {
        if !(target > 0.0 && target <= 1.0) {
            return Err(SimulationError::InvalidTarget(target));
        }

        let original = self.original();
        let (scheduled, covered) = original
            .iter()
            .filter(|r| scope.matches(*r))
            .fold((0.0, 0.0), |(s, c), r| (s + r.scheduled(), c + r.covered()));

        if scheduled <= 0.0 {
            return Err(SimulationError::NothingScheduled);
        }
        let current = covered / scheduled;
        if current >= target {
            return Err(SimulationError::AlreadyAtTarget {
                current: current * 100.0,
                target: target * 100.0,
            });
        }
        let factor = target / current;

        let mut affected = 0;
        let simulated: Vec<PoiRecord> = original
            .iter()
            .map(|r| {
                if !scope.matches(r) {
                    return r.clone();
                }
                affected += 1;
                let new_covered = if r.covered == 0.0 && r.total > 0.0 {
                    (r.total * ZERO_COVERAGE_BUMP).floor()
                } else {
                    (r.covered * factor).floor().min(r.total)
                };
                PoiRecord {
                    covered: new_covered,
                    not_covered: r.total - new_covered,
                    coverage: pct(new_covered, r.total),
                    ..r.clone()
                }
            })
            .collect();

        let after_covered: f64 = simulated
            .iter()
            .filter(|r| scope.matches(*r))
            .map(|r| r.covered)
            .sum();

        if self.baseline.is_none() {
            self.baseline = Some(std::mem::take(&mut self.working));
        }
        self.working = simulated;

        let outcome = SimulationOutcome {
            affected,
            before_percent: current * 100.0,
            after_percent: pct(after_covered, scheduled),
        };
        warn!(
            affected,
            before = outcome.before_percent,
            after = outcome.after_percent,
            "Working data now holds simulated coverage"
        );
        Ok(outcome)
    }
}

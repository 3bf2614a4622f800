//! Run-level accounting.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::orchestrator::OutcomeResult;
use crate::verdict::Tier;

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Final tally of a run. `high + medium + low + skipped + errors == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub skipped: usize,
    pub errors: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub model: String,
}

impl RunSummary {
    pub fn is_balanced(&self) -> bool {
        self.high + self.medium + self.low + self.skipped + self.errors == self.total
    }
}

/// Counters updated once per finalized outcome.
///
/// Owned by the ordering buffer and only touched inside its critical
/// section, so every snapshot is internally consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryAggregator {
    total: usize,
    high: usize,
    medium: usize,
    low: usize,
    skipped: usize,
    errors: usize,
}

impl SummaryAggregator {
    /// Count one finalized outcome.
    pub fn record(&mut self, result: &OutcomeResult) {
        self.total += 1;
        match result {
            OutcomeResult::Verdict(v) => match v.tier {
                Tier::High => self.high += 1,
                Tier::Medium => self.medium += 1,
                Tier::Low => self.low += 1,
            },
            OutcomeResult::Skipped => self.skipped += 1,
            OutcomeResult::Failed(_) => self.errors += 1,
        }
    }

    /// Outcomes recorded so far.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn finish(&self, elapsed: Duration, model: impl Into<String>) -> RunSummary {
        RunSummary {
            total: self.total,
            high: self.high,
            medium: self.medium,
            low: self.low,
            skipped: self.skipped,
            errors: self.errors,
            elapsed,
            model: model.into(),
        }
    }
}

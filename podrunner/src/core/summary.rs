//! Outcome counters and the final verdict.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::exit_codes;

/// Success/failure/timeout counters, used both as the declared expectation
/// and as the running tally.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct Counts {
    #[serde(default)]
    pub successes: u32,
    #[serde(default)]
    pub failures: u32,
    #[serde(default)]
    pub timeouts: u32,
}

impl Counts {
    pub fn new(successes: u32, failures: u32, timeouts: u32) -> Self {
        Self {
            successes,
            failures,
            timeouts,
        }
    }
}

/// Accumulated state of one `podrunner run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counts: Counts,
    pub repetitions_planned: u32,
    pub repetitions_completed: u32,
}

impl Summary {
    pub fn start(repetitions_planned: u32) -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            counts: Counts::default(),
            repetitions_planned,
            repetitions_completed: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.counts.successes = self.counts.successes.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.counts.failures = self.counts.failures.saturating_add(1);
    }

    pub fn record_timeout(&mut self) {
        self.counts.timeouts = self.counts.timeouts.saturating_add(1);
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

/// Result of comparing observed counters with the expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Met,
    NotMet { observed: Counts, expected: Counts },
}

impl Verdict {
    pub fn is_met(&self) -> bool {
        matches!(self, Verdict::Met)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Met => exit_codes::OK,
            Verdict::NotMet { .. } => exit_codes::EXPECTATIONS_NOT_MET,
        }
    }
}

/// Exact equality on all three counters; there is no threshold mode.
pub fn evaluate(summary: &Summary, expected: &Counts) -> Verdict {
    if summary.counts == *expected {
        Verdict::Met
    } else {
        Verdict::NotMet {
            observed: summary.counts,
            expected: *expected,
        }
    }
}

//! Verdict reporting

use std::fmt;

use serde::Serialize;
use tracing::{error, info};

use crate::classify::Verdict;
use crate::orchestrator::BatchResult;

/// Receives each verdict as soon as it is produced
///
/// Called on the orchestrator's path, so implementations must return
/// promptly and must not block.
pub trait Reporter: Send + Sync {
    fn verdict(&self, verdict: &Verdict);
}

/// Logs one line per verdict: `info` for passes, `error` for failures
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn verdict(&self, verdict: &Verdict) {
        if verdict.passed() {
            info!(action = %verdict.action(), "{} test passed", verdict.title());
        } else {
            error!(
                action = %verdict.action(),
                reason = %verdict.reason(),
                "{} test failed",
                verdict.title()
            );
        }
    }
}

/// Discards verdicts
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn verdict(&self, _verdict: &Verdict) {}
}

/// Pass/fail counts for one or more batches
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn of(result: &BatchResult) -> Self {
        let passed = result.verdicts().iter().filter(|v| v.passed()).count();
        Self {
            total: result.verdicts().len(),
            passed,
            failed: result.verdicts().len() - passed,
        }
    }

    /// Combine with another summary
    pub fn merge(self, other: Summary) -> Self {
        Self {
            total: self.total + other.total,
            passed: self.passed + other.passed,
            failed: self.failed + other.failed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tests: {} passed, {} failed",
            self.total, self.passed, self.failed
        )
    }
}

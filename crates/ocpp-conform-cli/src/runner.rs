//! Runs the selected suites, one session per suite

use ocpp_conform_core::{orchestrator, BatchResult, Registry, RegistryError, Reporter, Summary};
use ocpp_conform_v16::WsSession;
use serde::Serialize;
use tracing::{error, info};

use crate::config::RunConfig;

pub const EXIT_PASSED: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_ABORTED: u8 = 2;

/// How a run ended, mapped onto the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every verdict passed
    Passed,
    /// At least one verdict failed
    Failed,
    /// The harness could not finish: no session, bad configuration or a
    /// connection lost mid batch
    Aborted,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Passed => EXIT_PASSED,
            Outcome::Failed => EXIT_FAILED,
            Outcome::Aborted => EXIT_ABORTED,
        }
    }
}

/// Verdicts of one suite
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    #[serde(flatten)]
    pub result: BatchResult,
    pub summary: Summary,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub suites: Vec<SuiteReport>,
    pub summary: Summary,
    /// Set when a session could not be established; later suites did not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    fn push(&mut self, suite: &str, result: BatchResult) {
        let summary = result.summary();
        self.summary = self.summary.merge(summary);
        self.suites.push(SuiteReport {
            suite: suite.to_string(),
            result,
            summary,
        });
    }

    pub fn outcome(&self) -> Outcome {
        let lost = self.suites.iter().any(|s| s.result.connection_lost());
        if self.aborted.is_some() || lost {
            Outcome::Aborted
        } else if self.summary.all_passed() {
            Outcome::Passed
        } else {
            Outcome::Failed
        }
    }
}

/// Run every selected suite in registry order
///
/// Each suite gets a fresh session. A suite whose connection drops still
/// reports its verdicts and the next suite runs; failing to connect stops
/// the run.
pub async fn run(
    config: &RunConfig,
    registry: &Registry,
    reporter: &dyn Reporter,
) -> Result<RunReport, RegistryError> {
    let suites = registry.select(&config.suites)?;
    let options = config.connect_options();
    let mut report = RunReport::default();

    for suite in suites {
        let batch = suite.batch()?;
        let timeout = config.timeout.unwrap_or_else(|| suite.timeout());
        info!(suite = %suite.name(), cases = batch.len(), ?timeout, "Running suite");

        let session = match WsSession::connect(&options).await {
            Ok(session) => session,
            Err(err) => {
                error!(suite = %suite.name(), error = %err, "Could not establish session");
                report.aborted = Some(format!("{}: {}", suite.name(), err));
                break;
            }
        };

        let result = orchestrator::run(&session, &batch, timeout, reporter).await;
        info!(suite = %suite.name(), "{}", result.summary());
        report.push(suite.name(), result);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Passed.exit_code(), 0);
        assert_eq!(Outcome::Failed.exit_code(), 1);
        assert_eq!(Outcome::Aborted.exit_code(), 2);
    }

    #[test]
    fn test_empty_report_passes_and_aborted_wins() {
        let mut report = RunReport::default();
        assert_eq!(report.outcome(), Outcome::Passed);

        report.summary = Summary {
            total: 2,
            passed: 1,
            failed: 1,
        };
        assert_eq!(report.outcome(), Outcome::Failed);

        report.aborted = Some("heartbeat: Connection failed: refused".to_string());
        assert_eq!(report.outcome(), Outcome::Aborted);
    }
}

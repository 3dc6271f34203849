//! Output formatting for ocpp-conform (table, json)

use clap::ValueEnum;
use colored::Colorize;
use ocpp_conform_core::{Interruption, Registry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::{Table, Tabled};

use crate::runner::RunReport;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    self.info("No data");
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }

    /// Print the verdict table and summary line for a whole run
    pub fn print_report(&self, report: &RunReport) {
        if self.format == OutputFormat::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
            );
            return;
        }

        let rows = verdict_rows(report);
        if !self.quiet && !rows.is_empty() {
            println!("{}", Table::new(&rows));
        }

        for suite in &report.suites {
            match suite.result.interruption() {
                Some(Interruption::ConnectionLost(reason)) => {
                    self.warn(&format!("{}: connection lost ({})", suite.suite, reason))
                }
                Some(Interruption::TimedOut) if !self.quiet => {
                    self.warn(&format!("{}: batch timeout elapsed", suite.suite))
                }
                _ => {}
            }
        }
        if let Some(reason) = &report.aborted {
            self.error(&format!("Aborted: {}", reason));
        }

        let line = report.summary.to_string();
        if report.summary.all_passed() && report.aborted.is_none() {
            println!("{}", line.green().bold());
        } else {
            println!("{}", line.red().bold());
        }
    }
}

// =============================================================================
// Display types
// =============================================================================

/// One verdict in the summary table
#[derive(Debug, Tabled, Serialize)]
pub struct VerdictRow {
    #[tabled(rename = "Suite")]
    pub suite: String,
    #[tabled(rename = "Test")]
    pub title: String,
    #[tabled(rename = "Expected")]
    pub expected: String,
    #[tabled(rename = "Result")]
    pub result: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

/// Suite display for `--list`; JSON output also carries the schemas
#[derive(Debug, Tabled, Serialize)]
pub struct SuiteRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Action")]
    pub action: String,
    #[tabled(rename = "Cases")]
    pub cases: usize,
    #[tabled(rename = "Timeout")]
    pub timeout: String,
    #[tabled(rename = "Description")]
    pub description: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<Value>,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

pub fn verdict_rows(report: &RunReport) -> Vec<VerdictRow> {
    report
        .suites
        .iter()
        .flat_map(|suite| {
            suite.result.verdicts().iter().map(move |verdict| VerdictRow {
                suite: suite.suite.clone(),
                title: verdict.title().to_string(),
                expected: verdict.expected().to_string(),
                result: if verdict.passed() { "PASS" } else { "FAIL" }.to_string(),
                reason: verdict.reason().to_string(),
            })
        })
        .collect()
}

pub fn suite_rows(registry: &Registry) -> Vec<SuiteRow> {
    registry
        .suites()
        .iter()
        .map(|suite| {
            let cases = suite.cases();
            let action = cases.first().map(|case| case.action().to_string());
            SuiteRow {
                name: suite.name().to_string(),
                action: action.clone().unwrap_or_default(),
                cases: cases.len(),
                timeout: format!("{}s", suite.timeout().as_secs()),
                description: suite.description().to_string(),
                request_schema: action
                    .as_deref()
                    .and_then(ocpp_conform_v16::request_schema)
                    .map(|schema| schema.to_json_schema()),
                response_schema: cases
                    .first()
                    .map(|case| case.response_schema().to_json_schema()),
            }
        })
        .collect()
}

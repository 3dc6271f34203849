//! ocpp-conform - conformance runner for OCPP 1.6 central systems
//!
//! Connects to a central system as a charge point, runs the registered
//! suites and reports one verdict per test case.
//!
//! Exit codes: 0 every test passed, 1 at least one test failed, 2 the run
//! could not finish.

pub mod cli;
pub mod config;
pub mod output;
pub mod runner;

pub use cli::Cli;
pub use config::{Config, ConfigError, RunConfig};
pub use output::{OutputContext, OutputFormat};
pub use runner::{Outcome, RunReport, SuiteReport};

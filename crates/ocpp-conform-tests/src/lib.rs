//! End-to-end tests for the OCPP conformance harness
//!
//! Every test starts an in-process [`MockCentralSystem`] on a loopback port
//! and drives it through a real WebSocket session.
//!
//! # Test Structure
//!
//! - `session_e2e_test.rs` - suites run through `WsSession` per mock behaviour
//! - `runner_e2e_test.rs` - the CLI run loop and its exit outcomes
//!
//! [`MockCentralSystem`]: ocpp_conform_v16::testing::MockCentralSystem

use std::time::Duration;

use ocpp_conform_cli::{OutputFormat, RunConfig};
use ocpp_conform_v16::testing::{Behaviour, MockCentralSystem};
use ocpp_conform_v16::{ConnectOptions, WsSession};

pub const IDENTITY: &str = "CP001";

/// Start a mock and open a session to it
pub async fn connect(behaviour: Behaviour) -> (MockCentralSystem, WsSession) {
    let mock = MockCentralSystem::start(behaviour)
        .await
        .expect("mock central system starts");
    let session = WsSession::connect(&options(&mock))
        .await
        .expect("session to mock central system");
    (mock, session)
}

pub fn options(mock: &MockCentralSystem) -> ConnectOptions {
    ConnectOptions::new(mock.endpoint(), IDENTITY)
        .with_call_timeout(Duration::from_secs(5))
        .with_connect_timeout(Duration::from_secs(5))
}

/// Run configuration targeting `mock`
pub fn run_config(mock: &MockCentralSystem, suites: &[&str]) -> RunConfig {
    RunConfig {
        endpoint: mock.endpoint(),
        identity: IDENTITY.to_string(),
        timeout: None,
        call_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        suites: suites.iter().map(|s| s.to_string()).collect(),
        output: OutputFormat::Json,
        no_color: true,
        quiet: true,
    }
}

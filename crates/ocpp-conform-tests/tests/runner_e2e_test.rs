//! The CLI run loop against the mock central system
//!
//! Run with: cargo test -p ocpp-conform-tests --test runner_e2e_test

use std::time::Duration;

use ocpp_conform_cli::runner;
use ocpp_conform_cli::Outcome;
use ocpp_conform_core::{NullReporter, RegistryError};
use ocpp_conform_tests::{run_config, IDENTITY};
use ocpp_conform_v16::testing::{Behaviour, MockCentralSystem};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_all_suites_pass_against_conformant_mock() {
    let mock = MockCentralSystem::start(Behaviour::Conformant).await.unwrap();
    let registry = ocpp_conform_v16::registry().unwrap();

    let report = runner::run(&run_config(&mock, &[]), &registry, &NullReporter)
        .await
        .unwrap();

    let suites: Vec<&str> = report.suites.iter().map(|s| s.suite.as_str()).collect();
    assert_eq!(suites, vec!["boot-notification", "heartbeat"]);
    assert_eq!(report.summary.total, 10);
    assert_eq!(report.outcome(), Outcome::Passed);
    assert_eq!(report.outcome().exit_code(), 0);
}

#[tokio::test]
async fn test_accepting_invalid_input_exits_one() {
    let mock = MockCentralSystem::start(Behaviour::AcceptEverything)
        .await
        .unwrap();
    let registry = ocpp_conform_v16::registry().unwrap();

    let report = runner::run(&run_config(&mock, &["heartbeat"]), &registry, &NullReporter)
        .await
        .unwrap();

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.outcome().exit_code(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_exits_two() {
    let mock = MockCentralSystem::start(Behaviour::Conformant).await.unwrap();
    let config = run_config(&mock, &[]);
    mock.shutdown().await;
    let registry = ocpp_conform_v16::registry().unwrap();

    let report = runner::run(&config, &registry, &NullReporter).await.unwrap();

    assert!(report.suites.is_empty());
    assert!(report.aborted.as_deref().unwrap().starts_with("boot-notification"));
    assert_eq!(report.outcome(), Outcome::Aborted);
    assert_eq!(report.outcome().exit_code(), 2);
}

#[tokio::test]
async fn test_connection_lost_exits_two_and_next_suite_runs() {
    let mock = MockCentralSystem::start(Behaviour::HangUpAfter(1))
        .await
        .unwrap();
    let registry = ocpp_conform_v16::registry().unwrap();
    let mut config = run_config(&mock, &[]);
    config.timeout = Some(Duration::from_secs(5));

    let report = runner::run(&config, &registry, &NullReporter).await.unwrap();

    assert_eq!(report.suites.len(), 2);
    assert!(report.suites[0].result.connection_lost());
    assert_eq!(report.outcome(), Outcome::Aborted);
    assert!(mock
        .received()
        .iter()
        .all(|call| call.path.ends_with(IDENTITY)));
}

#[tokio::test]
async fn test_unknown_suite_is_rejected_before_connecting() {
    let mock = MockCentralSystem::start(Behaviour::Conformant).await.unwrap();
    let registry = ocpp_conform_v16::registry().unwrap();

    let err = runner::run(&run_config(&mock, &["authorize"]), &registry, &NullReporter)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::UnknownSuite { .. }));
    assert!(mock.received().is_empty());
}

#[tokio::test]
async fn test_json_report_shape() {
    let mock = MockCentralSystem::start(Behaviour::Conformant).await.unwrap();
    let registry = ocpp_conform_v16::registry().unwrap();

    let report = runner::run(&run_config(&mock, &["heartbeat"]), &registry, &NullReporter)
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["summary"]["passed"], 2);
    assert_eq!(json["suites"][0]["suite"], "heartbeat");
    assert_eq!(json["suites"][0]["verdicts"][0]["passed"], true);
    assert!(json.get("aborted").is_none());
}

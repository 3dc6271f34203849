//! Suites run through a real WebSocket session
//!
//! Run with: cargo test -p ocpp-conform-tests --test session_e2e_test

use std::time::Duration;

use ocpp_conform_core::classify::ACCEPTED_INVALID_INPUT;
use ocpp_conform_core::testing::CollectingReporter;
use ocpp_conform_core::{orchestrator, Expectation, Interruption, NullReporter, Session, SessionError};
use ocpp_conform_tests::{connect, options, IDENTITY};
use ocpp_conform_v16::testing::{Behaviour, MockCentralSystem};
use ocpp_conform_v16::{boot_notification, heartbeat, WsSession};
use pretty_assertions::assert_eq;
use serde_json::json;

// =============================================================================
// Conformant central system
// =============================================================================

#[tokio::test]
async fn test_boot_notification_suite_passes_against_conformant_mock() {
    let (mock, session) = connect(Behaviour::Conformant).await;
    let batch = boot_notification::suite().batch().unwrap();
    let reporter = CollectingReporter::default();

    let result = orchestrator::run(&session, &batch, boot_notification::TIMEOUT, &reporter).await;

    let failures: Vec<_> = result
        .verdicts()
        .iter()
        .filter(|v| !v.passed())
        .map(|v| format!("{}: {}", v.title(), v.reason()))
        .collect();
    assert!(failures.is_empty(), "{:?}", failures);
    assert_eq!(result.interruption(), None);
    assert_eq!(reporter.verdicts().len(), 8);
    assert_eq!(mock.received().len(), 8);
    assert_eq!(session.pending_calls(), 0);
}

#[tokio::test]
async fn test_heartbeat_suite_passes_against_conformant_mock() {
    let (_mock, session) = connect(Behaviour::Conformant).await;
    let batch = heartbeat::suite().batch().unwrap();

    let result = orchestrator::run(&session, &batch, heartbeat::TIMEOUT, &NullReporter).await;

    assert_eq!(result.summary().passed, 2);
    assert!(result.summary().all_passed());
}

#[tokio::test]
async fn test_identity_is_last_path_segment() {
    let (mock, session) = connect(Behaviour::Conformant).await;
    let reply = session
        .send(heartbeat::ACTION, Default::default())
        .await
        .unwrap();
    assert!(reply.get("currentTime").is_some());

    let received = mock.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, format!("/ocpp/{}", IDENTITY));
    assert_eq!(received[0].action, "Heartbeat");
    assert_eq!(received[0].payload, json!({}));
}

#[tokio::test]
async fn test_invalid_request_surfaces_call_error() {
    let (_mock, session) = connect(Behaviour::Conformant).await;
    let err = session
        .send(boot_notification::ACTION, Default::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, SessionError::CallError { ref code, .. } if code == "OccurenceConstraintViolation"),
        "{:?}",
        err
    );
}

// =============================================================================
// Non-conformant central systems
// =============================================================================

#[tokio::test]
async fn test_accept_everything_fails_every_reject_case() {
    let (_mock, session) = connect(Behaviour::AcceptEverything).await;
    let batch = boot_notification::suite().batch().unwrap();

    let result = orchestrator::run(&session, &batch, boot_notification::TIMEOUT, &NullReporter).await;

    for verdict in result.verdicts() {
        match verdict.expected() {
            Expectation::ExpectedAccept => assert!(verdict.passed(), "{}", verdict.title()),
            Expectation::ExpectedReject => {
                assert!(!verdict.passed(), "{}", verdict.title());
                assert_eq!(verdict.reason(), ACCEPTED_INVALID_INPUT);
            }
        }
    }
    assert_eq!(result.summary().failed, 5);
}

#[tokio::test]
async fn test_silent_mock_ends_batch_on_timeout() {
    let (_mock, session) = connect(Behaviour::Silent).await;
    let batch = boot_notification::suite().batch().unwrap();

    let result = orchestrator::run(&session, &batch, Duration::from_secs(2), &NullReporter).await;

    // Silence on invalid input counts as rejection
    assert!(result.summary().all_passed());
    assert_eq!(result.interruption(), Some(&Interruption::TimedOut));
    assert_eq!(result.len(), 8);
}

#[tokio::test]
async fn test_hang_up_mid_batch_reports_connection_lost() {
    let (_mock, session) = connect(Behaviour::HangUpAfter(2)).await;
    let batch = boot_notification::suite().batch().unwrap();

    let result = orchestrator::run(&session, &batch, boot_notification::TIMEOUT, &NullReporter).await;

    assert!(result.connection_lost());
    assert_eq!(result.len(), 8);
    assert!(result.verdicts()[0].passed());
    assert!(result.verdicts()[1].passed());
    assert!(!result.verdicts()[2].passed());
    assert!(result.verdicts()[2].reason().contains("no response received"));

    let after = session.send(heartbeat::ACTION, Default::default()).await;
    assert!(matches!(after, Err(SessionError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_refused_subprotocol_fails_connect() {
    let mock = MockCentralSystem::start(Behaviour::RefuseSubprotocol)
        .await
        .unwrap();
    let err = WsSession::connect(&options(&mock)).await.err().unwrap();
    assert!(matches!(err, SessionError::Subprotocol(_)), "{:?}", err);
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_close_is_idempotent_and_fails_later_calls() {
    let (mock, session) = connect(Behaviour::Conformant).await;
    session.close().await;
    session.close().await;

    let err = session
        .send(heartbeat::ACTION, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ConnectionLost(_)));
    mock.shutdown().await;
}

#[tokio::test]
async fn test_closed_resolves_when_peer_goes_away() {
    let (mock, session) = connect(Behaviour::HangUpAfter(0)).await;
    let _ = session.send(heartbeat::ACTION, Default::default()).await;
    let reason = tokio::time::timeout(Duration::from_secs(5), session.closed())
        .await
        .unwrap();
    assert!(!reason.is_empty());
    assert_eq!(mock.received().len(), 1);
}

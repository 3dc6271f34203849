//! Batch orchestrator
//!
//! Issues every case of a batch concurrently through one session, applies a
//! single deadline to the whole batch and collects exactly one verdict per
//! case in input order.
//!
//! ```text
//!  cases ──► send ─┐
//!        ──► send ─┼─► FuturesUnordered ──► classify ──► slots[index]
//!        ──► send ─┘         ▲
//!                 deadline ──┤  connection lost ──┘
//! ```

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::case::{Batch, TestCase};
use crate::classify::{classify, AbsenceReason, Response, Verdict};
use crate::report::{Reporter, Summary};
use crate::session::Session;

/// Why a batch ended before every call resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Interruption {
    /// The batch deadline elapsed with calls still outstanding
    TimedOut,
    /// The connection was lost; the batch could not finish
    ConnectionLost(String),
}

/// Verdicts of one batch, one per case and in case order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    verdicts: Vec<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interruption: Option<Interruption>,
}

impl BatchResult {
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    /// Whether the connection was lost before the batch could finish
    pub fn connection_lost(&self) -> bool {
        matches!(self.interruption, Some(Interruption::ConnectionLost(_)))
    }

    pub fn summary(&self) -> Summary {
        Summary::of(self)
    }

    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }
}

/// Run every case of `batch` concurrently through `session`
///
/// Calls that are still outstanding when `timeout` elapses resolve to an
/// absent response, as do all outstanding calls once the connection is
/// lost. The session is closed exactly once before returning.
pub async fn run<S>(
    session: &S,
    batch: &Batch,
    timeout: Duration,
    reporter: &dyn Reporter,
) -> BatchResult
where
    S: Session + ?Sized,
{
    let cases = batch.cases();
    info!(
        cases = cases.len(),
        timeout_ms = timeout.as_millis() as u64,
        "Starting batch"
    );

    let mut slots: Vec<Option<Verdict>> = cases.iter().map(|_| None).collect();
    let mut pending: FuturesUnordered<_> = cases
        .iter()
        .enumerate()
        .map(|(index, case)| async move {
            debug!(action = %case.action(), title = %case.title(), "Sending call");
            let result = session.send(case.action(), case.payload().clone()).await;
            (index, result)
        })
        .collect();

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut closed = session.closed();
    let mut interruption = None;

    loop {
        tokio::select! {
            biased;

            next = pending.next() => match next {
                Some((index, result)) => {
                    let fatal = match &result {
                        Err(err) if err.is_fatal() => Some(err.to_string()),
                        _ => None,
                    };
                    record(&mut slots, cases, index, Response::from(result), reporter);
                    if let Some(reason) = fatal {
                        interruption = Some(Interruption::ConnectionLost(reason));
                        break;
                    }
                }
                None => break,
            },
            reason = &mut closed => {
                interruption = Some(Interruption::ConnectionLost(reason));
                break;
            }
            () = &mut deadline => {
                interruption = Some(Interruption::TimedOut);
                break;
            }
        }
    }

    if interruption.is_some() {
        // Responses that arrived before cancellation was observed keep their real verdict
        while let Some(Some((index, result))) = pending.next().now_or_never() {
            record(&mut slots, cases, index, Response::from(result), reporter);
        }
    }
    let outstanding = pending.len();
    drop(pending);
    drop(closed);

    let absence = match &interruption {
        Some(Interruption::ConnectionLost(reason)) => {
            warn!(%reason, outstanding, "Connection lost during batch");
            AbsenceReason::ConnectionLost(reason.clone())
        }
        _ => {
            if outstanding > 0 {
                info!(outstanding, "Batch timeout elapsed, cancelling outstanding calls");
            }
            AbsenceReason::Cancelled
        }
    };

    let verdicts: Vec<Verdict> = slots
        .into_iter()
        .zip(cases)
        .map(|(slot, case)| {
            slot.unwrap_or_else(|| {
                let verdict = classify(case, &Response::Absent(absence.clone()));
                reporter.verdict(&verdict);
                verdict
            })
        })
        .collect();

    session.close().await;

    let result = BatchResult {
        verdicts,
        interruption,
    };
    let summary = result.summary();
    info!(
        passed = summary.passed,
        failed = summary.failed,
        "Batch finished"
    );
    result
}

fn record(
    slots: &mut [Option<Verdict>],
    cases: &[TestCase],
    index: usize,
    response: Response,
    reporter: &dyn Reporter,
) {
    debug_assert!(slots[index].is_none(), "case resolved twice");
    let verdict = classify(&cases[index], &response);
    reporter.verdict(&verdict);
    slots[index] = Some(verdict);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::case::{payload, ActionSpec, Payload, StatusRule};
    use crate::classify::ACCEPTED_INVALID_INPUT;
    use crate::report::NullReporter;
    use crate::schema::{FieldType, Schema};
    use crate::session::SessionError;
    use crate::testing::{CollectingReporter, StubReply, StubSession};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn boot_action() -> Arc<ActionSpec> {
        let schema = Schema::object("BootNotificationResponse")
            .required("status", FieldType::one_of(["Accepted", "Pending", "Rejected"]))
            .required("currentTime", FieldType::date_time())
            .required("interval", FieldType::Integer);
        Arc::new(
            ActionSpec::new("BootNotification", schema)
                .with_status(StatusRule::new("status", ["Accepted"], ["Rejected"])),
        )
    }

    fn heartbeat_action() -> Arc<ActionSpec> {
        let schema =
            Schema::object("HeartbeatResponse").required("currentTime", FieldType::date_time());
        Arc::new(ActionSpec::new("Heartbeat", schema))
    }

    fn accepted() -> serde_json::Value {
        json!({ "status": "Accepted", "currentTime": "2024-01-01T00:00:00Z", "interval": 300 })
    }

    fn required_payload() -> Payload {
        payload([
            ("chargePointModel", json!("Charge-Gridflow")),
            ("chargePointVendor", json!("GridFlow")),
        ])
    }

    fn wrong_type_payload() -> Payload {
        payload([
            ("chargePointModel", json!(123)),
            ("chargePointVendor", json!("GridFlow")),
        ])
    }

    fn missing_model_payload() -> Payload {
        payload([("chargePointVendor", json!("GridFlow"))])
    }

    fn boot_batch() -> Batch {
        let action = boot_action();
        Batch::new(vec![
            TestCase::accept(&action, "required payload", required_payload()),
            TestCase::reject(&action, "wrong payload data type", wrong_type_payload()),
            TestCase::reject(&action, "incomplete required payload", missing_model_payload()),
        ])
        .unwrap()
    }

    fn outcomes(result: &BatchResult) -> Vec<(&str, bool)> {
        result
            .verdicts()
            .iter()
            .map(|v| (v.title(), v.passed()))
            .collect()
    }

    #[tokio::test]
    async fn test_batch_classifies_all_cases_in_order() {
        let session = StubSession::new()
            .on("BootNotification", required_payload(), StubReply::Respond(accepted()))
            .on("BootNotification", wrong_type_payload(), StubReply::Never)
            .on("BootNotification", missing_model_payload(), StubReply::Respond(accepted()));

        let result = run(
            &session,
            &boot_batch(),
            Duration::from_millis(50),
            &NullReporter,
        )
        .await;

        assert_eq!(
            outcomes(&result),
            vec![
                ("required payload", true),
                ("wrong payload data type", true),
                ("incomplete required payload", false),
            ]
        );
        assert_eq!(result.verdicts()[2].reason(), ACCEPTED_INVALID_INPUT);
        assert_eq!(result.interruption(), Some(&Interruption::TimedOut));
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_completes_without_interruption_when_all_reply() {
        let session = StubSession::new().otherwise(StubReply::Respond(accepted()));
        let result = run(&session, &boot_batch(), Duration::from_secs(10), &NullReporter).await;
        assert_eq!(result.interruption(), None);
        assert_eq!(result.len(), 3);
        assert_eq!(session.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_responses_keep_input_order() {
        let session = StubSession::new()
            .on(
                "BootNotification",
                required_payload(),
                StubReply::Delayed(Duration::from_millis(300), accepted()),
            )
            .on(
                "BootNotification",
                wrong_type_payload(),
                StubReply::Fail(SessionError::CallError {
                    code: "TypeConstraintViolation".into(),
                    description: "chargePointModel".into(),
                }),
            )
            .on(
                "BootNotification",
                missing_model_payload(),
                StubReply::Delayed(
                    Duration::from_millis(100),
                    json!({ "status": "Rejected", "currentTime": "2024-01-01T00:00:00Z", "interval": 300 }),
                ),
            );
        let reporter = CollectingReporter::default();

        let result = run(&session, &boot_batch(), Duration::from_secs(1), &reporter).await;

        assert_eq!(
            outcomes(&result),
            vec![
                ("required payload", true),
                ("wrong payload data type", true),
                ("incomplete required payload", true),
            ]
        );
        // Reporter sees completion order, the result keeps input order
        assert_eq!(
            reporter.titles(),
            vec![
                "wrong payload data type",
                "incomplete required payload",
                "required payload",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_only_outstanding_calls_absent() {
        let action = heartbeat_action();
        let batch = Batch::new(vec![
            TestCase::accept(&action, "fast heartbeat", payload([("n", json!(1))])),
            TestCase::accept(&action, "stuck heartbeat", payload([("n", json!(2))])),
            TestCase::reject(&action, "stuck rejection", payload([("n", json!(3))])),
        ])
        .unwrap();
        let session = StubSession::new()
            .on(
                "Heartbeat",
                payload([("n", json!(1))]),
                StubReply::Respond(json!({ "currentTime": "2024-01-01T00:00:00Z" })),
            )
            .otherwise(StubReply::Never);

        let result = run(&session, &batch, Duration::from_millis(1), &NullReporter).await;

        assert_eq!(result.len(), 3);
        assert_eq!(
            outcomes(&result),
            vec![
                ("fast heartbeat", true),
                ("stuck heartbeat", false),
                ("stuck rejection", true),
            ]
        );
        assert!(result.verdicts()[1].reason().contains("batch timeout elapsed"));
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_still_yields_one_verdict_per_case() {
        let session = StubSession::new().otherwise(StubReply::Never);
        let reporter = CollectingReporter::default();
        let result = run(&session, &boot_batch(), Duration::ZERO, &reporter).await;
        assert_eq!(result.len(), 3);
        assert_eq!(reporter.titles().len(), 3);
        assert_eq!(result.interruption(), Some(&Interruption::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_transport_error_does_not_abort_batch() {
        let session = StubSession::new()
            .on(
                "BootNotification",
                required_payload(),
                StubReply::Fail(SessionError::Transport("write failed".into())),
            )
            .otherwise(StubReply::Delayed(Duration::from_millis(20), accepted()));

        let result = run(&session, &boot_batch(), Duration::from_secs(1), &NullReporter).await;

        assert_eq!(result.interruption(), None);
        assert!(!result.verdicts()[0].passed());
        assert!(result.verdicts()[0].reason().contains("write failed"));
        assert_eq!(result.verdicts()[2].reason(), ACCEPTED_INVALID_INPUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_ends_batch_immediately() {
        let session = StubSession::new()
            .on(
                "BootNotification",
                required_payload(),
                StubReply::Respond(accepted()),
            )
            .on(
                "BootNotification",
                wrong_type_payload(),
                StubReply::DropConnection("peer reset".into()),
            )
            .otherwise(StubReply::Never);

        let started = tokio::time::Instant::now();
        let result = run(&session, &boot_batch(), Duration::from_secs(60), &NullReporter).await;

        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(result.connection_lost());
        assert_eq!(result.len(), 3);
        assert!(result.verdicts()[0].passed());
        // Rejections are satisfied by absence, whatever its cause
        assert!(result.verdicts()[1].passed());
        assert!(result.verdicts()[2].passed());
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_signal_fails_pending_accept_cases() {
        let action = heartbeat_action();
        let batch = Batch::new(vec![TestCase::accept(&action, "heartbeat", Payload::new())]).unwrap();
        let session = Arc::new(StubSession::new().otherwise(StubReply::Never));

        let dropper = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dropper.drop_connection("server closed");
        });

        let result = run(session.as_ref(), &batch, Duration::from_secs(5), &NullReporter).await;

        assert_eq!(
            result.interruption(),
            Some(&Interruption::ConnectionLost("server closed".into()))
        );
        assert!(result.verdicts()[0].reason().contains("connection lost: server closed"));
    }

    #[tokio::test]
    async fn test_empty_batch_closes_session() {
        let session = StubSession::new();
        let result = run(&session, &Batch::default(), Duration::from_secs(1), &NullReporter).await;
        assert!(result.is_empty());
        assert_eq!(result.interruption(), None);
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_identical_runs_produce_identical_results() {
        let make_session = || {
            StubSession::new()
                .on("BootNotification", required_payload(), StubReply::Respond(accepted()))
                .on("BootNotification", missing_model_payload(), StubReply::Respond(accepted()))
                .otherwise(StubReply::Fail(SessionError::Timeout))
        };
        let first = run(&make_session(), &boot_batch(), Duration::from_secs(1), &NullReporter).await;
        let second = run(&make_session(), &boot_batch(), Duration::from_secs(1), &NullReporter).await;
        assert_eq!(first, second);
    }
}

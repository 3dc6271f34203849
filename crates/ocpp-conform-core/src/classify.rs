//! Outcome classifier
//!
//! Turns a response (or its absence) into a [`Verdict`] for the originating
//! test case. Per-case errors never escape this module: every input yields
//! exactly one verdict.
//!
//! | expected | response | verdict |
//! |---|---|---|
//! | accept | absent | fail: no response received |
//! | accept | present, schema violation | fail: first violation |
//! | accept | present, status not accepted | fail: status not in accepted set |
//! | accept | present, status accepted | pass |
//! | reject | absent | pass |
//! | reject | present, schema violation | fail: first violation |
//! | reject | present, status rejected | pass |
//! | reject | present, status accepted | fail: endpoint accepted invalid input |

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::case::{Expectation, StatusClass, TestCase};
use crate::schema::{ValidationResult, Violation};
use crate::session::SessionError;

/// Reason for accepting invalid input, shared by every endpoint that does it
pub const ACCEPTED_INVALID_INPUT: &str = "endpoint accepted invalid input";

/// Why no response is available for a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AbsenceReason {
    /// The per-call timeout elapsed
    Timeout,
    /// The batch deadline elapsed while the call was outstanding
    Cancelled,
    /// The call failed at the transport level
    Transport(String),
    /// The endpoint returned an RPC-level error
    CallError { code: String, description: String },
    /// The connection was lost while the call was outstanding
    ConnectionLost(String),
}

impl fmt::Display for AbsenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsenceReason::Timeout => f.write_str("call timed out"),
            AbsenceReason::Cancelled => f.write_str("batch timeout elapsed"),
            AbsenceReason::Transport(msg) => write!(f, "transport error: {msg}"),
            AbsenceReason::CallError { code, description } => {
                write!(f, "call error {code}: {description}")
            }
            AbsenceReason::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
        }
    }
}

impl From<SessionError> for AbsenceReason {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout => AbsenceReason::Timeout,
            SessionError::Transport(msg) => AbsenceReason::Transport(msg),
            SessionError::CallError { code, description } => {
                AbsenceReason::CallError { code, description }
            }
            SessionError::ConnectionLost(msg) => AbsenceReason::ConnectionLost(msg),
            other @ (SessionError::Connect(_) | SessionError::Subprotocol(_)) => {
                AbsenceReason::Transport(other.to_string())
            }
        }
    }
}

/// A call's response, or the reason there is none
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Present(Value),
    Absent(AbsenceReason),
}

impl From<Result<Value, SessionError>> for Response {
    fn from(result: Result<Value, SessionError>) -> Self {
        match result {
            Ok(value) => Response::Present(value),
            Err(err) => Response::Absent(err.into()),
        }
    }
}

/// Pass/fail outcome of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    title: String,
    action: String,
    expected: Expectation,
    passed: bool,
    reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

impl Verdict {
    fn pass(case: &TestCase) -> Self {
        Self::new(case, true, String::new(), Vec::new())
    }

    fn fail(case: &TestCase, reason: impl Into<String>) -> Self {
        Self::new(case, false, reason.into(), Vec::new())
    }

    fn violated(case: &TestCase, violations: Vec<Violation>) -> Self {
        let reason = violations
            .first()
            .map(|violation| format!("schema violation: {violation}"))
            .unwrap_or_default();
        Self::new(case, false, reason, violations)
    }

    fn new(case: &TestCase, passed: bool, reason: String, violations: Vec<Violation>) -> Self {
        Self {
            title: case.title().to_string(),
            action: case.action().to_string(),
            expected: case.expected(),
            passed,
            reason,
            violations,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn expected(&self) -> Expectation {
        self.expected
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Diagnostic reason; empty when the case passed
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Every schema violation found in the response
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

/// Schema-valid response reduced to its status interpretation
enum Conformant {
    /// The action has no status field; a valid response is an acceptance
    Unqualified,
    Status(StatusClass),
}

fn inspect(case: &TestCase, value: &Value) -> Result<Conformant, Vec<Violation>> {
    match case.response_schema().validate(value) {
        ValidationResult::Invalid(violations) => Err(violations),
        ValidationResult::Valid => Ok(match case.spec().status_rule() {
            Some(rule) => Conformant::Status(rule.classify(value)),
            None => Conformant::Unqualified,
        }),
    }
}

/// Classify a response against a test case's expected outcome
pub fn classify(case: &TestCase, response: &Response) -> Verdict {
    match (case.expected(), response) {
        (Expectation::ExpectedAccept, Response::Absent(reason)) => {
            Verdict::fail(case, format!("no response received ({reason})"))
        }
        (Expectation::ExpectedAccept, Response::Present(value)) => match inspect(case, value) {
            Err(violations) => Verdict::violated(case, violations),
            Ok(Conformant::Unqualified | Conformant::Status(StatusClass::Accepted)) => {
                Verdict::pass(case)
            }
            Ok(Conformant::Status(other)) => Verdict::fail(
                case,
                format!("status not in accepted set ({})", describe_status(&other)),
            ),
        },
        (Expectation::ExpectedReject, Response::Absent(_)) => Verdict::pass(case),
        (Expectation::ExpectedReject, Response::Present(value)) => match inspect(case, value) {
            Err(violations) => Verdict::violated(case, violations),
            Ok(Conformant::Status(StatusClass::Rejected)) => Verdict::pass(case),
            Ok(Conformant::Unqualified | Conformant::Status(StatusClass::Accepted)) => {
                Verdict::fail(case, ACCEPTED_INVALID_INPUT)
            }
            Ok(Conformant::Status(other)) => Verdict::fail(
                case,
                format!("status is not a rejection ({})", describe_status(&other)),
            ),
        },
    }
}

fn describe_status(status: &StatusClass) -> String {
    match status {
        StatusClass::Accepted => "accepted".to_string(),
        StatusClass::Rejected => "rejected".to_string(),
        StatusClass::Other(Some(value)) => format!("got `{value}`"),
        StatusClass::Other(None) => "status field missing".to_string(),
    }
}

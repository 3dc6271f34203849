//! Test case model
//!
//! A [`TestCase`] is an immutable pairing of a request payload with the
//! outcome the endpoint is expected to produce. The expected outcome is
//! fixed at construction and never inferred from a response.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CaseError;
use crate::schema::Schema;

/// Business payload of a request or response
pub type Payload = Map<String, Value>;

/// Build a payload from literal field/value pairs
pub fn payload<const N: usize>(fields: [(&str, Value); N]) -> Payload {
    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Outcome a test case expects from the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The request is valid and must be accepted
    ExpectedAccept,
    /// The request is invalid and must not be accepted
    ExpectedReject,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::ExpectedAccept => f.write_str("accept"),
            Expectation::ExpectedReject => f.write_str("reject"),
        }
    }
}

// =============================================================================
// Action descriptions
// =============================================================================

/// How a status field embedded in a response is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRule {
    /// Name of the status field in the response payload
    pub field: String,
    /// Values that mean the request was accepted
    pub accepted: Vec<String>,
    /// Values that mean the request was explicitly rejected
    pub rejected: Vec<String>,
}

/// Interpretation of a response's status field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusClass {
    Accepted,
    Rejected,
    /// Status is missing or neither accepted nor rejected
    Other(Option<String>),
}

impl StatusRule {
    pub fn new<A, R, S>(field: impl Into<String>, accepted: A, rejected: R) -> Self
    where
        A: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
            rejected: rejected.into_iter().map(Into::into).collect(),
        }
    }

    /// Classify the status carried by `response`
    pub fn classify(&self, response: &Value) -> StatusClass {
        match response.get(&self.field).and_then(Value::as_str) {
            Some(status) if self.accepted.iter().any(|s| s == status) => StatusClass::Accepted,
            Some(status) if self.rejected.iter().any(|s| s == status) => StatusClass::Rejected,
            other => StatusClass::Other(other.map(str::to_string)),
        }
    }
}

/// A protocol action: its name, response schema and status semantics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    name: String,
    response_schema: Schema,
    status: Option<StatusRule>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, response_schema: Schema) -> Self {
        Self {
            name: name.into(),
            response_schema,
            status: None,
        }
    }

    /// Attach the rule that interprets the response's acceptance status
    pub fn with_status(mut self, rule: StatusRule) -> Self {
        self.status = Some(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response_schema(&self) -> &Schema {
        &self.response_schema
    }

    pub fn status_rule(&self) -> Option<&StatusRule> {
        self.status.as_ref()
    }
}

// =============================================================================
// Test cases and batches
// =============================================================================

/// One scenario: a request payload plus its expected classification
#[derive(Debug, Clone)]
pub struct TestCase {
    action: Arc<ActionSpec>,
    title: String,
    payload: Payload,
    expected: Expectation,
}

impl TestCase {
    pub fn new(
        action: &Arc<ActionSpec>,
        title: impl Into<String>,
        payload: Payload,
        expected: Expectation,
    ) -> Self {
        Self {
            action: Arc::clone(action),
            title: title.into(),
            payload,
            expected,
        }
    }

    /// A case whose request must be accepted
    pub fn accept(action: &Arc<ActionSpec>, title: impl Into<String>, payload: Payload) -> Self {
        Self::new(action, title, payload, Expectation::ExpectedAccept)
    }

    /// A case whose request must not be accepted
    pub fn reject(action: &Arc<ActionSpec>, title: impl Into<String>, payload: Payload) -> Self {
        Self::new(action, title, payload, Expectation::ExpectedReject)
    }

    pub fn action(&self) -> &str {
        self.action.name()
    }

    pub fn spec(&self) -> &ActionSpec {
        &self.action
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn expected(&self) -> Expectation {
        self.expected
    }

    pub fn response_schema(&self) -> &Schema {
        self.action.response_schema()
    }
}

/// An ordered set of test cases with unique titles
#[derive(Debug, Clone, Default)]
pub struct Batch {
    cases: Vec<TestCase>,
}

impl Batch {
    pub fn new(cases: Vec<TestCase>) -> Result<Self, CaseError> {
        {
            let mut seen = HashSet::with_capacity(cases.len());
            for case in &cases {
                if case.title.trim().is_empty() {
                    return Err(CaseError::EmptyTitle(case.action().to_string()));
                }
                if !seen.insert(case.title.as_str()) {
                    return Err(CaseError::DuplicateTitle(case.title.clone()));
                }
            }
        }
        Ok(Self { cases })
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

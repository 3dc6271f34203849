//! Error types for building batches and registries

use thiserror::Error;

/// Errors raised while assembling test cases into a batch
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaseError {
    /// Two cases in one batch share a title
    #[error("Duplicate test case title in batch: {0}")]
    DuplicateTitle(String),

    /// A case was built without a title
    #[error("Test case for action {0} has an empty title")]
    EmptyTitle(String),
}

/// Errors raised by suite registries
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A suite with this name is already registered
    #[error("Suite already registered: {0}")]
    DuplicateSuite(String),

    /// No suite with this name exists
    #[error("Unknown suite: {name} (available: {available})")]
    UnknownSuite { name: String, available: String },

    /// The suite's cases do not form a valid batch
    #[error("Suite {suite} is invalid: {source}")]
    InvalidSuite {
        suite: String,
        #[source]
        source: CaseError,
    },
}

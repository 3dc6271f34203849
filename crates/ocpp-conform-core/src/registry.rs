//! Named suites of test cases
//!
//! Each suite covers one protocol action and builds its cases on demand.
//! Supporting a new action means registering a new suite; the orchestrator
//! and classifier stay unchanged.

use std::time::Duration;

use crate::case::{Batch, TestCase};
use crate::error::RegistryError;

/// An ordered, named collection of test cases for one action
#[derive(Debug, Clone)]
pub struct Suite {
    name: String,
    description: String,
    timeout: Duration,
    build: fn() -> Vec<TestCase>,
}

impl Suite {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        timeout: Duration,
        build: fn() -> Vec<TestCase>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            timeout,
            build,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Default batch timeout for this suite
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a fresh set of cases
    pub fn cases(&self) -> Vec<TestCase> {
        (self.build)()
    }

    /// Build the suite's cases as a batch
    pub fn batch(&self) -> Result<Batch, RegistryError> {
        Batch::new(self.cases()).map_err(|source| RegistryError::InvalidSuite {
            suite: self.name.clone(),
            source,
        })
    }
}

/// Suites in registration order
#[derive(Debug, Clone, Default)]
pub struct Registry {
    suites: Vec<Suite>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, suite: Suite) -> Result<(), RegistryError> {
        if self.get(suite.name()).is_some() {
            return Err(RegistryError::DuplicateSuite(suite.name));
        }
        self.suites.push(suite);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Suite> {
        self.suites.iter().find(|suite| suite.name == name)
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    pub fn names(&self) -> Vec<&str> {
        self.suites.iter().map(Suite::name).collect()
    }

    /// Resolve suite names; an empty selection means every suite
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Suite>, RegistryError> {
        if names.is_empty() {
            return Ok(self.suites.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .ok_or_else(|| RegistryError::UnknownSuite {
                        name: name.as_ref().to_string(),
                        available: self.names().join(", "),
                    })
            })
            .collect()
    }
}

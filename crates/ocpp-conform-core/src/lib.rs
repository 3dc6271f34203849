//! ocpp-conform-core - action-agnostic conformance test engine
//!
//! This crate models conformance scenarios as data and runs them
//! concurrently against an endpoint through a [`Session`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Registry                              │
//! │   Suite (per action) ──► Batch of TestCase                    │
//! │                               │                               │
//! │                    ┌──────────┴──────────┐                    │
//! │                    │  orchestrator::run  │◄── batch timeout   │
//! │                    └──────────┬──────────┘                    │
//! │            send (concurrent)  │  response / absence           │
//! │                    ┌──────────┴──────────┐                    │
//! │                    │       Session       │                    │
//! │                    └─────────────────────┘                    │
//! │                               │                               │
//! │                classify ◄─────┘ (Schema::validate)            │
//! │                    │                                          │
//! │                 Verdict ──► Reporter                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use ocpp_conform_core::testing::{StubReply, StubSession};
//! use ocpp_conform_core::{
//!     orchestrator, ActionSpec, Batch, FieldType, NullReporter, Payload, Schema, TestCase,
//! };
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let schema = Schema::object("HeartbeatResponse").required("currentTime", FieldType::date_time());
//! let heartbeat = Arc::new(ActionSpec::new("Heartbeat", schema));
//! let batch = Batch::new(vec![TestCase::accept(&heartbeat, "heartbeat", Payload::new())]).unwrap();
//!
//! let session = StubSession::new().on_action(
//!     "Heartbeat",
//!     StubReply::Respond(json!({ "currentTime": "2024-01-01T00:00:00Z" })),
//! );
//! let result = orchestrator::run(&session, &batch, Duration::from_secs(5), &NullReporter).await;
//! assert!(result.verdicts()[0].passed());
//! # });
//! ```

pub mod case;
pub mod classify;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod schema;
pub mod session;
pub mod testing;

pub use case::{payload, ActionSpec, Batch, Expectation, Payload, StatusClass, StatusRule, TestCase};
pub use classify::{classify, AbsenceReason, Response, Verdict};
pub use error::{CaseError, RegistryError};
pub use orchestrator::{BatchResult, Interruption};
pub use registry::{Registry, Suite};
pub use report::{NullReporter, Reporter, Summary, TracingReporter};
pub use schema::{validate, FieldSpec, FieldType, Rule, Schema, StringFormat, ValidationResult, Violation};
pub use session::{Session, SessionError};

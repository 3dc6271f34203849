//! Heartbeat conformance suite

use std::sync::Arc;
use std::time::Duration;

use ocpp_conform_core::{payload, ActionSpec, FieldType, Payload, Schema, Suite, TestCase};
use serde_json::json;

pub const ACTION: &str = "Heartbeat";
pub const SUITE: &str = "heartbeat";

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat.req carries no fields
pub fn request_schema() -> Schema {
    Schema::object("HeartbeatRequest")
}

/// Heartbeat.conf
pub fn response_schema() -> Schema {
    Schema::object("HeartbeatResponse").required("currentTime", FieldType::date_time())
}

/// Heartbeat replies carry no status, so a reject case passes only on absence
pub fn action() -> Arc<ActionSpec> {
    Arc::new(ActionSpec::new(ACTION, response_schema()))
}

pub fn cases() -> Vec<TestCase> {
    let action = action();
    vec![
        TestCase::accept(&action, "send heartbeat payload", Payload::new()),
        TestCase::reject(
            &action,
            "send heartbeat unexpected field payload",
            payload([("chargePointVendor", json!("GridFlow"))]),
        ),
    ]
}

pub fn suite() -> Suite {
    Suite::new(SUITE, "Heartbeat round trip", TIMEOUT, cases)
}

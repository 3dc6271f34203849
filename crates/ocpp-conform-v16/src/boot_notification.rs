//! BootNotification conformance suite
//!
//! A charge point announces itself with BootNotification. These cases check
//! that the central system accepts well-formed requests and refuses every
//! request that breaks the OCPP 1.6 request schema.

use std::sync::Arc;
use std::time::Duration;

use ocpp_conform_core::{payload, ActionSpec, FieldType, Payload, Schema, StatusRule, Suite, TestCase};
use serde_json::json;

pub const ACTION: &str = "BootNotification";
pub const SUITE: &str = "boot-notification";

/// Batch timeout for the whole suite
pub const TIMEOUT: Duration = Duration::from_secs(10);

const VENDOR: &str = "GridFlow";
const MODEL: &str = "Charge-Gridflow";
/// Model sent alongside optional fields
const SHORT_MODEL: &str = "Charge";
const SERIAL: &str = "123456";
/// 47 characters, over every max length in the request schema
const LONG_MODEL: &str = "Charge-Gridflow-Charge-Gridflow-Charge-Gridflow";
const LONG_VENDOR: &str = "GridFlowCharge-GridflowCharge-GridflowCharge-Gridflow";

/// BootNotification.req
pub fn request_schema() -> Schema {
    Schema::object("BootNotificationRequest")
        .required("chargePointVendor", FieldType::string_max(20))
        .required("chargePointModel", FieldType::string_max(20))
        .optional("chargePointSerialNumber", FieldType::string_max(25))
        .optional("chargeBoxSerialNumber", FieldType::string_max(25))
        .optional("firmwareVersion", FieldType::string_max(50))
        .optional("iccid", FieldType::string_max(20))
        .optional("imsi", FieldType::string_max(20))
        .optional("meterType", FieldType::string_max(25))
        .optional("meterSerialNumber", FieldType::string_max(25))
}

/// BootNotification.conf
pub fn response_schema() -> Schema {
    Schema::object("BootNotificationResponse")
        .required("status", FieldType::one_of(["Accepted", "Pending", "Rejected"]))
        .required("currentTime", FieldType::date_time())
        .required("interval", FieldType::Integer)
}

pub fn action() -> Arc<ActionSpec> {
    Arc::new(
        ActionSpec::new(ACTION, response_schema())
            .with_status(StatusRule::new("status", ["Accepted"], ["Rejected"])),
    )
}

fn complete_payload() -> Payload {
    payload([
        ("chargePointModel", json!(SHORT_MODEL)),
        ("chargePointVendor", json!(VENDOR)),
        ("chargeBoxSerialNumber", json!(SERIAL)),
        ("chargePointSerialNumber", json!(SERIAL)),
        ("firmwareVersion", json!("1.0.0")),
        ("iccid", json!("XXXXXXXXXXXXXXXXXXXX")),
        ("imsi", json!("123456789012345")),
        ("meterType", json!("DBT NQC-AC")),
        ("meterSerialNumber", json!(SERIAL)),
    ])
}

pub fn cases() -> Vec<TestCase> {
    let action = action();

    let mut optional_only = complete_payload();
    optional_only.remove("chargePointModel");
    optional_only.remove("chargePointVendor");

    vec![
        TestCase::accept(
            &action,
            "send boot notification required payload",
            payload([
                ("chargePointModel", json!(MODEL)),
                ("chargePointVendor", json!(VENDOR)),
            ]),
        ),
        TestCase::accept(
            &action,
            "send boot notification required and partial optional payload",
            payload([
                ("chargePointModel", json!(SHORT_MODEL)),
                ("chargePointVendor", json!(VENDOR)),
                ("firmwareVersion", json!("1.0.0")),
            ]),
        ),
        TestCase::accept(
            &action,
            "send boot notification required and optional complete payload",
            complete_payload(),
        ),
        TestCase::reject(
            &action,
            "send boot notification optional only payload",
            optional_only,
        ),
        TestCase::reject(
            &action,
            "send boot notification incomplete required payload",
            payload([("chargePointModel", json!(MODEL))]),
        ),
        TestCase::reject(
            &action,
            "send boot notification wrong payload data type",
            payload([
                ("chargePointModel", json!(123)),
                ("chargePointVendor", json!(VENDOR)),
            ]),
        ),
        TestCase::reject(&action, "send boot notification no payload", Payload::new()),
        TestCase::reject(
            &action,
            "send boot notification over max length payload",
            payload([
                ("chargePointModel", json!(LONG_MODEL)),
                ("chargePointVendor", json!(LONG_VENDOR)),
            ]),
        ),
    ]
}

pub fn suite() -> Suite {
    Suite::new(
        SUITE,
        "BootNotification request validation by the central system",
        TIMEOUT,
        cases,
    )
}

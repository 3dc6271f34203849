//! OCPP-J message framing
//!
//! Every WebSocket text message is a JSON array whose first element is the
//! message type:
//!
//! ```text
//! CALL        [2, "<id>", "<action>", {payload}]
//! CALLRESULT  [3, "<id>", {payload}]
//! CALLERROR   [4, "<id>", "<code>", "<description>", {details}]
//! ```

use serde_json::{json, Value};
use thiserror::Error;

pub const CALL: u64 = 2;
pub const CALL_RESULT: u64 = 3;
pub const CALL_ERROR: u64 = 4;

/// CALLERROR codes defined by OCPP-J 1.6
pub mod error_code {
    pub const NOT_IMPLEMENTED: &str = "NotImplemented";
    pub const NOT_SUPPORTED: &str = "NotSupported";
    pub const INTERNAL_ERROR: &str = "InternalError";
    pub const PROTOCOL_ERROR: &str = "ProtocolError";
    pub const SECURITY_ERROR: &str = "SecurityError";
    pub const FORMATION_VIOLATION: &str = "FormationViolation";
    pub const PROPERTY_CONSTRAINT_VIOLATION: &str = "PropertyConstraintViolation";
    pub const OCCURENCE_CONSTRAINT_VIOLATION: &str = "OccurenceConstraintViolation";
    pub const TYPE_CONSTRAINT_VIOLATION: &str = "TypeConstraintViolation";
    pub const GENERIC_ERROR: &str = "GenericError";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Frame is not a JSON array")]
    NotArray,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {kind} frame: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

/// One decoded OCPP-J message
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call {
        id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        id: String,
        payload: Value,
    },
    CallError {
        id: String,
        code: String,
        description: String,
        details: Value,
    },
}

impl Frame {
    pub fn call(id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Frame::Call {
            id: id.into(),
            action: action.into(),
            payload,
        }
    }

    pub fn result(id: impl Into<String>, payload: Value) -> Self {
        Frame::CallResult {
            id: id.into(),
            payload,
        }
    }

    pub fn error(id: impl Into<String>, code: &str, description: impl Into<String>) -> Self {
        Frame::CallError {
            id: id.into(),
            code: code.to_string(),
            description: description.into(),
            details: json!({}),
        }
    }

    /// Message id used to correlate a reply with its call
    pub fn id(&self) -> &str {
        match self {
            Frame::Call { id, .. } | Frame::CallResult { id, .. } | Frame::CallError { id, .. } => id,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Frame::Call {
                id,
                action,
                payload,
            } => json!([CALL, id, action, payload]),
            Frame::CallResult { id, payload } => json!([CALL_RESULT, id, payload]),
            Frame::CallError {
                id,
                code,
                description,
                details,
            } => json!([CALL_ERROR, id, code, description, details]),
        }
    }

    /// Encode as the text of a WebSocket message
    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::Json(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let Value::Array(mut items) = value else {
            return Err(FrameError::NotArray);
        };
        let message_type = items.first().and_then(Value::as_u64);

        match message_type {
            Some(CALL) => {
                expect_len("CALL", &items, 4, 4)?;
                let payload = items.remove(3);
                Ok(Frame::Call {
                    id: text_at("CALL", &items, 1)?,
                    action: text_at("CALL", &items, 2)?,
                    payload,
                })
            }
            Some(CALL_RESULT) => {
                expect_len("CALLRESULT", &items, 3, 3)?;
                let payload = items.remove(2);
                Ok(Frame::CallResult {
                    id: text_at("CALLRESULT", &items, 1)?,
                    payload,
                })
            }
            Some(CALL_ERROR) => {
                // Some central systems omit the details object
                expect_len("CALLERROR", &items, 4, 5)?;
                let details = if items.len() == 5 {
                    items.remove(4)
                } else {
                    json!({})
                };
                Ok(Frame::CallError {
                    id: text_at("CALLERROR", &items, 1)?,
                    code: text_at("CALLERROR", &items, 2)?,
                    description: text_at("CALLERROR", &items, 3)?,
                    details,
                })
            }
            _ => Err(FrameError::UnknownType(
                items.first().map(Value::to_string).unwrap_or_else(|| "none".to_string()),
            )),
        }
    }
}

fn expect_len(kind: &'static str, items: &[Value], min: usize, max: usize) -> Result<(), FrameError> {
    if items.len() < min || items.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}..={max}")
        };
        return Err(FrameError::Malformed {
            kind,
            reason: format!("expected {} elements, got {}", expected, items.len()),
        });
    }
    Ok(())
}

fn text_at(kind: &'static str, items: &[Value], index: usize) -> Result<String, FrameError> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FrameError::Malformed {
            kind,
            reason: format!("element {} must be a string", index),
        })
}

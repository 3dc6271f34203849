//! In-process OCPP 1.6 central system for tests
//!
//! [`MockCentralSystem`] listens on a loopback port, negotiates `ocpp1.6`
//! and answers calls according to its [`Behaviour`].

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use ocpp_conform_core::Rule;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::frame::{error_code, Frame};
use crate::session::SUBPROTOCOL;
use crate::{boot_notification, heartbeat, request_schema};

/// How the mock answers calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Validate requests and answer invalid ones with a CALLERROR
    Conformant,
    /// Answer valid requests, never reply to invalid ones
    Silent,
    /// Answer every request as if it were valid
    AcceptEverything,
    /// Behave conformantly for this many calls, then drop the connection
    HangUpAfter(usize),
    /// Complete the handshake without selecting a subprotocol
    RefuseSubprotocol,
}

/// A call the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedCall {
    /// Request path, which ends with the charge point identity
    pub path: String,
    pub action: String,
    pub payload: Value,
}

pub struct MockCentralSystem {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedCall>>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockCentralSystem {
    pub async fn start(behaviour: Behaviour) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let calls = Arc::clone(&received);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok((tcp, peer)) => {
                            debug!(%peer, "Mock central system accepted connection");
                            tokio::spawn(serve(tcp, behaviour, Arc::clone(&calls)));
                        }
                        Err(err) => {
                            debug!(error = %err, "Mock central system accept failed");
                            break;
                        }
                    },
                }
            }
        });

        Ok(Self {
            addr,
            received,
            shutdown: Some(shutdown),
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base endpoint; the identity is appended by the session
    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("ws://{}/ocpp", self.addr)).expect("loopback URL is valid")
    }

    pub fn received(&self) -> Vec<ReceivedCall> {
        self.received.lock().clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for MockCentralSystem {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(tcp: TcpStream, behaviour: Behaviour, received: Arc<Mutex<Vec<ReceivedCall>>>) {
    let path = Arc::new(Mutex::new(String::new()));
    let seen_path = Arc::clone(&path);
    let negotiate = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        *seen_path.lock() = request.uri().path().to_string();
        let offered = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let supported = offered.split(',').any(|p| p.trim() == SUBPROTOCOL);
        if supported && behaviour != Behaviour::RefuseSubprotocol {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        }
        Ok(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, negotiate).await else {
        return;
    };
    let path = path.lock().clone();
    let mut answered = 0usize;

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(Frame::Call {
            id,
            action,
            payload,
        }) = Frame::parse(&text)
        else {
            continue;
        };
        received.lock().push(ReceivedCall {
            path: path.clone(),
            action: action.clone(),
            payload: payload.clone(),
        });

        if let Behaviour::HangUpAfter(limit) = behaviour {
            if answered >= limit {
                debug!(%action, "Mock central system hanging up");
                let _ = ws.close(None).await;
                return;
            }
        }

        if let Some(reply) = reply_for(behaviour, id, &action, &payload) {
            if ws.send(Message::Text(reply.to_text())).await.is_err() {
                return;
            }
            answered += 1;
        }
    }
}

fn reply_for(behaviour: Behaviour, id: String, action: &str, payload: &Value) -> Option<Frame> {
    let Some(schema) = request_schema(action) else {
        return Some(Frame::error(
            id,
            error_code::NOT_IMPLEMENTED,
            format!("{} is not implemented", action),
        ));
    };

    let result = schema.validate(payload);
    match (behaviour, result.first()) {
        (Behaviour::AcceptEverything, _) | (_, None) => Some(Frame::result(id, accepted(action))),
        (Behaviour::Silent, Some(_)) => None,
        (_, Some(violation)) => Some(Frame::error(id, error_code_for(violation.rule), violation.to_string())),
    }
}

fn accepted(action: &str) -> Value {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    match action {
        boot_notification::ACTION => json!({
            "status": "Accepted",
            "currentTime": now,
            "interval": 300
        }),
        _ => json!({ "currentTime": now }),
    }
}

fn error_code_for(rule: Rule) -> &'static str {
    match rule {
        Rule::Required => error_code::OCCURENCE_CONSTRAINT_VIOLATION,
        Rule::Type | Rule::Enum | Rule::Format => error_code::TYPE_CONSTRAINT_VIOLATION,
        Rule::MaxLength => error_code::PROPERTY_CONSTRAINT_VIOLATION,
        Rule::AdditionalProperties => error_code::FORMATION_VIOLATION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conformant_rejects_invalid_boot() {
        let reply = reply_for(
            Behaviour::Conformant,
            "1".to_string(),
            boot_notification::ACTION,
            &json!({ "chargePointModel": "X" }),
        );
        match reply {
            Some(Frame::CallError { code, .. }) => {
                assert_eq!(code, error_code::OCCURENCE_CONSTRAINT_VIOLATION)
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_silent_ignores_invalid_heartbeat() {
        let reply = reply_for(
            Behaviour::Silent,
            "1".to_string(),
            heartbeat::ACTION,
            &json!({ "extra": true }),
        );
        assert_eq!(reply, None);
    }

    #[test]
    fn test_accepted_replies_match_response_schemas() {
        assert!(boot_notification::response_schema()
            .validate(&accepted(boot_notification::ACTION))
            .is_valid());
        assert!(heartbeat::response_schema()
            .validate(&accepted(heartbeat::ACTION))
            .is_valid());
    }

    #[test]
    fn test_unknown_action_is_not_implemented() {
        let reply = reply_for(Behaviour::AcceptEverything, "9".to_string(), "Reset", &json!({}));
        assert!(matches!(
            reply,
            Some(Frame::CallError { ref code, .. }) if code == error_code::NOT_IMPLEMENTED
        ));
    }
}

//! Test utilities
//!
//! [`StubSession`] is a scripted [`Session`]: replies are chosen by action
//! and payload, so identical requests always get identical replies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

use crate::case::Payload;
use crate::classify::Verdict;
use crate::report::Reporter;
use crate::session::{Session, SessionError};

/// Scripted reply for a matching call
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Reply immediately with this value
    Respond(Value),
    /// Reply with this value after a delay
    Delayed(Duration, Value),
    /// Never reply
    Never,
    /// Fail the call with this error
    Fail(SessionError),
    /// Drop the whole connection and fail the call
    DropConnection(String),
}

struct Rule {
    action: String,
    payload: Option<Payload>,
    reply: StubReply,
}

/// Scripted session for exercising the orchestrator without a network
pub struct StubSession {
    rules: Vec<Rule>,
    fallback: StubReply,
    calls: Mutex<Vec<(String, Payload)>>,
    closes: AtomicUsize,
    lost: watch::Sender<Option<String>>,
}

impl Default for StubSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSession {
    /// Session that fails every call until rules are added
    pub fn new() -> Self {
        let (lost, _) = watch::channel(None);
        Self {
            rules: Vec::new(),
            fallback: StubReply::Fail(SessionError::Transport(
                "No stub reply configured".to_string(),
            )),
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            lost,
        }
    }

    /// Reply to calls of `action` carrying exactly `payload`
    pub fn on(mut self, action: &str, payload: Payload, reply: StubReply) -> Self {
        self.rules.push(Rule {
            action: action.to_string(),
            payload: Some(payload),
            reply,
        });
        self
    }

    /// Reply to every call of `action`
    pub fn on_action(mut self, action: &str, reply: StubReply) -> Self {
        self.rules.push(Rule {
            action: action.to_string(),
            payload: None,
            reply,
        });
        self
    }

    /// Reply used when no rule matches
    pub fn otherwise(mut self, reply: StubReply) -> Self {
        self.fallback = reply;
        self
    }

    /// Simulate the peer dropping the connection
    pub fn drop_connection(&self, reason: &str) {
        self.lost.send_replace(Some(reason.to_string()));
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<(String, Payload)> {
        self.calls.lock().clone()
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn reply_for(&self, action: &str, payload: &Payload) -> StubReply {
        self.rules
            .iter()
            .find(|rule| {
                rule.action == action && rule.payload.as_ref().map_or(true, |p| p == payload)
            })
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Session for StubSession {
    async fn send(&self, action: &str, payload: Payload) -> Result<Value, SessionError> {
        let reply = self.reply_for(action, &payload);
        self.calls.lock().push((action.to_string(), payload));

        match reply {
            StubReply::Respond(value) => Ok(value),
            StubReply::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            StubReply::Never => std::future::pending().await,
            StubReply::Fail(err) => Err(err),
            StubReply::DropConnection(reason) => {
                self.drop_connection(&reason);
                Err(SessionError::ConnectionLost(reason))
            }
        }
    }

    async fn closed(&self) -> String {
        let mut lost = self.lost.subscribe();
        loop {
            let current = lost.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if lost.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reporter that records verdicts in the order they were produced
#[derive(Default)]
pub struct CollectingReporter {
    verdicts: Mutex<Vec<Verdict>>,
}

impl CollectingReporter {
    pub fn verdicts(&self) -> Vec<Verdict> {
        self.verdicts.lock().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.verdicts
            .lock()
            .iter()
            .map(|v| v.title().to_string())
            .collect()
    }
}

impl Reporter for CollectingReporter {
    fn verdict(&self, verdict: &Verdict) {
        self.verdicts.lock().push(verdict.clone());
    }
}

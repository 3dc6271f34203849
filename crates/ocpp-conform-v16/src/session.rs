//! OCPP-J session over a WebSocket
//!
//! ```text
//!   send() ──► pending[id] ──► mpsc ──► writer task ──► socket
//!                 ▲                                        │
//!                 └──── oneshot ◄──── reader task ◄────────┘
//! ```
//!
//! The reader task owns the receive half and resolves pending calls by
//! message id. When the socket closes or fails, every pending call fails
//! with [`SessionError::ConnectionLost`] and `closed()` resolves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use ocpp_conform_core::{Payload, Session, SessionError};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::frame::{error_code, Frame};

/// WebSocket subprotocol for OCPP 1.6 JSON
pub const SUBPROTOCOL: &str = "ocpp1.6";

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Central system base URL, `ws://` or `wss://`
    pub endpoint: Url,
    /// Charge point identity appended to the endpoint path
    pub identity: String,
    pub subprotocol: String,
    pub connect_timeout: Duration,
    /// How long a single call may wait for its reply
    pub call_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(endpoint: Url, identity: impl Into<String>) -> Self {
        Self {
            endpoint,
            identity: identity.into(),
            subprotocol: SUBPROTOCOL.to_string(),
            connect_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint with the identity as its last path segment
    ///
    /// `ws://host/ocpp` and `ws://host/ocpp/` both become `ws://host/ocpp/<identity>`.
    pub fn station_url(&self) -> Result<Url, SessionError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::Connect(format!("{} cannot carry a path", self.endpoint)))?
            .pop_if_empty()
            .push(&self.identity);
        Ok(url)
    }
}

type Reply = Result<Value, SessionError>;

struct Shared {
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    lost: watch::Sender<Option<String>>,
}

impl Shared {
    fn lost_reason(&self) -> Option<String> {
        self.lost.borrow().clone()
    }

    fn complete(&self, id: &str, reply: Reply) {
        match self.pending.lock().remove(id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => debug!(%id, "Reply for unknown or abandoned call"),
        }
    }

    /// Mark the connection lost, then fail everything still waiting
    fn fail_all(&self, reason: &str) {
        self.lost.send_if_modified(|lost| {
            if lost.is_none() {
                *lost = Some(reason.to_string());
                true
            } else {
                false
            }
        });
        let reason = self.lost_reason().unwrap_or_else(|| reason.to_string());
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(SessionError::ConnectionLost(reason.clone())));
        }
    }
}

/// Removes the pending entry if the call future is dropped early
struct PendingCall<'a> {
    shared: &'a Shared,
    id: String,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

/// A live OCPP-J connection acting as a charge point
pub struct WsSession {
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    call_timeout: Duration,
    closing: AtomicBool,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsSession {
    /// Open the WebSocket and negotiate the subprotocol
    pub async fn connect(options: &ConnectOptions) -> Result<Self, SessionError> {
        let url = options.station_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let protocol = HeaderValue::from_str(&options.subprotocol)
            .map_err(|e| SessionError::Connect(format!("Invalid subprotocol: {}", e)))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        info!(url = %url, subprotocol = %options.subprotocol, "Connecting to central system");
        let (stream, response) = tokio::time::timeout(options.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                SessionError::Connect(format!("timed out after {:?}", options.connect_timeout))
            })?
            .map_err(connect_error)?;

        let agreed = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        if agreed != Some(options.subprotocol.as_str()) {
            return Err(SessionError::Subprotocol(format!(
                "requested {}, server selected {}",
                options.subprotocol,
                agreed.unwrap_or("none")
            )));
        }

        info!(url = %url, "Session established");
        Ok(Self::from_stream(stream, options.call_timeout))
    }

    /// Drive an already negotiated WebSocket
    pub fn from_stream<S>(stream: WebSocketStream<S>, call_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, source) = stream.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let (lost, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            lost,
        });

        let writer = tokio::spawn(write_loop(sink, rx, Arc::clone(&shared)));
        let reader = tokio::spawn(read_loop(source, outbound.clone(), Arc::clone(&shared)));

        Self {
            outbound,
            shared,
            call_timeout,
            closing: AtomicBool::new(false),
            reader,
            writer,
        }
    }

    /// Calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

fn connect_error(err: WsError) -> SessionError {
    match err {
        WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(e)) => {
            SessionError::Subprotocol(e.to_string())
        }
        WsError::Http(response) => {
            SessionError::Connect(format!("handshake rejected with HTTP {}", response.status()))
        }
        other => SessionError::Connect(other.to_string()),
    }
}

async fn wait_lost(mut lost: watch::Receiver<Option<String>>) -> String {
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

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if let Err(err) = sink.send(message).await {
            warn!(error = %err, "WebSocket write failed");
            shared.fail_all(&format!("write failed: {}", err));
            return;
        }
        if is_close {
            return;
        }
    }
}

async fn read_loop<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    outbound: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => handle_text(&text, &outbound, &shared),
            Some(Ok(Message::Binary(_))) => warn!("Ignoring binary message"),
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => format!(
                        "closed by peer ({} {})",
                        u16::from(frame.code),
                        frame.reason
                    ),
                    None => "closed by peer".to_string(),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => break format!("read failed: {}", err),
            None => break "stream ended".to_string(),
        }
    };

    info!(%reason, "Connection closed");
    shared.fail_all(&reason);
}

fn handle_text(text: &str, outbound: &mpsc::UnboundedSender<Message>, shared: &Shared) {
    match Frame::parse(text) {
        Ok(Frame::CallResult { id, payload }) => shared.complete(&id, Ok(payload)),
        Ok(Frame::CallError {
            id,
            code,
            description,
            ..
        }) => shared.complete(&id, Err(SessionError::CallError { code, description })),
        Ok(Frame::Call { id, action, .. }) => {
            warn!(%action, "Central system call not supported, replying NotImplemented");
            let reply = Frame::error(
                id,
                error_code::NOT_IMPLEMENTED,
                format!("{} is not supported by this charge point", action),
            );
            let _ = outbound.send(Message::Text(reply.to_text()));
        }
        Err(err) => warn!(error = %err, "Dropping malformed message"),
    }
}

#[async_trait]
impl Session for WsSession {
    async fn send(&self, action: &str, payload: Payload) -> Result<Value, SessionError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        let call = PendingCall {
            shared: &self.shared,
            id: id.clone(),
        };

        // fail_all marks the loss before draining, so a call inserted after
        // the drain sees the reason here
        if let Some(reason) = self.shared.lost_reason() {
            return Err(SessionError::ConnectionLost(reason));
        }

        let frame = Frame::call(id.as_str(), action, Value::Object(payload));
        debug!(%id, %action, "Sending CALL");
        if self.outbound.send(Message::Text(frame.to_text())).is_err() {
            return Err(SessionError::ConnectionLost("writer stopped".to_string()));
        }

        let reply = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SessionError::ConnectionLost(
                self.shared
                    .lost_reason()
                    .unwrap_or_else(|| "connection closed".to_string()),
            )),
            Err(_) => Err(SessionError::Timeout),
        };
        drop(call);
        reply
    }

    async fn closed(&self) -> String {
        wait_lost(self.shared.lost.subscribe()).await
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing session");
        if self.outbound.send(Message::Close(None)).is_ok() {
            let _ = tokio::time::timeout(CLOSE_GRACE, wait_lost(self.shared.lost.subscribe())).await;
        }
        self.reader.abort();
        self.writer.abort();
        self.shared.fail_all("session closed");
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

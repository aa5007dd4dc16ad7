//! deskit client library
//!
//! Orchestrator-side half of the desktop control protocol: a transport that
//! talks to `deskitd` over its local socket, the Dispatch Client turning tool
//! calls into conversation blocks, and the Capture Subscriber that records
//! what a human does on the same desktop.

pub mod capture;
pub mod dispatch;
pub mod settings;
pub mod store;

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use deskit_common::wire::{
    encode_line, new_msg, verify_hmac, DAEMON_IDENT, MSG_ACK, MSG_ACTION, MSG_CAPTURE, MSG_ERR,
    MSG_EVENT, MSG_RESULT, MSG_STATUS, MSG_STATUS_RESPONSE, MSG_SUBSCRIBE,
};
use deskit_common::{ActionResult, CanonicalAction, Msg, PushEvent};

pub use capture::{CaptureState, CaptureSubscriber};
pub use deskit_common::wire::DEFAULT_SOCK;
pub use dispatch::Dispatcher;
pub use settings::ClientSettings;
pub use store::{ConversationStore, MemoryStore};

/// Push events buffered between the socket reader and the subscriber.
const PUSH_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("disconnected")]
    Disconnected,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout")]
    Timeout,
    #[error("daemon not available")]
    DaemonUnavailable,
    #[error("daemon rejected request: {0}")]
    Rejected(String),
    #[error("failed to sign request: {0}")]
    Signing(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Request/response channel carrying one action at a time.
#[async_trait]
pub trait ActionTransport: Send + Sync {
    async fn perform(&self, action: &CanonicalAction) -> Result<ActionResult, ClientError>;
}

/// Long-lived channel delivering the daemon's push events.
///
/// The receiver closes when the daemon goes away.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn open(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError>;
}

/// Client for the deskit daemon. Every request uses its own connection.
#[derive(Debug, Clone)]
pub struct DeskitClient {
    sock_path: String,
    ident: String,
    secret: String,
    request_timeout: Duration,
}

impl DeskitClient {
    pub fn new(sock: impl Into<String>, ident: &str, secret: &str) -> Self {
        Self {
            sock_path: sock.into(),
            ident: ident.to_string(),
            secret: secret.to_string(),
            request_timeout: settings::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.sock_path.clone(), &settings.ident, &settings.secret)
            .with_request_timeout(settings.request_timeout)
    }

    /// Upper bound for a single round trip. `wait` and long `type_text`
    /// actions hold the channel for their whole duration.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Get client identifier
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Executes one action and decodes the daemon's `RESULT`.
    pub async fn perform(&self, action: &CanonicalAction) -> Result<ActionResult, ClientError> {
        let payload =
            serde_json::to_value(action).map_err(|e| ClientError::Signing(e.to_string()))?;
        let response = self.request(MSG_ACTION, payload).await?;
        expect_type(&response, MSG_RESULT)?;
        ActionResult::from_wire(&response.payload)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Daemon version, build, uptime and counters.
    pub async fn status(&self) -> Result<Value, ClientError> {
        let response = self.request(MSG_STATUS, json!({})).await?;
        expect_type(&response, MSG_STATUS_RESPONSE)?;
        Ok(response.payload)
    }

    /// Hands an observed input event to the daemon for rebroadcast.
    /// `false` when the daemon discarded it.
    pub async fn capture(&self, observed: Value) -> Result<bool, ClientError> {
        let response = self.request(MSG_CAPTURE, observed).await?;
        expect_type(&response, MSG_ACK)?;
        Ok(response
            .payload
            .get("published")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Opens the push channel: sends `SUBSCRIBE`, waits for the `ACK`, then
    /// forwards every authentic `EVENT` until the daemon hangs up or the
    /// receiver is dropped.
    pub async fn subscribe(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        let stream = self.connect().await?;
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        self.send(&mut writer, MSG_SUBSCRIBE, json!({})).await?;
        let ack = self.read_reply(&mut lines).await?;
        expect_type(&ack, MSG_ACK)?;
        debug!("Subscribed to deskitd push channel as {}", self.ident);

        let (tx, rx) = mpsc::channel(PUSH_BUFFER);
        let secret = self.secret.clone();
        tokio::spawn(async move {
            // Keeps the write half open for the lifetime of the subscription.
            let _writer = writer;
            loop {
                let line = tokio::select! {
                    _ = tx.closed() => break,
                    line = lines.next_line() => line,
                };
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("deskitd closed the push channel");
                        break;
                    }
                    Err(err) => {
                        warn!("Push channel read failed: {}", err);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(event) = decode_event(&line, &secret) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn request(&self, msg_type: &str, payload: Value) -> Result<Msg, ClientError> {
        let stream = self.connect().await?;
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        self.send(&mut writer, msg_type, payload).await?;
        self.read_reply(&mut lines).await
    }

    async fn send<W>(&self, writer: &mut W, msg_type: &str, payload: Value) -> Result<(), ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let msg = new_msg(msg_type, &self.ident, DAEMON_IDENT, payload, &self.secret)
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        let line = encode_line(&msg).map_err(|e| ClientError::Signing(e.to_string()))?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_reply<R>(&self, lines: &mut Lines<BufReader<R>>) -> Result<Msg, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let line = match timeout(self.request_timeout, lines.next_line()).await {
            Err(_) => return Err(ClientError::Timeout),
            Ok(Ok(None)) => return Err(ClientError::Disconnected),
            Ok(Ok(Some(line))) => line,
            Ok(Err(err)) => return Err(err.into()),
        };

        let response: Msg = serde_json::from_str(line.trim())
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        if !verify_hmac(&response, &self.secret).unwrap_or(false) {
            warn!("Invalid HMAC in {} response", response.msg_type);
            return Err(ClientError::InvalidResponse("invalid HMAC".to_string()));
        }
        if response.msg_type == MSG_ERR {
            let message = response
                .error_message()
                .unwrap_or("daemon rejected request")
                .to_string();
            return Err(ClientError::Rejected(message));
        }
        Ok(response)
    }

    #[cfg(unix)]
    async fn connect(&self) -> Result<tokio::net::UnixStream, ClientError> {
        tokio::net::UnixStream::connect(&self.sock_path)
            .await
            .map_err(connect_error)
    }

    #[cfg(not(unix))]
    async fn connect(&self) -> Result<tokio::net::TcpStream, ClientError> {
        let addr = if self.sock_path.contains(':') {
            self.sock_path.clone()
        } else {
            DEFAULT_SOCK.to_string()
        };
        tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(connect_error)
    }
}

#[async_trait]
impl ActionTransport for DeskitClient {
    async fn perform(&self, action: &CanonicalAction) -> Result<ActionResult, ClientError> {
        DeskitClient::perform(self, action).await
    }
}

#[async_trait]
impl PushChannel for DeskitClient {
    async fn open(&self) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
        self.subscribe().await
    }
}

fn connect_error(err: io::Error) -> ClientError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
            ClientError::DaemonUnavailable
        }
        _ => ClientError::Io(err),
    }
}

fn expect_type(msg: &Msg, expected: &str) -> Result<(), ClientError> {
    if msg.msg_type == expected {
        Ok(())
    } else {
        Err(ClientError::InvalidResponse(format!(
            "expected {expected}, got {}",
            msg.msg_type
        )))
    }
}

fn decode_event(line: &str, secret: &str) -> Option<PushEvent> {
    let msg: Msg = match serde_json::from_str(line.trim()) {
        Ok(msg) => msg,
        Err(err) => {
            warn!("Failed to parse push frame: {}", err);
            return None;
        }
    };
    if !verify_hmac(&msg, secret).unwrap_or(false) {
        warn!("Invalid HMAC in push frame {}", msg.msg_id);
        return None;
    }
    if msg.msg_type != MSG_EVENT {
        debug!("Ignoring {} frame on push channel", msg.msg_type);
        return None;
    }
    match serde_json::from_value(msg.payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("Malformed push event: {}", err);
            None
        }
    }
}

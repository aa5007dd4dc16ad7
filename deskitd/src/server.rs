//! Connection loop and message handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use deskit_common::wire::{
    self, encode_line, new_msg, shorten_sig, summarize_body, DAEMON_IDENT, MSG_ACK, MSG_ACTION,
    MSG_CAPTURE, MSG_EVENT, MSG_RESULT, MSG_STATUS, MSG_STATUS_RESPONSE, MSG_SUBSCRIBE,
};
use deskit_common::{CanonicalAction, Msg};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureHub;
use crate::synth::Synthesizer;

pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Daemon {
    secret: String,
    synth: Synthesizer,
    hub: Arc<CaptureHub>,
    started_at: DateTime<Utc>,
    actions_executed: AtomicU64,
}

impl Daemon {
    pub fn new(secret: String, synth: Synthesizer, hub: Arc<CaptureHub>) -> Self {
        Self {
            secret,
            synth,
            hub,
            started_at: Utc::now(),
            actions_executed: AtomicU64::new(0),
        }
    }

    pub fn hub(&self) -> &Arc<CaptureHub> {
        &self.hub
    }

    pub fn actions_executed(&self) -> u64 {
        self.actions_executed.load(Ordering::Relaxed)
    }

    pub fn status_payload(&self) -> Value {
        json!({
            "daemon": DAEMON_IDENT,
            "version": DAEMON_VERSION,
            "build": deskit_build_info::build_id(),
            "started_at": self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "subscribers": self.hub.subscriber_count(),
            "events_lost": self.hub.lost_events(),
            "actions_executed": self.actions_executed(),
        })
    }

    fn is_authentic(&self, msg: &Msg) -> Result<bool> {
        let check = msg.check_signature(&self.secret)?;
        if !check.valid {
            warn!(
                from = %msg.from,
                to = %msg.to,
                msg_type = %msg.msg_type,
                msg_id = %msg.msg_id,
                ts = msg.ts,
                nonce = %msg.nonce,
                provided_sig = %shorten_sig(&msg.hmac),
                expected_sig = %shorten_sig(&check.expected),
                body = %summarize_body(&check.signed_text),
                "Invalid HMAC from client"
            );
        }
        Ok(check.valid)
    }
}

/// Removes a leftover socket file at `path`. Returns whether one was there;
/// refuses to touch anything that is not a socket.
#[cfg(unix)]
pub fn unlink_socket(path: &std::path::Path) -> Result<bool> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    if !metadata.file_type().is_socket() {
        anyhow::bail!("{} exists and is not a socket", path.display());
    }
    std::fs::remove_file(path)?;
    debug!("Removed socket {}", path.display());
    Ok(true)
}

#[cfg(unix)]
pub async fn serve(listener: tokio::net::UnixListener, daemon: Arc<Daemon>) -> Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let daemon = daemon.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, daemon).await {
                error!("Connection error: {}", e);
            }
        });
    }
}

#[cfg(not(unix))]
pub async fn serve(listener: tokio::net::TcpListener, daemon: Arc<Daemon>) -> Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let daemon = daemon.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, daemon).await {
                error!("TCP connection error: {}", e);
            }
        });
    }
}

/// Serves one client until EOF. A `SUBSCRIBE` turns the connection into a
/// push stream for the rest of its lifetime.
pub async fn handle_connection<S>(stream: S, daemon: Arc<Daemon>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        let msg = match serde_json::from_str::<Msg>(raw) {
            Ok(msg) => msg,
            Err(e) => {
                error!("JSON parse error: {}", e);
                continue;
            }
        };

        debug!("Received message: {} from {}", msg.msg_type, msg.from);
        if !daemon.is_authentic(&msg)? {
            continue;
        }

        if msg.msg_type == MSG_SUBSCRIBE {
            let receiver = daemon.hub.subscribe();
            let ack = msg.reply(MSG_ACK, json!({ "subscribed": true }));
            write_signed(&mut writer, ack, &daemon.secret).await?;
            info!(subscriber = %msg.from, "Push subscriber attached");
            return stream_events(lines, writer, receiver, &daemon, &msg.from).await;
        }

        if let Some(response) = handle_message(msg, &daemon).await? {
            write_signed(&mut writer, response, &daemon.secret).await?;
        }
    }
    Ok(())
}

pub async fn handle_message(msg: Msg, daemon: &Daemon) -> Result<Option<Msg>> {
    match msg.msg_type.as_str() {
        MSG_ACTION => handle_action(msg, daemon).await,
        MSG_CAPTURE => handle_capture(msg, daemon).await,
        MSG_STATUS => Ok(Some(msg.reply(MSG_STATUS_RESPONSE, daemon.status_payload()))),
        _ => {
            warn!("Unknown message type: {}", msg.msg_type);
            Ok(Some(msg.error_reply(
                "E_UNKNOWN_TYPE",
                &format!("unknown message type '{}'", msg.msg_type),
            )))
        }
    }
}

async fn handle_action(msg: Msg, daemon: &Daemon) -> Result<Option<Msg>> {
    let action = match serde_json::from_value::<CanonicalAction>(msg.payload.clone()) {
        Ok(action) => action,
        Err(err) => {
            warn!(from = %msg.from, "Rejected malformed action: {}", err);
            return Ok(Some(msg.error_reply("E_INVALID_ACTION", &err.to_string())));
        }
    };

    info!(from = %msg.from, action = action.name(), "Executing action");
    let result = daemon.synth.execute(&action).await;
    daemon.actions_executed.fetch_add(1, Ordering::Relaxed);
    Ok(Some(msg.reply(MSG_RESULT, result.to_wire())))
}

async fn handle_capture(msg: Msg, daemon: &Daemon) -> Result<Option<Msg>> {
    let published = daemon.hub.ingest(msg.payload.clone()).await;
    let payload = match published {
        Some(event) => json!({ "published": true, "event": event.event }),
        None => json!({ "published": false }),
    };
    Ok(Some(msg.reply(MSG_ACK, payload)))
}

async fn stream_events<R, W>(
    mut lines: Lines<BufReader<R>>,
    mut writer: W,
    mut receiver: broadcast::Receiver<wire::PushEvent>,
    daemon: &Daemon,
    subscriber: &str,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            received = daemon.hub.next_event(&mut receiver, subscriber) => match received {
                Some(event) => {
                    let frame = new_msg(
                        MSG_EVENT,
                        DAEMON_IDENT,
                        subscriber,
                        serde_json::to_value(&event)?,
                        &daemon.secret,
                    )?;
                    writer.write_all(encode_line(&frame)?.as_bytes()).await?;
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(_) => {}
                None => break,
            },
        }
    }
    info!(%subscriber, "Push subscriber detached");
    Ok(())
}

async fn write_signed<W>(writer: &mut W, mut msg: Msg, secret: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    msg.sign(secret)?;
    writer.write_all(encode_line(&msg)?.as_bytes()).await?;
    Ok(())
}

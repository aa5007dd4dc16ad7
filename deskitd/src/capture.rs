//! Fan-out of observed human input to push subscribers.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use deskit_common::normalize::{action_name, SCREENSHOT_PAIRED};
use deskit_common::wire::{EVENT_ACTION, EVENT_SCREENSHOT_AND_ACTION};
use deskit_common::PushEvent;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::DesktopCapability;

/// Bounded fan-out. A subscriber that falls more than `buffer` events behind
/// loses the overflow for good; `lost_events` counts those across subscribers.
pub struct CaptureHub {
    sender: broadcast::Sender<PushEvent>,
    desktop: Arc<dyn DesktopCapability>,
    lost: AtomicU64,
}

impl CaptureHub {
    pub fn new(desktop: Arc<dyn DesktopCapability>, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            desktop,
            lost: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn lost_events(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Next event for `receiver`, skipping past any overflow. `None` once the
    /// hub is gone.
    pub async fn next_event(
        &self,
        receiver: &mut broadcast::Receiver<PushEvent>,
        subscriber: &str,
    ) -> Option<PushEvent> {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    self.lost.fetch_add(skipped, Ordering::Relaxed);
                    warn!(
                        %subscriber,
                        skipped,
                        "Push subscriber lagging; skipped events are permanently lost for this session"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Correlates one observed action with a frame when applicable and
    /// publishes it. Returns the published event, or `None` when the payload
    /// is not an object.
    pub async fn ingest(&self, action: Value) -> Option<PushEvent> {
        if !action.is_object() {
            warn!("Dropping captured payload that is not an object");
            return None;
        }

        let name = action_name(&action).unwrap_or_default().to_string();
        let event = if SCREENSHOT_PAIRED.contains(&name.as_str()) {
            match self.desktop.capture_frame().await {
                Ok(frame) => PushEvent::new(
                    EVENT_SCREENSHOT_AND_ACTION,
                    json!({
                        "screenshot": {
                            "image": general_purpose::STANDARD.encode(&frame.bytes),
                            "mediaType": frame.media_type,
                        },
                        "action": action,
                    }),
                ),
                Err(err) => {
                    warn!(action = %name, error = %err, "Frame capture failed; publishing bare action");
                    PushEvent::new(EVENT_ACTION, action)
                }
            }
        } else {
            PushEvent::new(EVENT_ACTION, action)
        };

        let delivered = self.publish(event.clone());
        debug!(action = %name, event = %event.event, delivered, "Captured action published");
        Some(event)
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: PushEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

/// Runs `command` through `sh -c` and ingests every JSON line it prints.
pub fn spawn_input_hook(hub: Arc<CaptureHub>, command: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(%command, "Starting input hook");
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                warn!(%command, "Failed to start input hook: {}", err);
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!(%command, "Input hook has no stdout");
            return;
        };

        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let raw = line.trim();
                    if raw.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(raw) {
                        Ok(action) => {
                            hub.ingest(action).await;
                        }
                        Err(err) => warn!("Input hook emitted invalid JSON: {}", err),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("Failed to read input hook output: {}", err);
                    break;
                }
            }
        }

        match child.wait().await {
            Ok(status) => info!(%command, %status, "Input hook exited"),
            Err(err) => warn!(%command, "Failed to reap input hook: {}", err),
        }
    })
}

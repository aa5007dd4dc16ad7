//! Dispatch Client.
//!
//! Turns one canonical action into the `tool_result` block the orchestrator
//! appends to its conversation. Nothing in here returns an error: transport
//! and daemon failures become error-tagged blocks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use deskit_common::{ActionResult, CanonicalAction, ConversationBlock, MediaSource, Payload};

use crate::settings::DEFAULT_SETTLE_DELAY;
use crate::ActionTransport;

pub const SUCCESS_TEXT: &str = "Tool executed successfully";

pub struct Dispatcher {
    transport: Arc<dyn ActionTransport>,
    settle_delay: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn ActionTransport>) -> Self {
        Self {
            transport,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Parses a `computer_<tag>` tool call and dispatches it.
    pub async fn dispatch_tool_use(
        &self,
        tool_use_id: &str,
        name: &str,
        input: &Value,
    ) -> ConversationBlock {
        match CanonicalAction::from_tool_use(name, input) {
            Ok(action) => self.dispatch(tool_use_id, &action).await,
            Err(err) => {
                warn!(tool = name, error = %err, "Rejected malformed tool call");
                ConversationBlock::tool_error(
                    tool_use_id,
                    format!("Invalid input for {name}: {err}"),
                )
            }
        }
    }

    pub async fn dispatch(&self, tool_use_id: &str, action: &CanonicalAction) -> ConversationBlock {
        match action {
            CanonicalAction::Screenshot => self.screenshot(tool_use_id).await,
            CanonicalAction::CursorPosition => self.cursor_position(tool_use_id).await,
            _ => self.mutate(tool_use_id, action).await,
        }
    }

    async fn screenshot(&self, tool_use_id: &str) -> ConversationBlock {
        match self.transport.perform(&CanonicalAction::Screenshot).await {
            Ok(ActionResult::Ok(Payload::Image { bytes, media_type })) => {
                ConversationBlock::tool_result(
                    tool_use_id,
                    vec![ConversationBlock::image(media_type, &bytes)],
                )
            }
            Ok(ActionResult::Ok(other)) => ConversationBlock::tool_error(
                tool_use_id,
                format!("screenshot returned no image ({})", payload_kind(&other)),
            ),
            Ok(ActionResult::Err { message }) => ConversationBlock::tool_error(tool_use_id, message),
            Err(err) => transport_failure(tool_use_id, "screenshot", &err),
        }
    }

    async fn cursor_position(&self, tool_use_id: &str) -> ConversationBlock {
        match self.transport.perform(&CanonicalAction::CursorPosition).await {
            Ok(ActionResult::Ok(Payload::Cursor(at))) => ConversationBlock::tool_result(
                tool_use_id,
                vec![ConversationBlock::text(format!(
                    "Cursor position: {}, {}",
                    at.x, at.y
                ))],
            ),
            Ok(ActionResult::Ok(other)) => ConversationBlock::tool_error(
                tool_use_id,
                format!("cursor_position returned no coordinates ({})", payload_kind(&other)),
            ),
            Ok(ActionResult::Err { message }) => ConversationBlock::tool_error(tool_use_id, message),
            Err(err) => transport_failure(tool_use_id, "cursor_position", &err),
        }
    }

    async fn mutate(&self, tool_use_id: &str, action: &CanonicalAction) -> ConversationBlock {
        let outcome = match self.transport.perform(action).await {
            Ok(outcome) => outcome,
            Err(err) => return transport_failure(tool_use_id, action.name(), &err),
        };

        let (mut content, is_error) = match outcome {
            ActionResult::Ok(Payload::File {
                data,
                name,
                size,
                media_type,
            }) => (
                vec![ConversationBlock::Document {
                    source: MediaSource::base64(media_type, &data),
                    name,
                    size,
                }],
                false,
            ),
            ActionResult::Ok(_) => (vec![ConversationBlock::text(SUCCESS_TEXT)], false),
            ActionResult::Err { message } => {
                debug!(action = action.name(), "Daemon reported failure: {}", message);
                (vec![ConversationBlock::text(message)], true)
            }
        };

        tokio::time::sleep(self.settle_delay).await;

        // Opportunistic; a failed screenshot never replaces the outcome above.
        match self.transport.perform(&CanonicalAction::Screenshot).await {
            Ok(ActionResult::Ok(Payload::Image { bytes, media_type })) => {
                content.push(ConversationBlock::image(media_type, &bytes));
            }
            Ok(other) => debug!(action = action.name(), "No follow-up screenshot: {:?}", other),
            Err(err) => debug!(action = action.name(), "Follow-up screenshot failed: {}", err),
        }

        ConversationBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content,
            is_error,
        }
    }
}

fn transport_failure(
    tool_use_id: &str,
    action: &str,
    err: &crate::ClientError,
) -> ConversationBlock {
    warn!(action, error = %err, "Action dispatch failed");
    ConversationBlock::tool_error(tool_use_id, format!("{action} failed: {err}"))
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::None => "empty",
        Payload::Image { .. } => "image",
        Payload::Cursor(_) => "cursor",
        Payload::File { .. } => "file",
    }
}

//! Conversation content blocks handed to the external conversation store.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl MediaSource {
    pub fn base64(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::from_encoded(media_type, BASE64.encode(bytes))
    }

    /// Wraps data that already travels base64-encoded.
    pub fn from_encoded(media_type: impl Into<String>, data: String) -> Self {
        Self {
            kind: "base64".to_string(),
            media_type: media_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationBlock {
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ConversationBlock>,
        #[serde(default)]
        is_error: bool,
    },
    UserAction {
        content: Vec<ConversationBlock>,
    },
    Text {
        text: String,
    },
    Image {
        source: MediaSource,
    },
    Document {
        source: MediaSource,
        name: String,
        size: u64,
    },
}

impl ConversationBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ConversationBlock::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        ConversationBlock::Image {
            source: MediaSource::base64(media_type, bytes),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: Vec<ConversationBlock>) -> Self {
        ConversationBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: false,
        }
    }

    /// Error-tagged result with a single text entry.
    pub fn tool_error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        ConversationBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: vec![ConversationBlock::text(message)],
            is_error: true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ConversationBlock::ToolResult { is_error: true, .. })
    }

    /// Nested content of a tool result or user action, empty otherwise.
    pub fn content(&self) -> &[ConversationBlock] {
        match self {
            ConversationBlock::ToolResult { content, .. }
            | ConversationBlock::UserAction { content } => content,
            _ => &[],
        }
    }
}

//! Conversation store interface. The client only ever appends.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use deskit_common::{ConversationBlock, Role};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        blocks: Vec<ConversationBlock>,
    ) -> Result<()>;
}

/// One appended message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub session_id: String,
    pub role: Role,
    pub blocks: Vec<ConversationBlock>,
    pub appended_at: DateTime<Utc>,
}

/// In-process store keyed by session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self, session_id: &str) -> Vec<StoredMessage> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        blocks: Vec<ConversationBlock>,
    ) -> Result<()> {
        let message = StoredMessage {
            session_id: session_id.to_string(),
            role,
            blocks,
            appended_at: Utc::now(),
        };
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}

//! Capture Subscriber.
//!
//! Listens on the daemon's push channel and appends what the human did to the
//! conversation as `user_action` blocks, so a session records both sides of
//! the desktop.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use deskit_common::blocks::MediaSource;
use deskit_common::normalize::{action_name, normalize_action, str_field, SCREENSHOT_PAIRED};
use deskit_common::result::PNG_MEDIA_TYPE;
use deskit_common::wire::{EVENT_ACTION, EVENT_SCREENSHOT_AND_ACTION};
use deskit_common::{CanonicalAction, ConversationBlock, PushEvent, Role};

use crate::store::ConversationStore;
use crate::{ClientError, PushChannel};

/// Actions accepted without a screenshot. `click_mouse` is included because
/// the daemon downgrades a click to a bare event when its frame capture fails.
pub const BARE_ACTIONS: [&str; 7] = [
    "click_mouse",
    "drag_mouse",
    "press_mouse",
    "type_keys",
    "press_keys",
    "type_text",
    "scroll",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Disconnected,
    Connected,
    Capturing,
}

#[derive(Debug)]
struct Shared {
    state: CaptureState,
    session_id: Option<String>,
    /// Bumped on every new channel so a finished pump cannot reset a newer one.
    generation: u64,
}

pub struct CaptureSubscriber {
    channel: Arc<dyn PushChannel>,
    store: Arc<dyn ConversationStore>,
    shared: Arc<Mutex<Shared>>,
    pump: AsyncMutex<Option<JoinHandle<()>>>,
}

impl CaptureSubscriber {
    pub fn new(channel: Arc<dyn PushChannel>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            channel,
            store,
            shared: Arc::new(Mutex::new(Shared {
                state: CaptureState::Disconnected,
                session_id: None,
                generation: 0,
            })),
            pump: AsyncMutex::new(None),
        }
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.shared).state
    }

    pub fn session_id(&self) -> Option<String> {
        lock(&self.shared).session_id.clone()
    }

    /// Starts recording into `session_id`. Opens the push channel when
    /// disconnected, otherwise resumes on the channel already open.
    pub async fn start(&self, session_id: &str) -> Result<(), ClientError> {
        let mut pump = self.pump.lock().await;

        {
            let mut shared = lock(&self.shared);
            if shared.state != CaptureState::Disconnected {
                shared.session_id = Some(session_id.to_string());
                shared.state = CaptureState::Capturing;
                debug!(session = session_id, "Capture resumed on open channel");
                return Ok(());
            }
        }

        if let Some(stale) = pump.take() {
            stale.abort();
        }

        let events = self.channel.open().await?;
        let generation = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            // Must be visible before the pump can observe a hang-up.
            shared.state = CaptureState::Capturing;
            shared.session_id = Some(session_id.to_string());
            shared.generation
        };

        *pump = Some(tokio::spawn(run_pump(
            events,
            self.shared.clone(),
            self.store.clone(),
            generation,
        )));
        info!(session = session_id, "Capture started");
        Ok(())
    }

    /// Stops recording but keeps the channel open.
    pub fn pause(&self) {
        let mut shared = lock(&self.shared);
        if shared.state == CaptureState::Capturing {
            shared.state = CaptureState::Connected;
            debug!("Capture paused");
        }
    }

    /// Closes the channel. Safe to call in any state.
    pub async fn stop(&self) {
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        let mut shared = lock(&self.shared);
        if shared.state != CaptureState::Disconnected {
            info!("Capture stopped");
        }
        shared.state = CaptureState::Disconnected;
        shared.session_id = None;
    }
}

async fn run_pump(
    mut events: mpsc::Receiver<PushEvent>,
    shared: Arc<Mutex<Shared>>,
    store: Arc<dyn ConversationStore>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        let session_id = {
            let shared = lock(&shared);
            match (&shared.state, &shared.session_id) {
                (CaptureState::Capturing, Some(id)) => id.clone(),
                _ => continue,
            }
        };
        let Some(block) = normalize_push_event(&event) else {
            continue;
        };
        if let Err(err) = store.append(&session_id, Role::User, vec![block]).await {
            warn!(session = %session_id, error = %err, "Failed to store captured action");
        }
    }

    let mut shared = lock(&shared);
    if shared.generation == generation {
        warn!("Push channel closed; capture disconnected");
        shared.state = CaptureState::Disconnected;
    }
}

/// Turns one push event into a `user_action` block, or `None` when the event
/// is filtered or unusable.
pub fn normalize_push_event(event: &PushEvent) -> Option<ConversationBlock> {
    match event.event.as_str() {
        EVENT_SCREENSHOT_AND_ACTION => {
            let observed = event.data.get("action")?;
            let name = action_name(observed).unwrap_or_default();
            if !SCREENSHOT_PAIRED.contains(&name) {
                debug!(action = name, "Dropping screenshot pairing for unpaired action");
                return None;
            }
            let action = reconstruct(observed)?;
            let mut content: Vec<ConversationBlock> =
                screenshot_block(event.data.get("screenshot")).into_iter().collect();
            content.push(tool_use(&action));
            Some(ConversationBlock::UserAction { content })
        }
        EVENT_ACTION => {
            let name = action_name(&event.data).unwrap_or_default();
            if !BARE_ACTIONS.contains(&name) {
                debug!(action = name, "Ignoring captured action");
                return None;
            }
            let action = reconstruct(&event.data)?;
            Some(ConversationBlock::UserAction {
                content: vec![tool_use(&action)],
            })
        }
        other => {
            debug!(event = other, "Ignoring unknown push event");
            None
        }
    }
}

fn reconstruct(observed: &Value) -> Option<CanonicalAction> {
    match normalize_action(observed) {
        Ok(action) => Some(action),
        Err(err) => {
            warn!(error = %err, "Dropping malformed captured action");
            None
        }
    }
}

fn screenshot_block(screenshot: Option<&Value>) -> Option<ConversationBlock> {
    let screenshot = screenshot?;
    let image = str_field(screenshot, "image").filter(|data| !data.is_empty())?;
    let media_type = str_field(screenshot, "mediaType").unwrap_or(PNG_MEDIA_TYPE);
    Some(ConversationBlock::Image {
        source: MediaSource::from_encoded(media_type, image.to_string()),
    })
}

fn tool_use(action: &CanonicalAction) -> ConversationBlock {
    ConversationBlock::ToolUse {
        id: format!("toolu_{}", Uuid::new_v4().simple()),
        name: action.tool_name(),
        input: action.tool_input(),
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

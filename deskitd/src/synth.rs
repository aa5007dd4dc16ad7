//! Action Synthesis Engine.
//!
//! Compiles one [`CanonicalAction`] into desktop primitives. Every key name
//! and character is resolved before the first primitive is issued, so a bad
//! key leaves the device untouched. Failures are converted into
//! [`ActionResult::Err`]; nothing is retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deskit_common::{ActionResult, CanonicalAction, MouseButton, Payload, Phase, Point};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::capability::{CapabilityError, DesktopCapability, FileCapability};
use crate::charmap::{text_to_keystrokes, CharacterKeystroke, CharacterMappingError};
use crate::config::SynthesisSettings;
use crate::keymap::{self, KeyResolutionError, PlatformKey, CONTROL, SHIFT};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Key(#[from] KeyResolutionError),
    #[error(transparent)]
    Character(#[from] CharacterMappingError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("{0}")]
    Invalid(&'static str),
}

pub struct Synthesizer {
    desktop: Arc<dyn DesktopCapability>,
    files: Arc<dyn FileCapability>,
    settings: SynthesisSettings,
    device: Mutex<()>,
}

impl Synthesizer {
    pub fn new(
        desktop: Arc<dyn DesktopCapability>,
        files: Arc<dyn FileCapability>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            desktop,
            files,
            settings,
            device: Mutex::new(()),
        }
    }

    pub fn desktop(&self) -> &Arc<dyn DesktopCapability> {
        &self.desktop
    }

    /// Executes one action. Device-mutating actions run one at a time.
    pub async fn execute(&self, action: &CanonicalAction) -> ActionResult {
        let outcome = if action.is_observation() {
            self.run(action).await
        } else {
            let _device = self.device.lock().await;
            self.run(action).await
        };

        match outcome {
            Ok(payload) => {
                debug!(action = action.name(), "Action completed");
                ActionResult::Ok(payload)
            }
            Err(err) => {
                warn!(action = action.name(), error = %err, "Action failed");
                ActionResult::error(err.to_string())
            }
        }
    }

    async fn run(&self, action: &CanonicalAction) -> Result<Payload, SynthesisError> {
        match action {
            CanonicalAction::MoveMouse { to } => {
                self.desktop.set_cursor(*to).await?;
            }
            CanonicalAction::TraceMouse { path, hold_keys } => {
                if path.is_empty() {
                    return Err(SynthesisError::Invalid("trace_mouse requires a non-empty path"));
                }
                let held = resolve_keys(hold_keys)?;
                self.with_held_keys(&held, async {
                    for point in path {
                        self.desktop.set_cursor(*point).await?;
                    }
                    Ok::<(), SynthesisError>(())
                })
                .await?;
            }
            CanonicalAction::ClickMouse {
                at,
                button,
                hold_keys,
                count,
            } => {
                let held = resolve_keys(hold_keys)?;
                self.with_held_keys(&held, async {
                    self.move_if_requested(*at).await?;
                    self.desktop.click(*button, (*count).max(1)).await?;
                    Ok::<(), SynthesisError>(())
                })
                .await?;
            }
            CanonicalAction::PressMouse { at, button, phase } => {
                self.move_if_requested(*at).await?;
                match phase {
                    Phase::Down => self.desktop.press_button(*button).await?,
                    Phase::Up => self.desktop.release_button(*button).await?,
                }
            }
            CanonicalAction::DragMouse {
                path,
                button,
                hold_keys,
            } => {
                let Some((start, rest)) = path.split_first() else {
                    return Err(SynthesisError::Invalid("drag_mouse requires a non-empty path"));
                };
                let held = resolve_keys(hold_keys)?;
                self.with_held_keys(&held, self.drag(*start, rest, *button))
                    .await?;
            }
            CanonicalAction::Scroll {
                at,
                direction,
                count,
                hold_keys,
            } => {
                let held = resolve_keys(hold_keys)?;
                self.with_held_keys(&held, async {
                    self.move_if_requested(*at).await?;
                    self.desktop.scroll(*direction, (*count).max(1)).await?;
                    Ok::<(), SynthesisError>(())
                })
                .await?;
            }
            CanonicalAction::TypeKeys { keys, delay_ms } => {
                let resolved = resolve_keys(keys)?;
                if resolved.is_empty() {
                    return Ok(Payload::None);
                }
                self.with_held_keys(&resolved, async {
                    if let Some(delay) = delay_ms.filter(|d| *d > 0) {
                        sleep(Duration::from_millis(delay)).await;
                    }
                    Ok::<(), SynthesisError>(())
                })
                .await?;
            }
            CanonicalAction::PressKeys { keys, phase } => {
                let resolved = resolve_keys(keys)?;
                if !resolved.is_empty() {
                    match phase {
                        Phase::Down => self.desktop.press_keys(&resolved).await?,
                        Phase::Up => self.release_reversed(&resolved).await?,
                    }
                }
            }
            CanonicalAction::TypeText { text, delay_ms } => {
                let strokes = text_to_keystrokes(text)?;
                let delay = delay_ms.unwrap_or(self.settings.type_delay_ms);
                self.type_strokes(&strokes, delay).await?;
            }
            CanonicalAction::PasteText { text } => {
                self.desktop.set_clipboard(text).await?;
                sleep(Duration::from_millis(self.settings.clipboard_settle_ms)).await;
                let shortcut = [CONTROL, keymap::resolve("v")?];
                self.tap(&shortcut).await?;
            }
            CanonicalAction::Wait { duration_ms } => {
                sleep(Duration::from_millis(*duration_ms)).await;
            }
            CanonicalAction::LaunchApplication { name } => {
                self.desktop.launch(name).await?;
            }
            CanonicalAction::ReadFile { path } => {
                let file = self.files.read(path).await?;
                return Ok(Payload::File {
                    data: file.data,
                    name: file.name,
                    size: file.size,
                    media_type: file.media_type,
                });
            }
            CanonicalAction::WriteFile { path, data } => {
                self.files.write(path, data).await?;
            }
            CanonicalAction::Screenshot => {
                let frame = self.desktop.capture_frame().await?;
                return Ok(Payload::Image {
                    bytes: frame.bytes,
                    media_type: frame.media_type.to_string(),
                });
            }
            CanonicalAction::CursorPosition => {
                return Ok(Payload::Cursor(self.desktop.cursor().await?));
            }
        }
        Ok(Payload::None)
    }

    async fn move_if_requested(&self, at: Option<Point>) -> Result<(), SynthesisError> {
        if let Some(point) = at {
            self.desktop.set_cursor(point).await?;
        }
        Ok(())
    }

    async fn drag(
        &self,
        start: Point,
        rest: &[Point],
        button: MouseButton,
    ) -> Result<(), SynthesisError> {
        self.desktop.set_cursor(start).await?;
        self.desktop.press_button(button).await?;
        let mut moved = Ok(());
        for point in rest {
            if let Err(err) = self.desktop.set_cursor(*point).await {
                moved = Err(err);
                break;
            }
        }
        let released = self.desktop.release_button(button).await;
        moved?;
        released?;
        Ok(())
    }

    /// Presses `held`, runs `body`, then releases `held` in reverse order
    /// whether or not `body` succeeded.
    async fn with_held_keys<F>(&self, held: &[PlatformKey], body: F) -> Result<(), SynthesisError>
    where
        F: Future<Output = Result<(), SynthesisError>>,
    {
        if held.is_empty() {
            return body.await;
        }
        self.desktop.press_keys(held).await?;
        let outcome = body.await;
        let released = self.release_reversed(held).await;
        outcome?;
        released?;
        Ok(())
    }

    /// Presses and releases `keys` as one chord.
    async fn tap(&self, keys: &[PlatformKey]) -> Result<(), SynthesisError> {
        self.with_held_keys(keys, async { Ok::<(), SynthesisError>(()) })
            .await
    }

    async fn release_reversed(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError> {
        let reversed: Vec<PlatformKey> = keys.iter().rev().copied().collect();
        self.desktop.release_keys(&reversed).await
    }

    /// One press/release pair per keystroke, strictly sequential.
    async fn type_strokes(
        &self,
        strokes: &[CharacterKeystroke],
        delay_ms: u64,
    ) -> Result<(), SynthesisError> {
        for (index, stroke) in strokes.iter().enumerate() {
            if stroke.with_shift {
                self.tap(&[SHIFT, stroke.key]).await?;
            } else {
                self.tap(&[stroke.key]).await?;
            }
            if delay_ms > 0 && index + 1 < strokes.len() {
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
        Ok(())
    }
}

fn resolve_keys(names: &[String]) -> Result<Vec<PlatformKey>, KeyResolutionError> {
    keymap::key_table().resolve_all(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_errors_keep_the_underlying_message() {
        let err: SynthesisError = KeyResolutionError {
            name: "bogus".into(),
        }
        .into();
        assert_eq!(err.to_string(), "unknown key name 'bogus'");

        let err: SynthesisError = CharacterMappingError { ch: 'é' }.into();
        assert!(err.to_string().contains("'é'"));
    }

    #[test]
    fn hold_keys_resolve_atomically() {
        assert_eq!(resolve_keys(&["ctrl".into(), "shift".into()]).unwrap().len(), 2);
        assert!(resolve_keys(&["ctrl".into(), "nope".into()]).is_err());
    }
}

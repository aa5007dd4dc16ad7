#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deskit_common::{MouseButton, Point, ScrollDirection};
use deskitd::capability::{CapabilityError, DesktopCapability, LocalFiles};
use deskitd::config::SynthesisSettings;
use deskitd::keymap::PlatformKey;
use deskitd::screenshot::Frame;
use deskitd::Synthesizer;
use tokio::time::Instant;

pub const FRAME: &[u8] = b"\x89PNG-test-frame";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetCursor(Point),
    Cursor,
    Press(Vec<&'static str>),
    Release(Vec<&'static str>),
    Click(MouseButton, u32),
    PressButton(MouseButton),
    ReleaseButton(MouseButton),
    Scroll(ScrollDirection, u32),
    Capture,
    Clipboard(String),
    Launch(String),
}

/// Desktop that records every primitive and fails the ones it is told to.
#[derive(Default)]
pub struct RecordingDesktop {
    calls: Mutex<Vec<(Instant, Call)>>,
    failing: Mutex<HashMap<&'static str, usize>>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl RecordingDesktop {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, operation: &'static str) {
        self.fail_after(operation, 0);
    }

    /// Lets `successes` calls of `operation` through, then fails every later one.
    pub fn fail_after(&self, operation: &'static str, successes: usize) {
        self.failing.lock().unwrap().insert(operation, successes);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push((Instant::now(), call));
        let seen = {
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(operation).or_insert(0);
            *count += 1;
            *count - 1
        };
        let allowed = self.failing.lock().unwrap().get(operation).copied();
        if allowed.is_some_and(|allowed| seen >= allowed) {
            return Err(CapabilityError::command_failed(
                operation,
                Some(1),
                "injected failure",
            ));
        }
        Ok(())
    }
}

fn names(keys: &[PlatformKey]) -> Vec<&'static str> {
    keys.iter().map(PlatformKey::keysym).collect()
}

#[async_trait]
impl DesktopCapability for RecordingDesktop {
    async fn set_cursor(&self, at: Point) -> Result<(), CapabilityError> {
        self.record("set_cursor", Call::SetCursor(at))
    }

    async fn cursor(&self) -> Result<Point, CapabilityError> {
        self.record("cursor", Call::Cursor)?;
        Ok(Point::new(640, 360))
    }

    async fn press_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError> {
        self.record("press_keys", Call::Press(names(keys)))
    }

    async fn release_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError> {
        self.record("release_keys", Call::Release(names(keys)))
    }

    async fn click(&self, button: MouseButton, count: u32) -> Result<(), CapabilityError> {
        self.record("click", Call::Click(button, count))
    }

    async fn press_button(&self, button: MouseButton) -> Result<(), CapabilityError> {
        self.record("press_button", Call::PressButton(button))
    }

    async fn release_button(&self, button: MouseButton) -> Result<(), CapabilityError> {
        self.record("release_button", Call::ReleaseButton(button))
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        count: u32,
    ) -> Result<(), CapabilityError> {
        self.record("scroll", Call::Scroll(direction, count))
    }

    async fn capture_frame(&self) -> Result<Frame, CapabilityError> {
        self.record("capture", Call::Capture)?;
        Ok(Frame {
            bytes: FRAME.to_vec(),
            media_type: "image/png",
        })
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), CapabilityError> {
        self.record("clipboard", Call::Clipboard(text.to_string()))
    }

    async fn launch(&self, name: &str) -> Result<(), CapabilityError> {
        self.record("launch", Call::Launch(name.to_string()))
    }
}

pub fn synthesizer(
    desktop: Arc<RecordingDesktop>,
    files_root: Option<&std::path::Path>,
) -> Synthesizer {
    Synthesizer::new(
        desktop,
        Arc::new(LocalFiles::new(files_root.map(|p| p.to_path_buf()))),
        SynthesisSettings {
            type_delay_ms: 0,
            ..SynthesisSettings::default()
        },
    )
}

/// Paused-clock timers may land up to a tick late.
pub fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(2),
        "expected ~{expected:?}, got {actual:?}"
    );
}

//! Canonical action vocabulary shared by the daemon and its clients.
//!
//! One [`CanonicalAction`] describes one device operation. On the wire it is a
//! JSON object tagged by `action` (snake_case variant name) with camelCase
//! fields, e.g. `{"action":"click_mouse","at":{"x":10,"y":20},"button":"left","holdKeys":[],"count":1}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix used when an action is exposed as an LLM tool (`computer_click_mouse`).
pub const TOOL_PREFIX: &str = "computer_";

/// Screen position in pixels. No bound is enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// Whether a press-style action pushes down or lets go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

/// A single platform-neutral device operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CanonicalAction {
    MoveMouse {
        to: Point,
    },
    TraceMouse {
        path: Vec<Point>,
        #[serde(default)]
        hold_keys: Vec<String>,
    },
    ClickMouse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<Point>,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        hold_keys: Vec<String>,
        #[serde(default = "default_count")]
        count: u32,
    },
    PressMouse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<Point>,
        #[serde(default)]
        button: MouseButton,
        phase: Phase,
    },
    DragMouse {
        path: Vec<Point>,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        hold_keys: Vec<String>,
    },
    Scroll {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<Point>,
        direction: ScrollDirection,
        #[serde(default = "default_count")]
        count: u32,
        #[serde(default)]
        hold_keys: Vec<String>,
    },
    TypeKeys {
        keys: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },
    PressKeys {
        keys: Vec<String>,
        phase: Phase,
    },
    TypeText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },
    PasteText {
        text: String,
    },
    Wait {
        duration_ms: u64,
    },
    LaunchApplication {
        name: String,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        #[serde(with = "crate::base64_bytes")]
        data: Vec<u8>,
    },
    Screenshot,
    CursorPosition,
}

fn default_count() -> u32 {
    1
}

impl CanonicalAction {
    /// Wire tag of the active variant.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalAction::MoveMouse { .. } => "move_mouse",
            CanonicalAction::TraceMouse { .. } => "trace_mouse",
            CanonicalAction::ClickMouse { .. } => "click_mouse",
            CanonicalAction::PressMouse { .. } => "press_mouse",
            CanonicalAction::DragMouse { .. } => "drag_mouse",
            CanonicalAction::Scroll { .. } => "scroll",
            CanonicalAction::TypeKeys { .. } => "type_keys",
            CanonicalAction::PressKeys { .. } => "press_keys",
            CanonicalAction::TypeText { .. } => "type_text",
            CanonicalAction::PasteText { .. } => "paste_text",
            CanonicalAction::Wait { .. } => "wait",
            CanonicalAction::LaunchApplication { .. } => "launch_application",
            CanonicalAction::ReadFile { .. } => "read_file",
            CanonicalAction::WriteFile { .. } => "write_file",
            CanonicalAction::Screenshot => "screenshot",
            CanonicalAction::CursorPosition => "cursor_position",
        }
    }

    /// Tool name under which the action is exposed to a model.
    pub fn tool_name(&self) -> String {
        format!("{TOOL_PREFIX}{}", self.name())
    }

    /// Observation-only actions leave the desktop untouched.
    pub fn is_observation(&self) -> bool {
        matches!(
            self,
            CanonicalAction::Screenshot
                | CanonicalAction::CursorPosition
                | CanonicalAction::ReadFile { .. }
        )
    }

    /// Variant fields as a JSON object, without the `action` tag.
    pub fn tool_input(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("action");
        }
        value
    }

    /// Rebuilds an action from a tool call (`computer_<tag>` + input object).
    pub fn from_tool_use(name: &str, input: &Value) -> Result<Self, serde_json::Error> {
        let tag = name.strip_prefix(TOOL_PREFIX).unwrap_or(name);
        let mut object = match input {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                return serde_json::from_value(other.clone());
            }
        };
        object.insert("action".into(), Value::String(tag.to_string()));
        serde_json::from_value(Value::Object(object))
    }
}

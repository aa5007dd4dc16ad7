//! Capture Event Normalizer.
//!
//! Observed input arrives as loosely-typed JSON. Every field goes through one
//! of the extract-or-default readers below so that a malformed event degrades
//! to a best-effort action instead of an error.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::action::{CanonicalAction, Point};
use crate::error::CaptureNormalizationError;

/// Variants the daemon emits on its push channel.
pub const CAPTURED_ACTIONS: [&str; 7] = [
    "click_mouse",
    "drag_mouse",
    "press_mouse",
    "type_keys",
    "press_keys",
    "type_text",
    "scroll",
];

/// Variants the daemon pairs with a screenshot of the moment they happened.
///
/// When the frame capture fails the daemon still publishes these as bare
/// `action` events, so subscribers must accept a bare `click_mouse` too
/// even though clicks normally arrive paired.
pub const SCREENSHOT_PAIRED: [&str; 2] = ["click_mouse", "drag_mouse"];

pub fn action_name(value: &Value) -> Option<&str> {
    str_field(value, "action")
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

pub fn string_or(value: &Value, key: &str, default: &str) -> String {
    str_field(value, key).unwrap_or(default).to_string()
}

/// Non-negative integer field; fractional numbers are truncated.
pub fn opt_u64(value: &Value, key: &str) -> Option<u64> {
    let field = value.get(key)?;
    field.as_u64().or_else(|| {
        field
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

pub fn u32_or(value: &Value, key: &str, default: u32) -> u32 {
    opt_u64(value, key)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

/// `{x, y}` object; anything else is treated as absent.
pub fn point(value: &Value) -> Option<Point> {
    let coord = |key: &str| -> Option<i32> {
        let field = value.get(key)?;
        field
            .as_i64()
            .or_else(|| field.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .and_then(|v| i32::try_from(v).ok())
    };
    Some(Point::new(coord("x")?, coord("y")?))
}

pub fn point_field(value: &Value, key: &str) -> Option<Point> {
    value.get(key).and_then(point)
}

/// Array of points; non-arrays become empty and invalid entries are skipped.
pub fn points(value: &Value, key: &str) -> Vec<Point> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(point).collect())
        .unwrap_or_default()
}

/// Array of strings; non-arrays become empty and non-string entries are skipped.
pub fn strings(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// String-encoded enum field (`"left"`, `"down"`, ...) or `default`.
pub fn enum_or<T: DeserializeOwned>(value: &Value, key: &str, default: T) -> T {
    match value.get(key) {
        Some(field @ Value::String(_)) => serde_json::from_value(field.clone()).unwrap_or(default),
        _ => default,
    }
}

/// Rebuilds the canonical action described by a captured payload.
pub fn normalize_action(value: &Value) -> Result<CanonicalAction, CaptureNormalizationError> {
    if !value.is_object() {
        return Err(CaptureNormalizationError::NotAnObject);
    }
    let name = action_name(value).ok_or(CaptureNormalizationError::MissingActionName)?;

    let action = match name {
        "click_mouse" => CanonicalAction::ClickMouse {
            at: point_field(value, "at"),
            button: enum_or(value, "button", Default::default()),
            hold_keys: strings(value, "holdKeys"),
            count: u32_or(value, "count", 1),
        },
        "drag_mouse" => CanonicalAction::DragMouse {
            path: points(value, "path"),
            button: enum_or(value, "button", Default::default()),
            hold_keys: strings(value, "holdKeys"),
        },
        "press_mouse" => CanonicalAction::PressMouse {
            at: point_field(value, "at"),
            button: enum_or(value, "button", Default::default()),
            phase: enum_or(value, "phase", Default::default()),
        },
        "type_keys" => CanonicalAction::TypeKeys {
            keys: strings(value, "keys"),
            delay_ms: opt_u64(value, "delayMs"),
        },
        "press_keys" => CanonicalAction::PressKeys {
            keys: strings(value, "keys"),
            phase: enum_or(value, "phase", Default::default()),
        },
        "type_text" => CanonicalAction::TypeText {
            text: string_or(value, "text", ""),
            delay_ms: opt_u64(value, "delayMs"),
        },
        "scroll" => CanonicalAction::Scroll {
            at: point_field(value, "at"),
            direction: enum_or(value, "direction", Default::default()),
            count: u32_or(value, "count", 1),
            hold_keys: strings(value, "holdKeys"),
        },
        other => return Err(CaptureNormalizationError::UnsupportedAction(other.to_string())),
    };
    Ok(action)
}

//! Outcome of one executed action and its wire encoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Map, Value};

use crate::action::Point;

pub const PNG_MEDIA_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Image {
        bytes: Vec<u8>,
        media_type: String,
    },
    Cursor(Point),
    File {
        data: Vec<u8>,
        name: String,
        size: u64,
        media_type: String,
    },
}

/// Created fresh for every executed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Ok(Payload),
    Err { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ResultDecodeError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("field '{0}' is not valid base64")]
    InvalidBase64(&'static str),
    #[error("field '{0}' has an unexpected type")]
    InvalidField(&'static str),
}

impl ActionResult {
    pub fn ok() -> Self {
        ActionResult::Ok(Payload::None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ActionResult::Err {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ActionResult::Ok(_))
    }

    /// Encodes the result as the `RESULT` frame payload.
    pub fn to_wire(&self) -> Value {
        match self {
            ActionResult::Err { message } => json!({ "success": false, "message": message }),
            ActionResult::Ok(Payload::None) => json!({ "success": true }),
            ActionResult::Ok(Payload::Image { bytes, media_type }) => json!({
                "success": true,
                "image": BASE64.encode(bytes),
                "mediaType": media_type,
            }),
            ActionResult::Ok(Payload::Cursor(point)) => json!({
                "success": true,
                "x": point.x,
                "y": point.y,
            }),
            ActionResult::Ok(Payload::File {
                data,
                name,
                size,
                media_type,
            }) => json!({
                "success": true,
                "data": BASE64.encode(data),
                "name": name,
                "size": size,
                "mediaType": media_type,
            }),
        }
    }

    /// Decodes a `RESULT` payload. A missing `success` flag counts as success
    /// so bare `{image}` / `{x, y}` replies are accepted.
    pub fn from_wire(value: &Value) -> Result<Self, ResultDecodeError> {
        let object = value.as_object().ok_or(ResultDecodeError::NotAnObject)?;

        let success = match object.get("success") {
            None => true,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => return Err(ResultDecodeError::InvalidField("success")),
        };
        if !success {
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("daemon reported failure without a message");
            return Ok(ActionResult::error(message));
        }

        if let Some(image) = object.get("image") {
            let bytes = decode_base64(image, "image")?;
            let media_type = str_or(object, "mediaType", PNG_MEDIA_TYPE);
            return Ok(ActionResult::Ok(Payload::Image { bytes, media_type }));
        }

        if let (Some(x), Some(y)) = (object.get("x"), object.get("y")) {
            let x = as_i32(x).ok_or(ResultDecodeError::InvalidField("x"))?;
            let y = as_i32(y).ok_or(ResultDecodeError::InvalidField("y"))?;
            return Ok(ActionResult::Ok(Payload::Cursor(Point::new(x, y))));
        }

        if let Some(data) = object.get("data") {
            let data = decode_base64(data, "data")?;
            let size = object
                .get("size")
                .and_then(Value::as_u64)
                .unwrap_or(data.len() as u64);
            return Ok(ActionResult::Ok(Payload::File {
                name: str_or(object, "name", "file"),
                media_type: str_or(object, "mediaType", "application/octet-stream"),
                size,
                data,
            }));
        }

        Ok(ActionResult::ok())
    }
}

fn decode_base64(value: &Value, field: &'static str) -> Result<Vec<u8>, ResultDecodeError> {
    let raw = value
        .as_str()
        .ok_or(ResultDecodeError::InvalidField(field))?;
    BASE64
        .decode(raw.as_bytes())
        .map_err(|_| ResultDecodeError::InvalidBase64(field))
}

fn str_or(object: &Map<String, Value>, key: &str, default: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn as_i32(value: &Value) -> Option<i32> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .and_then(|v| i32::try_from(v).ok())
}

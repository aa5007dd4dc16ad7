// # -----------------------------
// # crates/common/src/lib.rs
// # -----------------------------
pub mod action;
pub mod blocks;
pub mod error;
pub mod normalize;
pub mod result;
pub mod wire;

pub use action::{CanonicalAction, MouseButton, Phase, Point, ScrollDirection};
pub use blocks::{ConversationBlock, MediaSource, Role};
pub use error::CaptureNormalizationError;
pub use result::{ActionResult, Payload, ResultDecodeError};
pub use wire::{Msg, PushEvent};

/// Serde adapter storing byte buffers as base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BASE64
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

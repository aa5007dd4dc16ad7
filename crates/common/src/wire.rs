//! Signed line-delimited JSON envelope spoken on the daemon socket.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[cfg(unix)]
pub const DEFAULT_SOCK: &str = "/tmp/deskitd.sock";
#[cfg(not(unix))]
pub const DEFAULT_SOCK: &str = "127.0.0.1:60461";
pub const DEFAULT_SECRET: &str = "change-me-in-production";
pub const DAEMON_IDENT: &str = "deskitd";

pub const MSG_ACTION: &str = "ACTION";
pub const MSG_RESULT: &str = "RESULT";
pub const MSG_SUBSCRIBE: &str = "SUBSCRIBE";
pub const MSG_EVENT: &str = "EVENT";
pub const MSG_CAPTURE: &str = "CAPTURE";
pub const MSG_STATUS: &str = "STATUS";
pub const MSG_STATUS_RESPONSE: &str = "STATUS_RESPONSE";
pub const MSG_ACK: &str = "ACK";
pub const MSG_ERR: &str = "ERR";

pub const EVENT_ACTION: &str = "action";
pub const EVENT_SCREENSHOT_AND_ACTION: &str = "screenshotAndAction";

const LOG_SNIPPET_LIMIT: usize = 512;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Msg {
    pub msg_type: String,
    pub msg_id: String,
    pub from: String,
    pub to: String,
    pub ts: u64,
    pub nonce: String,
    pub hmac: String,
    pub payload: Value,
}

impl Msg {
    /// Unsigned reply addressed to the sender of `self`.
    pub fn reply(&self, msg_type: &str, payload: Value) -> Msg {
        Msg {
            msg_type: msg_type.to_string(),
            msg_id: Uuid::new_v4().to_string(),
            from: DAEMON_IDENT.to_string(),
            to: self.from.clone(),
            ts: now_ts(),
            nonce: Uuid::new_v4().to_string(),
            hmac: String::new(),
            payload,
        }
    }

    pub fn error_reply(&self, code: &str, message: &str) -> Msg {
        self.reply(
            MSG_ERR,
            serde_json::json!({
                "code": code,
                "message": message,
            }),
        )
    }

    /// `message` field of an `ERR` payload, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}

/// One frame of the daemon's push channel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PushEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Builds and signs a new message.
pub fn new_msg(typ: &str, from: &str, to: &str, payload: Value, secret: &str) -> Result<Msg> {
    let mut msg = Msg {
        msg_type: typ.to_string(),
        msg_id: Uuid::new_v4().to_string(),
        from: from.to_string(),
        to: to.to_string(),
        ts: now_ts(),
        nonce: Uuid::new_v4().to_string(),
        hmac: String::new(),
        payload,
    };
    msg.sign(secret)?;
    Ok(msg)
}

/// Result of checking a frame's `hmac`, with what a rejection log needs.
#[derive(Debug, Clone)]
pub struct SignatureCheck {
    pub valid: bool,
    pub expected: String,
    pub signed_text: String,
}

impl Msg {
    /// `type|id|from|to|ts|nonce|payload`, payload as compact JSON.
    pub fn signed_text(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.msg_type, self.msg_id, self.from, self.to, self.ts, self.nonce, self.payload
        )
    }

    pub fn sign(&mut self, secret: &str) -> Result<()> {
        let mac = keyed_mac(secret, &self.signed_text())?;
        self.hmac = BASE64.encode(mac.finalize().into_bytes());
        Ok(())
    }

    /// Recomputes the signature once and compares it in constant time.
    pub fn check_signature(&self, secret: &str) -> Result<SignatureCheck> {
        let signed_text = self.signed_text();
        let mac = keyed_mac(secret, &signed_text)?;
        let expected = BASE64.encode(mac.clone().finalize().into_bytes());
        let valid = match BASE64.decode(self.hmac.as_bytes()) {
            Ok(provided) => mac.verify_slice(&provided).is_ok(),
            Err(_) => false,
        };
        Ok(SignatureCheck {
            valid,
            expected,
            signed_text,
        })
    }
}

pub fn verify_hmac(msg: &Msg, secret: &str) -> Result<bool> {
    Ok(msg.check_signature(secret)?.valid)
}

fn keyed_mac(secret: &str, text: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(text.as_bytes());
    Ok(mac)
}

/// Serialized frame including the trailing newline.
pub fn encode_line(msg: &Msg) -> Result<String> {
    Ok(serde_json::to_string(msg)? + "\n")
}

pub fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn shorten_sig(sig: &str) -> String {
    sig.chars().take(12).collect()
}

pub fn summarize_body(body: &str) -> String {
    let total_chars = body.chars().count();
    if total_chars <= LOG_SNIPPET_LIMIT {
        body.to_string()
    } else {
        let snippet: String = body.chars().take(LOG_SNIPPET_LIMIT).collect();
        format!(
            "{} (truncated {} chars)",
            snippet,
            total_chars - LOG_SNIPPET_LIMIT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signed_message_verifies() -> Result<()> {
        let msg = new_msg(
            MSG_ACTION,
            "client:test",
            DAEMON_IDENT,
            json!({"action": "screenshot"}),
            "s3cret",
        )?;
        assert!(verify_hmac(&msg, "s3cret")?);
        assert!(!verify_hmac(&msg, "other")?);
        Ok(())
    }

    #[test]
    fn tampered_payload_fails_verification() -> Result<()> {
        let mut msg = new_msg(
            MSG_ACTION,
            "client:test",
            DAEMON_IDENT,
            json!({"action": "wait", "durationMs": 10}),
            "s3cret",
        )?;
        msg.payload = json!({"action": "wait", "durationMs": 10000});
        let check = msg.check_signature("s3cret")?;
        assert!(!check.valid);
        assert_ne!(check.expected, msg.hmac);
        assert!(check.signed_text.ends_with(r#"|{"action":"wait","durationMs":10000}"#));
        Ok(())
    }

    #[test]
    fn resigning_restores_validity() -> Result<()> {
        let mut msg = new_msg(MSG_STATUS, "client:test", DAEMON_IDENT, json!({}), "s3cret")?;
        msg.hmac = "not base64!".into();
        assert!(!msg.check_signature("s3cret")?.valid);

        msg.sign("s3cret")?;
        let check = msg.check_signature("s3cret")?;
        assert!(check.valid);
        assert_eq!(check.expected, msg.hmac);
        Ok(())
    }

    #[test]
    fn reply_targets_sender() {
        let msg = Msg {
            msg_type: MSG_STATUS.into(),
            msg_id: "1".into(),
            from: "client:a".into(),
            to: DAEMON_IDENT.into(),
            ts: 0,
            nonce: "n".into(),
            hmac: String::new(),
            payload: json!({}),
        };
        let reply = msg.error_reply("E_TEST", "nope");
        assert_eq!(reply.to, "client:a");
        assert_eq!(reply.msg_type, MSG_ERR);
        assert_eq!(reply.error_message(), Some("nope"));
    }

    #[test]
    fn summarize_truncates_long_bodies() {
        let body = "x".repeat(LOG_SNIPPET_LIMIT + 10);
        assert!(summarize_body(&body).ends_with("(truncated 10 chars)"));
        assert_eq!(shorten_sig("abcdefghijklmnop"), "abcdefghijkl");
    }
}

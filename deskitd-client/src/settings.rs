//! Client settings resolved from the environment.

use std::env;
use std::time::Duration;

use tracing::warn;

use deskit_common::wire::{DEFAULT_SECRET, DEFAULT_SOCK};

pub const DEFAULT_IDENT: &str = "client:orchestrator";
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(750);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub sock_path: String,
    pub secret: String,
    pub ident: String,
    /// Pause between a mutating action and the follow-up screenshot.
    pub settle_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            sock_path: DEFAULT_SOCK.to_string(),
            secret: DEFAULT_SECRET.to_string(),
            ident: DEFAULT_IDENT.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientSettings {
    /// Reads `DESKIT_SOCK`, `DESKIT_SECRET`, `DESKIT_IDENT`,
    /// `DESKIT_SETTLE_DELAY_MS` and `DESKIT_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let settle_delay = parse_number(&lookup, "DESKIT_SETTLE_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle_delay);
        let request_timeout = parse_number(&lookup, "DESKIT_REQUEST_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Self {
            sock_path: lookup("DESKIT_SOCK").unwrap_or(defaults.sock_path),
            secret: lookup("DESKIT_SECRET").unwrap_or(defaults.secret),
            ident: lookup("DESKIT_IDENT").unwrap_or(defaults.ident),
            settle_delay,
            request_timeout,
        }
    }
}

fn parse_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Ignoring {}={:?}: {}", key, raw, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ClientSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings(&[]), ClientSettings::default());
        assert_eq!(ClientSettings::default().settle_delay, Duration::from_millis(750));
    }

    #[test]
    fn overrides_are_applied() {
        let parsed = settings(&[
            ("DESKIT_SOCK", "/run/user/1000/deskitd.sock"),
            ("DESKIT_SECRET", "s3cret"),
            ("DESKIT_IDENT", "client:test"),
            ("DESKIT_SETTLE_DELAY_MS", "0"),
            ("DESKIT_REQUEST_TIMEOUT_SECS", "30"),
        ]);
        assert_eq!(parsed.sock_path, "/run/user/1000/deskitd.sock");
        assert_eq!(parsed.secret, "s3cret");
        assert_eq!(parsed.ident, "client:test");
        assert_eq!(parsed.settle_delay, Duration::ZERO);
        assert_eq!(parsed.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let parsed = settings(&[
            ("DESKIT_SETTLE_DELAY_MS", "soon"),
            ("DESKIT_REQUEST_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(parsed.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(parsed.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}

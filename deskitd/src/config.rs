//! Daemon settings loaded from `deskit.toml`.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::screenshot::ScreenshotBackend;

pub const DEFAULT_CONFIG_FILE: &str = "deskit.toml";
const DEFAULT_TYPE_DELAY_MS: u64 = 12;
const DEFAULT_CLIPBOARD_SETTLE_MS: u64 = 100;
const DEFAULT_CAPTURE_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisSettings {
    pub xdotool: String,
    pub clipboard: String,
    /// Gap between characters of a `type_text` call without an explicit delay.
    pub type_delay_ms: u64,
    pub clipboard_settle_ms: u64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            xdotool: "xdotool".to_string(),
            clipboard: "xclip".to_string(),
            type_delay_ms: DEFAULT_TYPE_DELAY_MS,
            clipboard_settle_ms: DEFAULT_CLIPBOARD_SETTLE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub buffer: usize,
    pub input_hook: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_CAPTURE_BUFFER,
            input_hook: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub synthesis: SynthesisSettings,
    pub screenshot_backend: ScreenshotBackend,
    pub files_root: Option<PathBuf>,
    pub applications: HashMap<String, String>,
    pub capture: CaptureSettings,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            synthesis: SynthesisSettings::default(),
            screenshot_backend: ScreenshotBackend::default(),
            files_root: None,
            applications: default_applications(),
            capture: CaptureSettings::default(),
        }
    }
}

pub fn default_applications() -> HashMap<String, String> {
    [
        ("firefox", "firefox"),
        ("terminal", "x-terminal-emulator"),
        ("vscode", "code"),
        ("thunderbird", "thunderbird"),
        ("files", "xdg-open ~"),
    ]
    .into_iter()
    .map(|(name, cmd)| (name.to_string(), cmd.to_string()))
    .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    synthesis: Option<SynthesisSection>,
    #[serde(default)]
    screenshot: Option<ScreenshotSection>,
    #[serde(default)]
    files: Option<FilesSection>,
    #[serde(default)]
    applications: HashMap<String, String>,
    #[serde(default)]
    capture: Option<CaptureSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SynthesisSection {
    xdotool: Option<String>,
    clipboard: Option<String>,
    type_delay_ms: Option<u64>,
    clipboard_settle_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ScreenshotSection {
    backend: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilesSection {
    root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptureSection {
    buffer: Option<usize>,
    input_hook: Option<String>,
}

/// Reads the config file, if any, and applies environment overrides.
///
/// A missing, unreadable or malformed file is logged and treated as empty.
pub fn load_daemon_settings(config_path: Option<&Path>) -> DaemonSettings {
    let mut settings = match config_path {
        Some(path) => read_settings_file(path),
        None => DaemonSettings::default(),
    };

    if let Ok(binary) = env::var("DESKIT_XDOTOOL_PATH") {
        let binary = binary.trim();
        if !binary.is_empty() {
            settings.synthesis.xdotool = binary.to_string();
        }
    }

    settings
}

fn read_settings_file(path: &Path) -> DaemonSettings {
    let contents = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(err) => {
            warn!("Failed to read config file {}: {}", path.display(), err);
            return DaemonSettings::default();
        }
    };

    match parse_settings(&contents, path.parent()) {
        Ok(settings) => {
            info!(
                applications = settings.applications.len(),
                backend = ?settings.screenshot_backend,
                "Loaded daemon settings from {}",
                path.display()
            );
            settings
        }
        Err(err) => {
            warn!("Failed to parse {}: {}", path.display(), err);
            DaemonSettings::default()
        }
    }
}

/// Relative paths in the file resolve against `base_dir`.
pub fn parse_settings(
    contents: &str,
    base_dir: Option<&Path>,
) -> Result<DaemonSettings, toml::de::Error> {
    let parsed: ConfigFile = toml::from_str(contents)?;
    let mut settings = DaemonSettings::default();

    if let Some(section) = parsed.synthesis {
        if let Some(binary) = non_empty(section.xdotool) {
            settings.synthesis.xdotool = binary;
        }
        if let Some(binary) = non_empty(section.clipboard) {
            settings.synthesis.clipboard = binary;
        }
        if let Some(delay) = section.type_delay_ms {
            settings.synthesis.type_delay_ms = delay;
        }
        if let Some(settle) = section.clipboard_settle_ms {
            settings.synthesis.clipboard_settle_ms = settle;
        }
    }

    if let Some(backend) = parsed.screenshot.and_then(|s| s.backend) {
        settings.screenshot_backend = ScreenshotBackend::parse(&backend).unwrap_or_else(|| {
            warn!(
                "Unknown screenshot backend '{}', falling back to default",
                backend
            );
            ScreenshotBackend::default()
        });
    }

    settings.files_root = parsed
        .files
        .and_then(|f| non_empty(f.root))
        .map(|raw| resolve_path(base_dir, &raw));

    for (name, command) in parsed.applications {
        let command = command.trim();
        if command.is_empty() {
            warn!("Application '{}' has an empty command, skipped", name);
            continue;
        }
        settings
            .applications
            .insert(name.to_lowercase(), command.to_string());
    }

    if let Some(section) = parsed.capture {
        if let Some(buffer) = section.buffer {
            settings.capture.buffer = buffer.max(1);
        }
        settings.capture.input_hook = non_empty(section.input_hook);
    }

    Ok(settings)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_path(base_dir: Option<&Path>, raw: &str) -> PathBuf {
    let path = PathBuf::from(expand_home(raw));
    let resolved = match base_dir {
        Some(base) if path.is_relative() => base.join(&path),
        _ => path,
    };
    resolved.canonicalize().unwrap_or(resolved)
}

fn expand_home(raw: &str) -> String {
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return format!("{}/{}", home, stripped);
        }
    }
    raw.to_string()
}

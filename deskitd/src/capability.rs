//! OS capability interface and its xdotool-backed implementation.
//!
//! The synthesis engine only talks to [`DesktopCapability`] and
//! [`FileCapability`]; everything that shells out lives here.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use deskit_common::{MouseButton, Point, ScrollDirection};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::SynthesisSettings;
use crate::keymap::PlatformKey;
use crate::screenshot::{self, Frame, ScreenshotBackend};

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Desktop automation failed during {operation} ({status}{detail}). Hint: {hint}")]
    CommandFailed {
        operation: String,
        status: String,
        detail: String,
        hint: &'static str,
    },
    #[error("unexpected output from {operation}: {output}")]
    UnexpectedOutput { operation: String, output: String },
    #[error("screen capture failed: {0}")]
    Capture(String),
    #[error("unknown application '{0}'")]
    UnknownApplication(String),
    #[error("path '{0}' is outside the shared file root")]
    OutsideRoot(String),
    #[error("file operation on '{path}' failed: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl CapabilityError {
    /// Failure of a desktop command, with a hint for the common setup mistakes.
    pub fn command_failed(operation: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        let normalized = stderr.trim();
        let hint = if normalized.to_ascii_lowercase().contains("can't open display") {
            "Set DISPLAY/XAUTHORITY and use an X11/XWayland session so xdotool can drive the screen."
        } else {
            "Ensure xdotool and xclip are installed and callable from the daemon environment."
        };
        let status = exit_code
            .map(|code| format!("exit code {}", code))
            .unwrap_or_else(|| "signal".to_string());
        let detail = if normalized.is_empty() {
            String::new()
        } else {
            format!(": {normalized}")
        };
        CapabilityError::CommandFailed {
            operation: operation.to_string(),
            status,
            detail,
            hint,
        }
    }
}

#[async_trait]
pub trait DesktopCapability: Send + Sync {
    async fn set_cursor(&self, at: Point) -> Result<(), CapabilityError>;
    async fn cursor(&self) -> Result<Point, CapabilityError>;
    async fn press_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError>;
    async fn release_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError>;
    async fn click(&self, button: MouseButton, count: u32) -> Result<(), CapabilityError>;
    async fn press_button(&self, button: MouseButton) -> Result<(), CapabilityError>;
    async fn release_button(&self, button: MouseButton) -> Result<(), CapabilityError>;
    async fn scroll(&self, direction: ScrollDirection, count: u32)
        -> Result<(), CapabilityError>;
    async fn capture_frame(&self) -> Result<Frame, CapabilityError>;
    async fn set_clipboard(&self, text: &str) -> Result<(), CapabilityError>;
    async fn launch(&self, name: &str) -> Result<(), CapabilityError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub data: Vec<u8>,
    pub name: String,
    pub size: u64,
    pub media_type: String,
}

#[async_trait]
pub trait FileCapability: Send + Sync {
    async fn read(&self, path: &str) -> Result<FileContents, CapabilityError>;
    async fn write(&self, path: &str, data: &[u8]) -> Result<(), CapabilityError>;
}

pub fn button_code(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 1,
        MouseButton::Middle => 2,
        MouseButton::Right => 3,
    }
}

pub fn scroll_code(direction: ScrollDirection) -> u8 {
    match direction {
        ScrollDirection::Up => 4,
        ScrollDirection::Down => 5,
        ScrollDirection::Left => 6,
        ScrollDirection::Right => 7,
    }
}

/// X11 desktop driven through `xdotool` and `xclip`.
pub struct XdotoolDesktop {
    binary: String,
    clipboard: String,
    backend: ScreenshotBackend,
    applications: HashMap<String, String>,
}

impl XdotoolDesktop {
    pub fn new(
        settings: &SynthesisSettings,
        backend: ScreenshotBackend,
        applications: HashMap<String, String>,
    ) -> Self {
        Self {
            binary: settings.xdotool.clone(),
            clipboard: settings.clipboard.clone(),
            backend,
            applications,
        }
    }

    async fn run_xdotool(&self, operation: &str, args: &[String]) -> Result<String, CapabilityError> {
        debug!(
            target: "deskitd::xdotool",
            "xdotool{} {}",
            if self.binary == "xdotool" {
                String::new()
            } else {
                format!(" ({})", self.binary)
            },
            args.join(" ")
        );

        let output = Command::new(&self.binary)
            .kill_on_drop(true)
            .args(args)
            .output()
            .await
            .map_err(|source| CapabilityError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !stderr.is_empty() {
                debug!(target: "deskitd::xdotool", "xdotool stderr: {stderr}");
            }
            if !stdout.is_empty() {
                debug!(target: "deskitd::xdotool", "xdotool stdout: {stdout}");
            }
            return Err(CapabilityError::command_failed(
                operation,
                output.status.code(),
                &stderr,
            ));
        }

        Ok(stdout)
    }
}

fn key_args(verb: &str, keys: &[PlatformKey]) -> Vec<String> {
    let mut args = vec![verb.to_string()];
    args.extend(keys.iter().map(|k| k.keysym().to_string()));
    args
}

fn click_args(code: u8, count: u32) -> Vec<String> {
    let mut args = vec!["click".to_string()];
    if count > 1 {
        args.push("--repeat".to_string());
        args.push(count.to_string());
    }
    args.push(code.to_string());
    args
}

/// Parses `getmouselocation --shell` output (`X=..`, `Y=..` lines).
pub fn parse_mouse_location(output: &str) -> Option<Point> {
    let mut x = None;
    let mut y = None;
    for line in output.lines() {
        match line.trim().split_once('=') {
            Some(("X", value)) => x = value.trim().parse().ok(),
            Some(("Y", value)) => y = value.trim().parse().ok(),
            _ => {}
        }
    }
    Some(Point::new(x?, y?))
}

#[async_trait]
impl DesktopCapability for XdotoolDesktop {
    async fn set_cursor(&self, at: Point) -> Result<(), CapabilityError> {
        let args = vec![
            "mousemove".to_string(),
            "--sync".to_string(),
            at.x.to_string(),
            at.y.to_string(),
        ];
        self.run_xdotool("mousemove", &args).await.map(|_| ())
    }

    async fn cursor(&self) -> Result<Point, CapabilityError> {
        let args = vec!["getmouselocation".to_string(), "--shell".to_string()];
        let output = self.run_xdotool("getmouselocation", &args).await?;
        parse_mouse_location(&output).ok_or(CapabilityError::UnexpectedOutput {
            operation: "getmouselocation".to_string(),
            output,
        })
    }

    async fn press_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.run_xdotool("keydown", &key_args("keydown", keys))
            .await
            .map(|_| ())
    }

    async fn release_keys(&self, keys: &[PlatformKey]) -> Result<(), CapabilityError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.run_xdotool("keyup", &key_args("keyup", keys))
            .await
            .map(|_| ())
    }

    async fn click(&self, button: MouseButton, count: u32) -> Result<(), CapabilityError> {
        self.run_xdotool("click", &click_args(button_code(button), count))
            .await
            .map(|_| ())
    }

    async fn press_button(&self, button: MouseButton) -> Result<(), CapabilityError> {
        let args = vec!["mousedown".to_string(), button_code(button).to_string()];
        self.run_xdotool("mousedown", &args).await.map(|_| ())
    }

    async fn release_button(&self, button: MouseButton) -> Result<(), CapabilityError> {
        let args = vec!["mouseup".to_string(), button_code(button).to_string()];
        self.run_xdotool("mouseup", &args).await.map(|_| ())
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        count: u32,
    ) -> Result<(), CapabilityError> {
        self.run_xdotool("scroll", &click_args(scroll_code(direction), count))
            .await
            .map(|_| ())
    }

    async fn capture_frame(&self) -> Result<Frame, CapabilityError> {
        screenshot::capture_frame(self.backend)
            .await
            .map_err(|err| CapabilityError::Capture(format!("{err:#}")))
    }

    async fn set_clipboard(&self, text: &str) -> Result<(), CapabilityError> {
        debug!(
            target: "deskitd::xdotool",
            "{} -selection clipboard ({} chars)",
            self.clipboard,
            text.chars().count()
        );
        let spawn_err = |source| CapabilityError::Spawn {
            program: self.clipboard.clone(),
            source,
        };
        let mut child = Command::new(&self.clipboard)
            .args(["-selection", "clipboard"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await.map_err(spawn_err)?;
            stdin.shutdown().await.map_err(spawn_err)?;
        }

        let output = child.wait_with_output().await.map_err(spawn_err)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::command_failed(
                "clipboard",
                output.status.code(),
                &stderr,
            ));
        }
        Ok(())
    }

    async fn launch(&self, name: &str) -> Result<(), CapabilityError> {
        let command = self
            .applications
            .get(&name.trim().to_lowercase())
            .ok_or_else(|| CapabilityError::UnknownApplication(name.to_string()))?;

        info!(application = name, command = %command, "Launching application");
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CapabilityError::Spawn {
                program: command.clone(),
                source,
            })?;
        Ok(())
    }
}

/// Local filesystem, optionally confined to a root directory.
pub struct LocalFiles {
    root: Option<PathBuf>,
}

impl LocalFiles {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Lexically resolves `raw` and rejects anything that escapes the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, CapabilityError> {
        let requested = Path::new(raw);
        let Some(root) = &self.root else {
            return Ok(requested.to_path_buf());
        };

        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };
        let normalized = normalize_lexically(&joined)
            .ok_or_else(|| CapabilityError::OutsideRoot(raw.to_string()))?;
        if !normalized.starts_with(root) {
            return Err(CapabilityError::OutsideRoot(raw.to_string()));
        }
        Ok(normalized)
    }
}

fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "zip" => "application/zip",
        "txt" | "log" | "md" | "rs" | "toml" | "yaml" | "yml" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl FileCapability for LocalFiles {
    async fn read(&self, path: &str) -> Result<FileContents, CapabilityError> {
        let resolved = self.resolve(path)?;
        let data = fs::read(&resolved)
            .await
            .map_err(|source| CapabilityError::File {
                path: path.to_string(),
                source,
            })?;
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        Ok(FileContents {
            size: data.len() as u64,
            media_type: media_type_for(&resolved).to_string(),
            name,
            data,
        })
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), CapabilityError> {
        let resolved = self.resolve(path)?;
        let file_err = |source| CapabilityError::File {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(file_err)?;
        }
        fs::write(&resolved, data).await.map_err(file_err)?;
        debug!(path = %resolved.display(), bytes = data.len(), "Wrote file");
        Ok(())
    }
}

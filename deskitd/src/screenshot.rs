//! Frame capture backends.

use std::env;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use deskit_common::result::PNG_MEDIA_TYPE;
use screenshots::image::ImageFormat;
use screenshots::Screen;
use tokio::fs;
use tokio::process::Command as TokioCommand;
use tokio::task::spawn_blocking;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotBackend {
    Scrot,
    Imagemagick,
    Native,
}

impl Default for ScreenshotBackend {
    fn default() -> Self {
        #[cfg(windows)]
        {
            ScreenshotBackend::Native
        }
        #[cfg(not(windows))]
        {
            ScreenshotBackend::Scrot
        }
    }
}

impl ScreenshotBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "imagemagick" | "import" => Some(ScreenshotBackend::Imagemagick),
            "native" => Some(ScreenshotBackend::Native),
            "scrot" => Some(ScreenshotBackend::Scrot),
            _ => None,
        }
    }
}

/// One captured frame, PNG-encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
}

pub async fn capture_frame(backend: ScreenshotBackend) -> Result<Frame> {
    let bytes = match backend {
        ScreenshotBackend::Native => capture_native().await?,
        ScreenshotBackend::Scrot | ScreenshotBackend::Imagemagick => {
            capture_with_command(backend).await?
        }
    };
    debug!(?backend, bytes = bytes.len(), "Captured frame");
    Ok(Frame {
        bytes,
        media_type: PNG_MEDIA_TYPE,
    })
}

async fn capture_native() -> Result<Vec<u8>> {
    let bytes = spawn_blocking(move || -> Result<Vec<u8>> {
        let screens =
            Screen::all().map_err(|e| anyhow::anyhow!("Failed to enumerate screens: {e}"))?;
        let screen = screens
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No screens detected for screenshot"))?;

        let image = screen
            .capture()
            .map_err(|e| anyhow::anyhow!("Screen capture failed: {e}"))?;

        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .context("Failed to encode frame as PNG")?;
        Ok(buffer.into_inner())
    })
    .await?;

    bytes
}

async fn capture_with_command(backend: ScreenshotBackend) -> Result<Vec<u8>> {
    let path = scratch_path();
    let path_str = path.to_string_lossy().to_string();
    let mut command = match backend {
        ScreenshotBackend::Scrot => {
            let mut cmd = TokioCommand::new("scrot");
            cmd.args(["--overwrite", "--silent", &path_str]);
            cmd
        }
        _ => {
            let mut cmd = TokioCommand::new("import");
            cmd.args(["-window", "root", &path_str]);
            cmd
        }
    };

    debug!(?backend, path = %path.display(), "Running screenshot backend");
    let status = command
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("Failed to execute screenshot backend {:?}", backend))?;

    if !status.success() {
        anyhow::bail!(
            "Screenshot backend {:?} exited with status {}",
            backend,
            status
        );
    }

    let bytes = fs::read(&path)
        .await
        .with_context(|| format!("Screenshot captured but failed to read {}", path.display()));
    if let Err(err) = fs::remove_file(&path).await {
        debug!("Failed to remove scratch frame {}: {}", path.display(), err);
    }
    bytes
}

fn scratch_path() -> PathBuf {
    env::temp_dir().join(format!("deskitd-frame-{}.png", Uuid::new_v4()))
}

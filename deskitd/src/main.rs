//! deskit daemon entry point.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use deskit_common::wire::{DEFAULT_SECRET, DEFAULT_SOCK};
use deskitd::capability::{LocalFiles, XdotoolDesktop};
use deskitd::capture::{spawn_input_hook, CaptureHub};
use deskitd::config::{load_daemon_settings, DEFAULT_CONFIG_FILE};
use deskitd::server::{self, Daemon, DAEMON_VERSION};
use deskitd::synth::Synthesizer;
use deskitd::DesktopCapability;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "deskitd", version)]
#[command(about = "deskit desktop control daemon")]
struct Cli {
    /// Socket path (Unix) or TCP address (other platforms)
    #[arg(long, default_value = DEFAULT_SOCK)]
    socket: PathBuf,

    /// HMAC secret key (or use DESKIT_SECRET env var)
    #[arg(long)]
    secret: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to daemon configuration (deskit.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command whose stdout yields observed input, one JSON action per line
    #[arg(long)]
    input_hook: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let secret = cli
        .secret
        .or_else(|| env::var("DESKIT_SECRET").ok())
        .unwrap_or_else(|| DEFAULT_SECRET.to_string());

    if secret == DEFAULT_SECRET {
        warn!("Using default secret - change DESKIT_SECRET in production!");
    }

    let config_path = cli
        .config
        .clone()
        .or_else(|| env::var("DESKIT_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let candidate = env::current_dir().ok()?.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        });

    let build = deskit_build_info::BUILD;
    info!(
        rev = build.git_rev,
        built_at = build.built_at,
        "deskitd {}",
        DAEMON_VERSION
    );

    let settings = load_daemon_settings(config_path.as_deref());
    let desktop: Arc<dyn DesktopCapability> = Arc::new(XdotoolDesktop::new(
        &settings.synthesis,
        settings.screenshot_backend,
        settings.applications.clone(),
    ));
    if let Some(root) = &settings.files_root {
        info!("File access confined to {}", root.display());
    }
    let files = Arc::new(LocalFiles::new(settings.files_root.clone()));
    let synth = Synthesizer::new(desktop.clone(), files, settings.synthesis.clone());
    let hub = Arc::new(CaptureHub::new(desktop, settings.capture.buffer));
    let daemon = Arc::new(Daemon::new(secret, synth, hub.clone()));

    if let Some(command) = cli.input_hook.or(settings.capture.input_hook) {
        spawn_input_hook(hub, command);
    }

    spawn_signal_handlers(daemon.clone(), cli.socket.clone());

    #[cfg(unix)]
    {
        server::unlink_socket(&cli.socket)
            .with_context(|| format!("Failed to clear {}", cli.socket.display()))?;
        let listener = tokio::net::UnixListener::bind(&cli.socket)
            .with_context(|| format!("Failed to bind {}", cli.socket.display()))?;
        info!("deskit daemon listening on {}", cli.socket.display());
        return server::serve(listener, daemon).await;
    }

    #[cfg(not(unix))]
    {
        let raw = cli.socket.to_string_lossy().to_string();
        let addr = if raw.contains(':') {
            raw
        } else {
            DEFAULT_SOCK.to_string()
        };
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("deskit daemon listening on tcp://{}", addr);
        return server::serve(listener, daemon).await;
    }

    #[allow(unreachable_code)]
    Ok(())
}

fn spawn_signal_handlers(daemon: Arc<Daemon>, socket: PathBuf) {
    let ctrl_c_daemon = daemon.clone();
    let ctrl_c_socket = socket.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C; shutting down daemon");
            shutdown_daemon(ctrl_c_daemon, &ctrl_c_socket).await;
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM; shutting down daemon");
                shutdown_daemon(daemon, &socket).await;
            }
        });
    }
}

async fn shutdown_daemon(daemon: Arc<Daemon>, socket: &Path) {
    if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
        return;
    }

    info!(
        subscribers = daemon.hub().subscriber_count(),
        actions_executed = daemon.actions_executed(),
        "Graceful shutdown initiated"
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    #[cfg(unix)]
    {
        if let Err(err) = server::unlink_socket(socket) {
            warn!("Failed to remove socket {}: {}", socket.display(), err);
        }
    }
    #[cfg(not(unix))]
    let _ = socket;

    std::process::exit(0);
}

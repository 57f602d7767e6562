use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strmsync_core::{load_config, RemoteStore, SyncManager};
use strmsync_remote_alist::AlistRemote;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "strmsync",
    version,
    about = "strmsync - mirror local media trees to AList and keep .strm pointers in sync"
)]
struct Cli {
    /// Path to config file (YAML / JSON)
    #[arg(short, long, env = "CONFIG_PATH", default_value = "/config/config.yaml")]
    config: PathBuf,
}

/// Console logging, plus a daily rolling file when `log_file` is set. The
/// returned guard must live until exit so buffered lines are flushed.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log_file {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let _guard = init_logging(cfg.sync.log_file.as_deref())?;
    let tasks = cfg.tasks()?;
    info!(config = %cli.config.display(), tasks = tasks.len(), "starting");

    let remote: Arc<dyn RemoteStore> = Arc::new(
        AlistRemote::from_config(&cfg.remote)
            .await
            .context("connecting to remote store")?,
    );
    if let Err(e) = remote.ping().await {
        warn!(error = %e, "remote root is not listable yet");
    }

    let mut manager = SyncManager::new();
    let started = manager.start_all(tasks, Arc::clone(&remote));
    if started == 0 {
        return Err(anyhow!("no sync task could be started"));
    }

    info!(started, "running, press Ctrl+C to stop");
    shutdown_signal().await?;
    info!("stopping");
    manager.shutdown().await;
    Ok(())
}

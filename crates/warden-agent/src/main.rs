use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

mod access;
mod bridge;
mod command;
mod config;
mod console;
mod dispatch;
mod handlers;
mod mapgen;
mod output;
mod procstat;
mod response_queue;
mod session;
mod supervisor;
#[cfg(test)]
mod testutil;

use bridge::ChatBridge;
use session::SessionContext;
use supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("warden.toml"));
    let config = config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!(config = %config_path.display(), server = %config.server.command, "warden starting");

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (chat, mut chat_rx) = ChatBridge::new();
    let supervisor = Supervisor::new(config.server.clone(), output_tx);
    let ctx = Arc::new(SessionContext::new(config, supervisor, command_tx, chat));

    spawn_signal_handlers(ctx.clone(), config_path)?;
    console::spawn_console_reader(ctx.clone());
    tokio::spawn(output::run(ctx.clone(), output_rx));

    // Inbound chat seam. A protocol client pushes what it hears into this
    // sender; it must stay alive for the lifetime of the agent.
    let _chat_inbound = bridge::spawn_inbound_router(ctx.clone());

    // Outbound chat drain. A protocol client (IRC or similar) attaches
    // here; until one is wired in, messages are surfaced in the log so the
    // agent is fully usable from the server console alone.
    tokio::spawn(async move {
        while let Some(msg) = chat_rx.recv().await {
            tracing::info!(target = %msg.target, text = %msg.text, "chat out");
        }
    });

    if let Some(minutes) = ctx.config.backup.interval_minutes {
        spawn_auto_backup(ctx.clone(), minutes);
    }

    if let Err(e) = ctx.supervisor.start().await {
        tracing::warn!(%e, "initial server start failed");
    }

    dispatch::run(ctx, command_rx, handlers::table()).await;
    Ok(())
}

/// SIGINT/SIGTERM take the whole agent down, killing the server outright on
/// the way out. SIGHUP re-reads only the access tables from the config file
/// so permissions can change without a restart.
fn spawn_signal_handlers(ctx: Arc<SessionContext>, config_path: PathBuf) -> anyhow::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => tracing::warn!("caught SIGINT, shutting down"),
                _ = terminate.recv() => tracing::warn!("caught SIGTERM, shutting down"),
            }
            ctx.supervisor.destroy().await;
            std::process::exit(1);
        });
    }

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match config::load(&config_path) {
                Ok(fresh) => {
                    *ctx.access.write().await = fresh.access;
                    tracing::info!("access tables reloaded");
                }
                Err(e) => tracing::warn!(%e, "access reload failed, keeping current tables"),
            }
        }
    });

    Ok(())
}

/// Periodic unattended backup. Skips quietly while the server is down, and
/// backup errors are logged rather than treated as fatal.
fn spawn_auto_backup(ctx: Arc<SessionContext>, minutes: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !ctx.supervisor.is_running().await {
                continue;
            }
            let filename = format!(
                "{}.backup",
                chrono::Local::now().format("%Y-%m-%dT%H_%M_%S")
            );
            match ctx.supervisor.backup(&filename, &ctx.config.backup).await {
                Ok(()) => tracing::info!(%filename, "automatic backup finished"),
                Err(e) => tracing::warn!(%e, "automatic backup failed"),
            }
        }
    });
}

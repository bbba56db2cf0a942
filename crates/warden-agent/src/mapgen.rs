use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::session::SessionContext;

/// Run the external map-generation tool against a frozen copy of the world.
///
/// Only one run at a time; a second invocation while one is in flight
/// reports the tool's latest output line as a progress estimate instead of
/// starting another. The run itself is detached, the command replies as
/// soon as the tool is launched and the completion announcement goes to the
/// chat channel later.
pub async fn mapgen_cmd(ctx: Arc<SessionContext>, _args: Vec<String>) -> Vec<String> {
    if ctx.config.mapgen.command.is_empty() {
        return vec!["No map generator configured.".to_string()];
    }
    if ctx.mapgen.running.load(Ordering::SeqCst) {
        return vec![format!(
            "MapGen already running, last output: {}",
            ctx.mapgen.last_output()
        )];
    }

    // With the server up, pause auto-save and wait for its acknowledgement
    // so the world files are quiescent while we copy them. A downed server
    // can't be mid-write, so the copy is safe as-is.
    if ctx.supervisor.is_running().await {
        ctx.server_input("save-all");
        ctx.server_input("save-off");
        loop {
            let Some(line) = ctx.responses.next_line().await else {
                // Consume window expired; the dispatcher reported a timeout.
                return Vec::new();
            };
            if line.contains("Turned off world auto-saving")
                || line.contains("Disabling level saving")
            {
                break;
            }
        }
    }

    let world = ctx.config.server.dir.join(&ctx.config.server.world_dir);
    let copy = ctx.config.server.dir.join(&ctx.config.mapgen.world_copy_dir);
    let copied = tokio::task::spawn_blocking(move || copy_dir_recursive(&world, &copy)).await;

    if ctx.supervisor.is_running().await {
        ctx.server_input("save-on");
    }

    match copied {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return vec![format!("MapGen failed copying the world: {e}")],
        Err(e) => return vec![format!("MapGen failed copying the world: {e}")],
    }

    let mut cmd = Command::new(&ctx.config.mapgen.command);
    cmd.args(&ctx.config.mapgen.args)
        .current_dir(&ctx.config.server.dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return vec![format!("Could not start map generator: {e}")],
    };

    ctx.mapgen.mark_started();
    tracing::info!(command = %ctx.config.mapgen.command, "mapgen started");

    // Both pipes race into the same progress cell; last write wins.
    if let Some(out) = child.stdout.take() {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.mapgen.set_last_output(line);
            }
        });
    }
    if let Some(err) = child.stderr.take() {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.mapgen.set_last_output(line);
            }
        });
    }

    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let started = Local::now();
            let channel = ctx.config.chat.channel.clone();
            match child.wait().await {
                Ok(status) if status.success() => {
                    let took = Local::now() - started;
                    ctx.chat.send(
                        &channel,
                        format!("MapGen complete in {} seconds.", took.num_seconds()),
                    );
                }
                Ok(status) => {
                    tracing::warn!(code = ?status.code(), "mapgen tool failed");
                    ctx.chat.send(
                        &channel,
                        format!(
                            "MapGen failed, last output: {}",
                            ctx.mapgen.last_output()
                        ),
                    );
                }
                Err(err) => {
                    tracing::warn!(%err, "wait on mapgen tool failed");
                    ctx.chat.send(&channel, "MapGen failed.".to_string());
                }
            }
            ctx.mapgen.mark_finished();
        });
    }

    vec!["MapGen started.".to_string()]
}

/// Plain synchronous deep copy, run on the blocking pool. Overwrites files
/// already present in the destination from a previous run.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::session::SessionContext;

/// Feed the operator's terminal straight into the server.
///
/// Lines typed at the agent's own stdin bypass the dispatcher and access
/// control entirely, with one exception: a bare `stop` is hijacked so the
/// shutdown goes through the graceful announce/escalate sequence instead of
/// reaching the server as a raw console command.
pub fn spawn_console_reader(ctx: Arc<SessionContext>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "stop" {
                ctx.reset_counters();
                if let Err(e) = ctx
                    .supervisor
                    .stop(
                        Duration::from_secs(1),
                        "Stop issued at console. Going down now!",
                    )
                    .await
                {
                    tracing::warn!(%e, "console stop failed");
                }
            } else {
                ctx.server_input(line);
            }
        }
        tracing::info!("console input closed");
    });
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::access;
use crate::command::{Command, Source};
use crate::response_queue::ResponseQueue;
use crate::session::SessionContext;

/// Hard wall-clock budget for one command, waiting on the response queue
/// included.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub type HandlerFuture = Pin<Box<dyn Future<Output = Vec<String>> + Send>>;
type Handler = dyn Fn(Arc<SessionContext>, Vec<String>) -> HandlerFuture + Send + Sync;

/// Verb -> handler lookup. Aliases are just two registrations of the same
/// function.
#[derive(Default)]
pub struct HandlerTable {
    entries: HashMap<&'static str, Arc<Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, verb: &'static str, f: F)
    where
        F: Fn(Arc<SessionContext>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        self.entries
            .insert(verb, Arc::new(move |ctx, args| Box::pin(f(ctx, args))));
    }

    fn get(&self, verb: &str) -> Option<Arc<Handler>> {
        self.entries.get(verb).cloned()
    }
}

/// Single serialization point for the whole command surface.
///
/// Commands are pulled strictly one at a time in arrival order, which is
/// what makes it safe for handlers to block on the response queue: no two
/// handlers ever consume it concurrently.
pub async fn run(
    ctx: Arc<SessionContext>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    table: HandlerTable,
) {
    while let Some(cmd) = commands.recv().await {
        dispatch_one(&ctx, &table, cmd, COMMAND_TIMEOUT).await;
    }
}

pub(crate) async fn dispatch_one(
    ctx: &Arc<SessionContext>,
    table: &HandlerTable,
    cmd: Command,
    budget: Duration,
) {
    let mut tokens = cmd.raw.split(' ');
    let Some(verb) = tokens.next().filter(|v| !v.is_empty()) else {
        return;
    };
    let args: Vec<String> = tokens.map(str::to_string).collect();

    let reply = match table.get(verb) {
        None => vec![format!("Unknown command: {verb}")],
        Some(handler) => {
            let permitted = {
                let tables = ctx.access.read().await;
                access::allowed(&tables, &cmd.sender, verb, cmd.source)
            };

            if !permitted {
                tracing::warn!(sender = %cmd.sender, raw = %cmd.raw, "command denied");
                vec![format!(
                    "{} is not allowed to invoke '{}'. This incident will be reported.",
                    cmd.sender, verb
                )]
            } else {
                // Start the handler from a clean correlation window. This
                // both flushes stale lines and expires the previous
                // command's handler if it timed out and is still waiting,
                // so it cannot steal lines meant for this one.
                ctx.responses.drain().await;
                let window = ctx.responses.window();

                // The handler runs as its own task so a timeout can stop
                // waiting without cancelling it: killing it mid-flight
                // could leave the response queue or the server input
                // stream half-consumed. Its eventual reply is discarded.
                let task = tokio::spawn(ResponseQueue::in_window(
                    window,
                    handler(ctx.clone(), args),
                ));
                match tokio::time::timeout(budget, task).await {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(err)) => {
                        tracing::error!(%err, verb, "command handler failed");
                        vec!["Command failed unexpectedly.".to_string()]
                    }
                    Err(_) => {
                        tracing::warn!(verb, sender = %cmd.sender, "command timed out");
                        vec!["Command timed out.".to_string()]
                    }
                }
            }
        }
    };

    for line in reply {
        match cmd.source {
            Source::Console => ctx.server_input(format!("say {line}")),
            Source::Chat => ctx.chat.send(&cmd.reply_to, line),
        }
    }
}

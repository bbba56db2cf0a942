use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::mpsc;

use crate::command::{Command, Source};
use crate::session::SessionContext;

// The server tags lines with bracketed severity markers. Chat shows up as
// `[INFO] <name> text` and emotes as `[INFO] * name text`.
static CHAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\]( \* [a-zA-Z0-9\-_]+| <[a-zA-Z0-9\-_]+> )(.*)").expect("static regex")
});
static SENDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[INFO\] (\* |<)([a-zA-Z0-9\-_]+)[> ]").expect("static regex")
});
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"java.*Exception").expect("static regex"));
static SEVERE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[SEVERE\] Unexpected exception").expect("static regex"));

/// Chat portion of an output line: the rendered name prefix and the text
/// that follows it.
fn parse_chat(line: &str) -> Option<(&str, &str)> {
    let caps = CHAT_RE.captures(line)?;
    let prefix = caps.get(1)?.as_str();
    let text = caps.get(2)?.as_str();
    Some((prefix, text))
}

fn parse_sender(line: &str) -> Option<String> {
    let caps = SENDER_RE.captures(line)?;
    Some(caps.get(2)?.as_str().to_string())
}

fn is_error(line: &str) -> bool {
    ERROR_RE.is_match(line)
}

fn is_severe(line: &str) -> bool {
    SEVERE_RE.is_match(line)
}

/// Drain the merged server output for as long as the agent lives.
///
/// Every line is counted (exception patterns), echoed to the operator
/// console, bridged to chat when it looks like in-game chat (or turned into
/// a Command when it carries the attention character), and finally
/// published into the response queue for whichever handler is waiting.
pub async fn run(ctx: Arc<SessionContext>, mut lines: mpsc::UnboundedReceiver<String>) {
    let attention = ctx.config.server.attention;
    while let Some(line) = lines.recv().await {
        if is_error(&line) {
            ctx.record_server_error();
        } else if is_severe(&line) {
            ctx.record_severe_error();
        }

        // Operator console echo.
        println!("{line}");

        if let Some((prefix, text)) = parse_chat(&line) {
            match text.strip_prefix(attention) {
                Some(rest) if !rest.is_empty() => {
                    if let Some(sender) = parse_sender(&line) {
                        tracing::info!(%sender, command = rest, "command issued in-server");
                        let _ = ctx.commands.send(Command {
                            raw: rest.to_string(),
                            sender,
                            reply_to: String::new(),
                            source: Source::Console,
                        });
                    }
                }
                _ => {
                    ctx.chat
                        .send(&ctx.config.chat.channel, format!("{prefix}{text}"));
                }
            }
        }

        ctx.responses.publish(line).await;
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::command::{Command, Source};
use crate::session::SessionContext;

/// One outbound chat-network message. The protocol client (out of scope
/// here) consumes these and puts them on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub target: String,
    pub text: String,
}

/// Handle for everything that needs to say something on the chat network:
/// command replies, mapgen announcements, bridged in-game chat.
#[derive(Debug, Clone)]
pub struct ChatBridge {
    tx: mpsc::UnboundedSender<ChatMessage>,
}

impl ChatBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Best-effort send; a detached client just means the message is lost.
    pub fn send(&self, target: impl Into<String>, text: impl Into<String>) {
        let _ = self.tx.send(ChatMessage {
            target: target.into(),
            text: text.into(),
        });
    }
}

/// One inbound chat-network message as the protocol client hands it over.
#[derive(Debug, Clone)]
pub struct InboundChat {
    pub sender: String,
    /// Channel the message was seen on, or the bot's nick for a direct
    /// message.
    pub target: String,
    pub text: String,
    /// True for emote/action messages ("* alice waves").
    pub action: bool,
}

/// What to do with an inbound chat message.
#[derive(Debug)]
pub enum InboundAction {
    /// Hand to the dispatcher.
    Command(Command),
    /// Echo into the server as in-game chat (already rendered as a `say`
    /// line).
    Echo(String),
    Ignore,
}

/// Normalize an inbound chat message.
///
/// Messages addressed directly to the bot are commands replied to in
/// private; channel messages behind the attention character are commands
/// replied to on the channel; everything else is chat, echoed into the
/// server with the sender's nick.
pub fn route_inbound(msg: &InboundChat, nick: &str, attention: char) -> InboundAction {
    let sanitized = sanitize(&msg.text);
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return InboundAction::Ignore;
    }

    if msg.target == nick {
        return InboundAction::Command(Command {
            raw: trimmed.to_string(),
            sender: msg.sender.clone(),
            reply_to: msg.sender.clone(),
            source: Source::Chat,
        });
    }

    if let Some(rest) = trimmed.strip_prefix(attention) {
        if rest.is_empty() {
            return InboundAction::Ignore;
        }
        return InboundAction::Command(Command {
            raw: rest.to_string(),
            sender: msg.sender.clone(),
            reply_to: msg.target.clone(),
            source: Source::Chat,
        });
    }

    if msg.action {
        InboundAction::Echo(format!("say * {} {}", msg.sender, sanitized))
    } else {
        InboundAction::Echo(format!("say <{}> {}", msg.sender, sanitized))
    }
}

/// Inbound side of the bridge: a protocol client pushes everything it
/// hears into the returned sender, and a routing task turns each message
/// into a dispatched command or an in-game echo.
pub fn spawn_inbound_router(ctx: Arc<SessionContext>) -> mpsc::UnboundedSender<InboundChat> {
    let (tx, mut rx) = mpsc::unbounded_channel::<InboundChat>();
    tokio::spawn(async move {
        let nick = ctx.config.chat.nick.clone();
        let attention = ctx.config.server.attention;
        while let Some(msg) = rx.recv().await {
            match route_inbound(&msg, &nick, attention) {
                InboundAction::Command(cmd) => {
                    tracing::info!(sender = %cmd.sender, raw = %cmd.raw, "command issued in chat");
                    let _ = ctx.commands.send(cmd);
                }
                InboundAction::Echo(line) => ctx.server_input(line),
                InboundAction::Ignore => {}
            }
        }
    });
    tx
}

/// Line breaks in chat text would let a user smuggle extra server commands
/// through the echo path.
fn sanitize(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

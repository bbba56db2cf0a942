/// Where a command came from. Decides both the access-control namespace of
/// the sender and where reply lines are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Typed into the supervised server's own chat, behind the attention
    /// character.
    Console,
    /// Received from the chat-network bridge.
    Chat,
}

impl Source {
    /// Prefix the sender so a same-named user on the server console and on
    /// the chat network stay distinct identities.
    pub fn qualify(self, sender: &str) -> String {
        match self {
            Source::Console => format!("console:{sender}"),
            Source::Chat => format!("chat:{sender}"),
        }
    }
}

/// One inbound command, normalized from either input surface. Immutable
/// once built; consumed exactly once by the dispatcher.
#[derive(Debug, Clone)]
pub struct Command {
    /// Verb plus arguments, attention character already stripped.
    pub raw: String,
    pub sender: String,
    /// Chat target to send reply lines to. Unused for `Source::Console`
    /// replies, which render inside the server instead.
    pub reply_to: String,
    pub source: Source,
}

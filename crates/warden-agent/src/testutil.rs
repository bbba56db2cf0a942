use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::access::AccessTables;
use crate::bridge::{ChatBridge, ChatMessage};
use crate::command::Command;
use crate::config::{BackupConfig, ChatConfig, Config, MapgenConfig, ServerConfig};
use crate::session::SessionContext;
use crate::supervisor::Supervisor;

pub(crate) struct TestHarness {
    pub ctx: Arc<SessionContext>,
    pub chat_rx: mpsc::UnboundedReceiver<ChatMessage>,
    pub command_rx: mpsc::UnboundedReceiver<Command>,
    /// Merged server output feed. Tests that start a real process read the
    /// child's echoes from here.
    pub output_rx: mpsc::UnboundedReceiver<String>,
}

pub(crate) fn test_config() -> Config {
    Config {
        server: ServerConfig {
            command: "/bin/cat".to_string(),
            args: vec![],
            dir: PathBuf::from("/tmp"),
            world_dir: "world".to_string(),
            attention: '!',
        },
        chat: ChatConfig::default(),
        backup: BackupConfig::default(),
        mapgen: MapgenConfig::default(),
        access: AccessTables::default(),
    }
}

pub(crate) fn harness() -> TestHarness {
    harness_with(test_config())
}

pub(crate) fn harness_with(config: Config) -> TestHarness {
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (chat, chat_rx) = ChatBridge::new();
    // Short stop/settle timings keep tests that cycle the process fast.
    let supervisor = Supervisor::new(config.server.clone(), output_tx)
        .with_timings(Duration::from_millis(300), Duration::from_millis(10));
    let ctx = Arc::new(SessionContext::new(config, supervisor, command_tx, chat));
    TestHarness {
        ctx,
        chat_rx,
        command_rx,
        output_rx,
    }
}

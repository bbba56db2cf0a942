use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Local};
use tokio::sync::{RwLock, mpsc};

use crate::access::AccessTables;
use crate::bridge::ChatBridge;
use crate::command::Command;
use crate::config::Config;
use crate::response_queue::ResponseQueue;
use crate::supervisor::Supervisor;

/// Advisory map-generation state shared between the mapgen handler, its
/// output readers and the status command.
///
/// `last_output` is written by two racing readers (tool stdout and stderr);
/// last write wins and that is fine, the cell only feeds human-readable
/// progress display.
#[derive(Debug, Default)]
pub struct MapgenState {
    pub running: AtomicBool,
    last_output: Mutex<String>,
    last_run: Mutex<Option<DateTime<Local>>>,
}

impl MapgenState {
    pub fn last_output(&self) -> String {
        self.last_output
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn set_last_output(&self, line: impl Into<String>) {
        if let Ok(mut g) = self.last_output.lock() {
            *g = line.into();
        }
    }

    pub fn last_run(&self) -> Option<DateTime<Local>> {
        self.last_run.lock().map(|g| *g).unwrap_or(None)
    }

    pub fn mark_started(&self) {
        if let Ok(mut g) = self.last_run.lock() {
            *g = Some(Local::now());
        }
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn mark_finished(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.set_last_output("");
    }
}

/// Everything a command handler can touch, owned by the top-level runner
/// and passed around behind an `Arc`. Replaces what the predecessor kept as
/// process-wide globals.
pub struct SessionContext {
    pub config: Config,
    pub supervisor: Supervisor,
    pub responses: ResponseQueue,
    pub access: RwLock<AccessTables>,
    pub commands: mpsc::UnboundedSender<Command>,
    pub chat: ChatBridge,
    pub mapgen: MapgenState,

    server_errors: AtomicU32,
    severe_errors: AtomicU32,
    server_version: Mutex<String>,
}

impl SessionContext {
    pub fn new(
        config: Config,
        supervisor: Supervisor,
        commands: mpsc::UnboundedSender<Command>,
        chat: ChatBridge,
    ) -> Self {
        let access = RwLock::new(config.access.clone());
        Self {
            config,
            supervisor,
            responses: ResponseQueue::default(),
            access,
            commands,
            chat,
            mapgen: MapgenState::default(),
            server_errors: AtomicU32::new(0),
            severe_errors: AtomicU32::new(0),
            server_version: Mutex::new(String::new()),
        }
    }

    /// Enqueue one line of input to the supervised server.
    pub fn server_input(&self, line: impl Into<String>) {
        let _ = self.supervisor.input().send(line.into());
    }

    pub fn record_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_severe_error(&self) {
        self.severe_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn server_errors(&self) -> u32 {
        self.server_errors.load(Ordering::Relaxed)
    }

    pub fn severe_errors(&self) -> u32 {
        self.severe_errors.load(Ordering::Relaxed)
    }

    /// Stop/start cycles begin with a clean slate.
    pub fn reset_counters(&self) {
        self.server_errors.store(0, Ordering::Relaxed);
        self.severe_errors.store(0, Ordering::Relaxed);
        self.set_server_version("");
    }

    pub fn server_version(&self) -> String {
        self.server_version
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn set_server_version(&self, version: impl Into<String>) {
        if let Ok(mut g) = self.server_version.lock() {
            *g = version.into();
        }
    }
}

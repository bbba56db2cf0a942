use thiserror::Error;

/// Lifecycle of the one supervised server process.
///
/// Created `Stopped`; `start` moves to `Running`, `stop` passes through
/// `Stopping` on its way back down. There is no `Failed` terminal state:
/// a crashed server simply reads as `Stopped` and can be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Running,
    Stopping,
}

/// Errors the supervisor can hand back to command handlers.
///
/// Display text doubles as the reply line shown to whoever issued the
/// command, so the wording is operator-facing.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Server not currently running.")]
    NotRunning,

    #[error("Server is already running.")]
    AlreadyRunning,

    #[error("Could not start server: {0}")]
    Launch(#[source] std::io::Error),

    #[error("Error attempting to perform backup: {0}")]
    Backup(String),
}

/// Best-effort process statistics read from the host OS.
///
/// Fields hold the raw status lines (e.g. `VmSize:  123456 kB`) so status
/// replies can show them verbatim. Anything the platform cannot provide
/// stays `None`.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub vm_size: Option<String>,
    pub vm_swap: Option<String>,
    pub threads: Option<String>,
}

impl ResourceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.vm_size.is_none() && self.vm_swap.is_none() && self.threads.is_none()
    }
}

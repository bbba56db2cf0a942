use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use warden_process::{ProcessState, SupervisorError};

use crate::config::{BackupConfig, ServerConfig};

/// How long a graceful stop may take before escalating to SIGKILL.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period after `save-off` before the backup archive is taken.
const BACKUP_SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Inner {
    state: ProcessState,
    pid: Option<u32>,
    exit_rx: Option<oneshot::Receiver<()>>,
    /// Bumped on every successful start. A wait task only tears state down
    /// if its child is still the current generation; a stale reaper from a
    /// killed predecessor must not touch a freshly restarted process.
    generation: u64,
}

/// Owns the one supervised server process.
///
/// The input side is a single ordered channel: the dispatcher, handlers,
/// delayed-action timers and the console adapter all enqueue lines, and one
/// writer task feeds them to the child's stdin. Lines sent while no process
/// is up are dropped. The output side merges stdout and stderr into one
/// line channel handed to the output classifier.
///
/// `inner` is the start/stop mutex: a `stop` holds it for its whole
/// announce/delay/terminate/escalate sequence, so overlapping start/stop
/// calls serialize.
#[derive(Debug)]
pub struct Supervisor {
    config: ServerConfig,
    inner: Arc<Mutex<Inner>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    input_tx: mpsc::UnboundedSender<String>,
    output_tx: mpsc::UnboundedSender<String>,
    stop_timeout: Duration,
    backup_settle: Duration,
}

impl Supervisor {
    pub fn new(config: ServerConfig, output_tx: mpsc::UnboundedSender<String>) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            state: ProcessState::Stopped,
            pid: None,
            exit_rx: None,
            generation: 0,
        }));
        let stdin: Arc<Mutex<Option<ChildStdin>>> = Arc::new(Mutex::new(None));

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn({
            let stdin = stdin.clone();
            async move {
                while let Some(line) = input_rx.recv().await {
                    let mut guard = stdin.lock().await;
                    let Some(w) = guard.as_mut() else {
                        continue;
                    };
                    if w.write_all(line.as_bytes()).await.is_err()
                        || w.write_all(b"\n").await.is_err()
                    {
                        // Pipe is gone; the wait task will catch us up.
                        *guard = None;
                        continue;
                    }
                    let _ = w.flush().await;
                }
            }
        });

        Self {
            config,
            inner,
            stdin,
            input_tx,
            output_tx,
            stop_timeout: STOP_TIMEOUT,
            backup_settle: BACKUP_SETTLE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_timings(mut self, stop_timeout: Duration, backup_settle: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self.backup_settle = backup_settle;
        self
    }

    /// Shared producer handle into the process input channel.
    pub fn input(&self) -> mpsc::UnboundedSender<String> {
        self.input_tx.clone()
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.inner.lock().await.state, ProcessState::Running)
    }

    pub async fn pid(&self) -> Result<u32, SupervisorError> {
        let inner = self.inner.lock().await;
        match inner.state {
            ProcessState::Stopped => Err(SupervisorError::NotRunning),
            _ => inner.pid.ok_or(SupervisorError::NotRunning),
        }
    }

    /// Launch the configured server executable and wire its pipes.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, ProcessState::Stopped) {
            return Err(SupervisorError::AlreadyRunning);
        }

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .current_dir(&self.config.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(SupervisorError::Launch)?;
        let pid = child.id();
        tracing::info!(pid, command = %self.config.command, "server started");

        *self.stdin.lock().await = child.stdin.take();

        // Merge stdout and stderr into the classifier's line channel. The
        // server writes most of its output to stderr, so both matter.
        if let Some(out) = child.stdout.take() {
            let tx = self.output_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(err) = child.stderr.take() {
            let tx = self.output_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        inner.state = ProcessState::Running;
        inner.pid = pid;
        inner.exit_rx = Some(exit_rx);
        inner.generation += 1;
        let generation = inner.generation;

        let inner_arc = self.inner.clone();
        let stdin = self.stdin.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            // Signal first: a stop may be holding the state lock while it
            // waits for exactly this.
            let _ = exit_tx.send(());
            let mut inner = inner_arc.lock().await;
            // A restart can install a newer child before this one is
            // reaped; only the current child's reaper may clean up.
            if inner.generation == generation {
                inner.state = ProcessState::Stopped;
                inner.pid = None;
                inner.exit_rx = None;
                *stdin.lock().await = None;
            }
            match status {
                Ok(st) => tracing::info!(code = ?st.code(), "server exited"),
                Err(err) => tracing::warn!(%err, "wait on server failed"),
            }
        });

        Ok(())
    }

    /// Graceful stop: announce, flush, wait out the grace delay, ask the
    /// server to terminate, and SIGKILL it if it ignores us past
    /// `stop_timeout`. Always leaves the process marked stopped.
    pub async fn stop(&self, delay: Duration, message: &str) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, ProcessState::Running) {
            return Err(SupervisorError::NotRunning);
        }

        inner.state = ProcessState::Stopping;
        let pid = inner.pid;
        let exit_rx = inner.exit_rx.take();

        let _ = self.input_tx.send("save-all".to_string());
        let _ = self.input_tx.send(format!("say {message}"));
        tokio::time::sleep(delay).await;
        let _ = self.input_tx.send("stop".to_string());

        if let Some(exit_rx) = exit_rx {
            match tokio::time::timeout(self.stop_timeout, exit_rx).await {
                Ok(_) => tracing::info!("server stopped gracefully"),
                Err(_) => {
                    tracing::warn!(pid, "server ignored stop, escalating to SIGKILL");
                    kill(pid);
                }
            }
        }

        inner.state = ProcessState::Stopped;
        inner.pid = None;
        Ok(())
    }

    /// Unconditional immediate kill, used only on agent shutdown.
    pub async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(pid) = inner.pid.take() {
            tracing::warn!(pid, "destroying server process");
            kill(Some(pid));
        }
        inner.state = ProcessState::Stopped;
        inner.exit_rx = None;
    }

    /// Archive the server's data files while auto-save is paused.
    ///
    /// Errors from the archiver come back as `SupervisorError::Backup` and
    /// are reported, never fatal; `save-on` is always re-issued.
    pub async fn backup(
        &self,
        filename: &str,
        backup: &BackupConfig,
    ) -> Result<(), SupervisorError> {
        let inner = self.inner.lock().await;
        if !matches!(inner.state, ProcessState::Running) {
            return Err(SupervisorError::NotRunning);
        }

        let _ = self.input_tx.send("say Backup in progress...".to_string());
        let _ = self.input_tx.send("save-off".to_string());
        tokio::time::sleep(self.backup_settle).await;

        let dest_dir = self.config.dir.join(&backup.dir);
        let result = async {
            tokio::fs::create_dir_all(&dest_dir)
                .await
                .map_err(|e| SupervisorError::Backup(e.to_string()))?;

            let out = Command::new("tar")
                .arg("-czf")
                .arg(dest_dir.join(filename))
                .args(&backup.files)
                .current_dir(&self.config.dir)
                .output()
                .await
                .map_err(|e| SupervisorError::Backup(e.to_string()))?;

            if !out.status.success() {
                let stderr = String::from_utf8_lossy(&out.stderr);
                return Err(SupervisorError::Backup(format!(
                    "archiver returned {}: {}",
                    out.status.code().unwrap_or(-1),
                    stderr.trim()
                )));
            }
            Ok(())
        }
        .await;

        let _ = self.input_tx.send("save-on".to_string());
        result
    }
}

#[cfg(unix)]
fn kill(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill(_pid: Option<u32>) {}

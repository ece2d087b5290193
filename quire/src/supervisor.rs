//! Locates and drives the `quired` supervisor process.
//!
//! The launcher never serves a single request itself. It hands the prepared
//! artifact and pid file path to `quired` and then either waits on it
//! (foreground) or leaves it running with its output captured in a log file
//! (forked).

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

/// Binary looked up on PATH when no explicit override is given.
pub const SUPERVISOR_BINARY: &str = "quired";
/// Environment override pointing at the supervisor binary.
pub const SUPERVISOR_ENV: &str = "QUIRE_SUPERVISOR";

// How long a forked supervisor gets to crash before we stop watching it.
const FORK_SETTLE_WAIT_MS: u64 = 200;
const LOG_TAIL_LINES: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(
        "could not find 'quired' on PATH. Install it, or set QUIRE_SUPERVISOR to the binary's location."
    )]
    NotFound(#[source] which::Error),
    #[error("failed to start {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for the server process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("failed to open server log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install the shutdown handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("{message}")]
    EarlyExit { message: String },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Finds the supervisor binary: the `QUIRE_SUPERVISOR` override wins, then
/// PATH lookup of `quired`.
pub fn resolve() -> Result<PathBuf> {
    if let Ok(explicit) = std::env::var(SUPERVISOR_ENV)
        && !explicit.is_empty()
    {
        tracing::debug!("using supervisor override {explicit}");
        return Ok(PathBuf::from(explicit));
    }
    which::which(SUPERVISOR_BINARY).map_err(SupervisorError::NotFound)
}

fn command(binary: &Path, artifact: &Path, pid_file: &Path) -> Command {
    let mut cmd = Command::new(binary);
    cmd.arg("--config")
        .arg(artifact)
        .arg("--pidfile")
        .arg(pid_file);
    cmd
}

/// Forwards Ctrl-C to the supervisor child so a terminal interrupt tears down
/// the server rather than just the launcher. The process-wide handler is
/// installed once; while no child is armed it does nothing. Dropping the
/// forwarder disarms it.
struct ShutdownForwarder {
    child_pid: Arc<AtomicI32>,
}

impl ShutdownForwarder {
    fn install() -> Result<Self> {
        static TARGET: OnceLock<Arc<AtomicI32>> = OnceLock::new();
        if let Some(existing) = TARGET.get() {
            return Ok(Self {
                child_pid: existing.clone(),
            });
        }
        let child_pid = Arc::new(AtomicI32::new(0));
        let target = child_pid.clone();
        ctrlc::set_handler(move || {
            let pid = target.load(Ordering::SeqCst);
            if pid > 0 {
                #[cfg(unix)]
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        })?;
        let _ = TARGET.set(child_pid.clone());
        Ok(Self { child_pid })
    }

    fn arm(&self, pid: u32) {
        self.child_pid.store(pid as i32, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.child_pid.store(0, Ordering::SeqCst);
    }
}

impl Drop for ShutdownForwarder {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Runs the supervisor attached to the launcher's terminal and waits for it
/// to exit. The caller interprets the exit status.
pub fn run_foreground(binary: &Path, artifact: &Path, pid_file: &Path) -> Result<ExitStatus> {
    let forwarder = ShutdownForwarder::install()?;
    let mut cmd = command(binary, artifact, pid_file);
    tracing::debug!("exec {cmd:?}");
    let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        binary: binary.to_path_buf(),
        source,
    })?;
    forwarder.arm(child.id());
    tracing::info!("supervisor started, pid {}", child.id());
    let status = child.wait().map_err(SupervisorError::Wait)?;
    forwarder.disarm();
    Ok(status)
}

/// Starts the supervisor detached with its output captured in `log_path`,
/// returning the child pid. Waits briefly so an immediate crash surfaces
/// here instead of silently in the log.
pub fn spawn_detached(
    binary: &Path,
    artifact: &Path,
    pid_file: &Path,
    log_path: &Path,
) -> Result<u32> {
    let log_file = open_supervisor_log(log_path).map_err(|source| SupervisorError::Log {
        path: log_path.to_path_buf(),
        source,
    })?;
    let log_file_err = log_file
        .try_clone()
        .map_err(|source| SupervisorError::Log {
            path: log_path.to_path_buf(),
            source,
        })?;

    let mut cmd = command(binary, artifact, pid_file);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err));
    tracing::debug!("exec {cmd:?}");
    let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        binary: binary.to_path_buf(),
        source,
    })?;

    std::thread::sleep(Duration::from_millis(FORK_SETTLE_WAIT_MS));
    if let Ok(Some(status)) = child.try_wait() {
        return Err(SupervisorError::EarlyExit {
            message: format_early_exit(log_path, status),
        });
    }

    tracing::info!("supervisor running in the background, pid {}", child.id());
    Ok(child.id())
}

fn open_supervisor_log(log_path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)
}

fn read_log_tail(log_path: &Path, max_lines: usize) -> String {
    let Ok(contents) = std::fs::read_to_string(log_path) else {
        return String::new();
    };
    let lines: Vec<&str> = contents.lines().collect();
    let keep = lines.len().saturating_sub(max_lines);
    lines[keep..].join("\n").trim().to_string()
}

fn format_early_exit(log_path: &Path, status: ExitStatus) -> String {
    let tail = read_log_tail(log_path, LOG_TAIL_LINES);
    if tail.is_empty() {
        format!("the server exited during startup ({status})")
    } else {
        format!("the server exited during startup ({status})\nlast server log lines:\n{tail}")
    }
}

//! Running-instance detection via the PID-file convention.
//!
//! The supervisor writes `quired.pid` into the application directory on
//! successful bind. Probing never fails: unreadable or stale prior state
//! degrades to "not running" so a crashed instance cannot wedge the
//! directory.

use std::path::Path;

use quire_core::ServerIdentity;

/// Outcome of probing an application directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    NotRunning,

    /// A PID file was present but its process is gone. The stale file has
    /// been cleaned up; the directory counts as not running.
    Stale { pid: Option<u32> },

    /// A live instance holds the directory. `identity` is recovered from
    /// that instance's artifact when its text still matches the shared
    /// pattern; unknown settings are `None`, not an error.
    RunningElsewhere {
        pid: u32,
        identity: Option<ServerIdentity>,
    },
}

pub fn probe(pid_path: &Path, artifact_path: &Path) -> Probe {
    let content = match std::fs::read_to_string(pid_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Probe::NotRunning,
        Err(e) => {
            // An unreadable PID file cannot prove a live instance.
            tracing::warn!(path = %pid_path.display(), "could not read PID file: {e}");
            return Probe::NotRunning;
        }
    };

    let pid = content.trim().parse::<u32>().ok();
    match pid {
        Some(pid) if is_pid_alive(pid) => Probe::RunningElsewhere {
            pid,
            identity: recover_identity(artifact_path),
        },
        _ => {
            remove_stale(pid_path, pid);
            Probe::Stale { pid }
        }
    }
}

/// `kill(pid, 0)` checks for existence without delivering a signal. EPERM
/// still proves the process exists.
fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs only the existence check.
        let result = unsafe { libc::kill(pid_i32, 0) };
        if result == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid_i32;
        true
    }
}

fn remove_stale(pid_path: &Path, pid: Option<u32>) {
    tracing::info!(path = %pid_path.display(), pid = ?pid, "Removing stale PID file");
    if let Err(e) = std::fs::remove_file(pid_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %pid_path.display(), "Failed to remove stale PID file: {e}");
    }
}

/// Recovers the other instance's identity from its artifact. Typed
/// artifacts carry the literal line in the `identity` field; any other
/// text is scanned raw so older writers of the line keep working. A
/// blank interface reads as `localhost`.
fn recover_identity(artifact_path: &Path) -> Option<ServerIdentity> {
    let text = std::fs::read_to_string(artifact_path).ok()?;
    let identity = if let Ok(value) = toml::from_str::<toml::Value>(&text)
        && let Some(line) = value.get("identity").and_then(|v| v.as_str())
    {
        ServerIdentity::scan(line)?
    } else {
        ServerIdentity::scan(&text)?
    };
    if identity.interface.is_empty() {
        // Writers may leave the interface blank; the redirect needs a host.
        return Some(ServerIdentity::new(
            "localhost",
            identity.port,
            identity.secure,
        ));
    }
    Some(identity)
}

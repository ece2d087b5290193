use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Get Quire's per-user home directory.
///
/// Honors the `QUIRE_HOME` override, otherwise defaults to `~/.quire`.
/// Generated files (TLS material, the default workbook directory) live
/// under it.
pub fn quire_home_dir() -> Result<PathBuf, std::io::Error> {
    if let Ok(v) = std::env::var("QUIRE_HOME")
        && !v.trim().is_empty()
    {
        return Ok(PathBuf::from(v));
    }

    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        )
    })?;

    Ok(home.join(".quire"))
}

/// Directory holding the private key, certificate and template.
pub fn tls_dir() -> Result<PathBuf, std::io::Error> {
    Ok(quire_home_dir()?.join("tls"))
}

/// Default application directory when `--dir` is not given.
pub fn default_workbook_dir() -> Result<PathBuf, std::io::Error> {
    Ok(quire_home_dir()?.join("workbook"))
}

/// PID file the supervisor writes inside the application directory.
pub fn pid_file_path(directory: &Path) -> PathBuf {
    directory.join(quire_core::PID_FILE)
}

/// Launch artifact the supervisor consumes, inside the application directory.
pub fn artifact_path(directory: &Path) -> PathBuf {
    directory.join(quire_core::ARTIFACT_FILE)
}

/// Log file for detached supervisor output, inside the application directory.
pub fn supervisor_log_path(directory: &Path) -> PathBuf {
    directory.join(quire_core::LOG_FILE)
}

#[cfg(test)]
pub(crate) fn test_env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env test lock poisoned")
}

//! The launch sequence for one server bootstrap attempt.
//!
//! Stages run strictly in order: account migrations and admin credentials,
//! running-instance probe, certificate provisioning (secure mode only),
//! port allocation, artifact rendering, supervisor spawn. A discovered live
//! instance short-circuits into a redirect or printed guidance; both count
//! as success.

use std::path::{Path, PathBuf};

use quire_core::{EXIT_PORT_IN_USE, ServerIdentity};

use crate::accounts::{AccountError, UserRegistry, ensure_admin, run_startup_migrations};
use crate::artifact::{self, ArtifactError};
use crate::browser;
use crate::instance::{self, Probe};
use crate::output;
use crate::paths;
use crate::ports::{self, PortError};
use crate::prompt::Prompter;
use crate::supervisor::{self, SupervisorError};
use crate::tls::{self, CertificateMaterial, TlsError};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_INTERFACE: &str = "localhost";
pub const DEFAULT_PORT_TRIES: u32 = 50;

/// Immutable snapshot of one bootstrap attempt, fully resolved before the
/// first stage runs.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Workbook directory; created and made absolute during preparation.
    pub directory: PathBuf,
    pub port: u16,
    pub interface: String,
    /// How many consecutive ports to probe starting at `port`.
    pub port_tries: u32,
    pub secure: bool,
    /// Force admin password setup even when the account already exists.
    pub reset: bool,
    pub require_login: bool,
    /// Idle timeout in seconds forwarded to the application; 0 disables it.
    pub timeout: u64,
    pub server_pool: Option<String>,
    pub ulimit: String,
    /// Workbook file to import once the server is up.
    pub upload: Option<PathBuf>,
    pub open_viewer: bool,
    /// Viewer landing page when no login and no upload take precedence.
    pub start_path: String,
    pub fork: bool,
    pub quiet: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            port: DEFAULT_PORT,
            interface: DEFAULT_INTERFACE.to_string(),
            port_tries: DEFAULT_PORT_TRIES,
            secure: false,
            reset: false,
            require_login: true,
            timeout: 0,
            server_pool: None,
            ulimit: String::new(),
            upload: None,
            open_viewer: true,
            start_path: String::new(),
            fork: false,
            quiet: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Ports(#[from] PortError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Accounts(#[from] AccountError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("could not prepare the workbook directory {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not locate the quire home directory: {0}")]
    Home(#[source] std::io::Error),
    #[error("the server could not bind port {port}; another program is already using it")]
    PortBound { port: u16 },
    #[error("the server exited with status {code}")]
    ServerFailed { code: i32 },
}

pub type Result<T> = std::result::Result<T, LaunchError>;

/// Terminal states of one launch. Every variant is a success from the
/// caller's point of view; failures are `LaunchError`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An existing instance answers for this directory and the viewer was
    /// pointed at it. Nothing was spawned.
    Redirected,
    /// An existing instance holds the directory and no viewer was
    /// requested; guidance was printed instead. Nothing was spawned.
    Aborted,
    /// The foreground supervisor ran and shut down cleanly.
    Completed,
    /// The supervisor keeps running detached.
    Forked { pid: u32 },
}

pub fn run(mut options: LaunchOptions, prompter: &mut dyn Prompter) -> Result<Outcome> {
    options.directory = prepare_directory(&options.directory)?;

    let mut registry = UserRegistry::load(&options.directory)?;
    run_startup_migrations(&mut registry, &options.directory)?;
    if options.require_login || options.reset {
        ensure_admin(&mut registry, options.reset, prompter)?;
    }

    let pid_path = paths::pid_file_path(&options.directory);
    let artifact_path = paths::artifact_path(&options.directory);
    match instance::probe(&pid_path, &artifact_path) {
        Probe::RunningElsewhere { pid, identity } => {
            return Ok(handle_running_instance(&options, pid, identity));
        }
        Probe::Stale { .. } | Probe::NotRunning => {}
    }

    warn_if_exposed(&options);

    let material = if options.secure {
        Some(ensure_certificates(prompter)?)
    } else {
        None
    };

    let port = ports::allocate(&options.interface, options.port, options.port_tries)?;
    let identity = ServerIdentity::new(options.interface.clone(), port, options.secure);

    let startup_token = artifact::generate_startup_token()?;
    let config = artifact::render(&options, &identity, material.as_ref(), &startup_token);
    artifact::write(&config, &artifact_path)?;

    print_launch_banner(&options, &identity);

    let binary = supervisor::resolve()?;
    if options.fork {
        let log_path = paths::supervisor_log_path(&options.directory);
        let pid = supervisor::spawn_detached(&binary, &artifact_path, &pid_path, &log_path)?;
        if !options.quiet {
            output::success(&format!("Server running in the background, PID {pid}."));
            output::muted(&format!("Server log: {}", log_path.display()));
        }
        Ok(Outcome::Forked { pid })
    } else {
        let status = supervisor::run_foreground(&binary, &artifact_path, &pid_path)?;
        interpret_exit(status, port)
    }
}

fn prepare_directory(requested: &Path) -> Result<PathBuf> {
    let fail = |source| LaunchError::Workspace {
        path: requested.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(requested).map_err(fail)?;
    requested.canonicalize().map_err(fail)
}

fn handle_running_instance(
    options: &LaunchOptions,
    pid: u32,
    identity: Option<ServerIdentity>,
) -> Outcome {
    output::warning(&format!("Another server is running, PID {pid}."));

    let viewer_requested = options.open_viewer || options.upload.is_some();
    if viewer_requested && let Some(identity) = identity {
        let url = match &options.upload {
            Some(upload) => format!(
                "{}{}",
                identity.base_url().trim_end_matches('/'),
                artifact::upload_redirect_path(upload)
            ),
            None => identity.base_url(),
        };
        output::step(&format!("Opening web browser at {url} ..."));
        browser::open_page(&url);
        return Outcome::Redirected;
    }

    output::muted("Please either stop the old server or run the new server in a different directory.");
    Outcome::Aborted
}

// Only the literal localhost name is exempt; any other interface without
// TLS deserves a warning.
fn warn_if_exposed(options: &LaunchOptions) {
    if options.secure || options.interface == "localhost" {
        return;
    }
    output::warning("Insecure server listening on an external interface.");
    output::warning(
        "Anyone on the network can read this traffic unless you are tunnelling over ssh. Consider re-running with --secure.",
    );
}

/// Reuses certificate material from the shared TLS directory, provisioning
/// it interactively on first use.
fn ensure_certificates(prompter: &mut dyn Prompter) -> Result<CertificateMaterial> {
    let dir = paths::tls_dir().map_err(LaunchError::Home)?;
    let material = CertificateMaterial::in_dir(&dir);
    if material.exists() {
        tracing::debug!("reusing certificate material in {}", dir.display());
        return Ok(material);
    }
    tls::provision(&material, prompter)?;
    Ok(material)
}

fn print_launch_banner(options: &LaunchOptions, identity: &ServerIdentity) {
    if options.quiet {
        return;
    }
    output::section("Quire server");
    output::muted(&format!(
        "The workbook files are stored in: {}",
        options.directory.display()
    ));
    output::step(&format!("Open your web browser to {}", identity.base_url()));
    if identity.secure {
        output::muted("There is an admin account. If you do not remember the password,");
        output::muted("stop the server and re-run with --reset.");
    }
}

fn interpret_exit(status: std::process::ExitStatus, port: u16) -> Result<Outcome> {
    match status.code() {
        Some(0) => Ok(Outcome::Completed),
        Some(code) if code == EXIT_PORT_IN_USE => Err(LaunchError::PortBound { port }),
        Some(code) => Err(LaunchError::ServerFailed { code }),
        // No code means a signal ended it, normally our own forwarded
        // shutdown; treated as a clean stop.
        None => {
            tracing::info!("server stopped by signal");
            Ok(Outcome::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use crate::paths::test_env_lock;
    use crate::prompt::ScriptedPrompter;

    struct EnvVarGuard {
        name: &'static str,
        previous: Option<std::ffi::OsString>,
    }

    impl EnvVarGuard {
        fn set(name: &'static str, value: &std::ffi::OsStr) -> Self {
            let previous = std::env::var_os(name);
            unsafe { std::env::set_var(name, value) };
            Self { name, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => unsafe { std::env::set_var(self.name, value) },
                None => unsafe { std::env::remove_var(self.name) },
            }
        }
    }

    #[cfg(unix)]
    fn write_supervisor_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("quired-stub");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn options_in(dir: &Path) -> LaunchOptions {
        LaunchOptions {
            directory: dir.to_path_buf(),
            quiet: true,
            open_viewer: false,
            ..LaunchOptions::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn fresh_directory_creates_admin_writes_artifact_and_completes() {
        let _guard = test_env_lock();
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let workbook = work.path().join("workbook");

        let stub = write_supervisor_stub(work.path(), "exit 0");
        let _home = EnvVarGuard::set("QUIRE_HOME", home.path().as_os_str());
        let _supervisor = EnvVarGuard::set(supervisor::SUPERVISOR_ENV, stub.as_os_str());

        let mut prompter = ScriptedPrompter::new(["first-password", "first-password"]);
        let outcome = run(options_in(&workbook), &mut prompter).unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(prompter.remaining(), 0);

        let registry = UserRegistry::load(&workbook.canonicalize().unwrap()).unwrap();
        assert!(registry.user_exists("admin"));

        let written =
            std::fs::read_to_string(paths::artifact_path(&workbook.canonicalize().unwrap()))
                .unwrap();
        let config = quire_core::SupervisorConfig::from_toml_str(&written).unwrap();
        assert_eq!(
            config.server_identity(),
            Some(ServerIdentity::new(DEFAULT_INTERFACE, config.listen.port, false))
        );
    }

    #[cfg(unix)]
    #[test]
    fn supervisor_port_exit_code_becomes_a_bind_fault() {
        let _guard = test_env_lock();
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let workbook = work.path().join("workbook");

        let stub = write_supervisor_stub(work.path(), &format!("exit {EXIT_PORT_IN_USE}"));
        let _home = EnvVarGuard::set("QUIRE_HOME", home.path().as_os_str());
        let _supervisor = EnvVarGuard::set(supervisor::SUPERVISOR_ENV, stub.as_os_str());

        let mut options = options_in(&workbook);
        options.require_login = false;
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        let err = run(options, &mut prompter).unwrap_err();
        match err {
            LaunchError::PortBound { port } => assert!(port >= DEFAULT_PORT),
            other => panic!("expected a bind fault, got {other}"),
        }
    }

    #[test]
    fn live_instance_without_viewer_prints_guidance_and_aborts() {
        let _guard = test_env_lock();
        let work = tempfile::tempdir().unwrap();
        let workbook = work.path().join("workbook");
        std::fs::create_dir_all(&workbook).unwrap();

        // Our own pid is always alive.
        std::fs::write(
            paths::pid_file_path(&workbook),
            format!("{}\n", std::process::id()),
        )
        .unwrap();
        std::fs::write(
            paths::artifact_path(&workbook),
            "identity = 'interface=\"localhost\",port=9000,secure=False'\n",
        )
        .unwrap();

        let mut options = options_in(&workbook);
        options.require_login = false;
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        let outcome = run(options, &mut prompter).unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        assert!(paths::pid_file_path(&workbook).exists());
    }

    #[cfg(unix)]
    #[test]
    fn live_instance_with_viewer_redirects_to_its_url() {
        let _guard = test_env_lock();
        let work = tempfile::tempdir().unwrap();
        let workbook = work.path().join("workbook");
        std::fs::create_dir_all(&workbook).unwrap();

        std::fs::write(
            paths::pid_file_path(&workbook),
            format!("{}\n", std::process::id()),
        )
        .unwrap();
        std::fs::write(
            paths::artifact_path(&workbook),
            "identity = 'interface=\"localhost\",port=9000,secure=False'\n",
        )
        .unwrap();

        let capture = work.path().join("opened");
        let browser_stub = work.path().join("browser-stub");
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::write(
                &browser_stub,
                format!("#!/bin/sh\necho \"$1\" > {}\n", capture.display()),
            )
            .unwrap();
            let mut perms = std::fs::metadata(&browser_stub).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&browser_stub, perms).unwrap();
        }
        let _browser = EnvVarGuard::set(browser::BROWSER_ENV, browser_stub.as_os_str());

        let mut options = options_in(&workbook);
        options.require_login = false;
        options.open_viewer = true;
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        let outcome = run(options, &mut prompter).unwrap();
        assert_eq!(outcome, Outcome::Redirected);

        let opened = std::fs::read_to_string(&capture).unwrap();
        assert_eq!(opened.trim(), "http://localhost:9000/");
    }

    #[test]
    fn secure_mode_without_tools_fails_before_writing_anything() {
        let _guard = test_env_lock();
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let workbook = work.path().join("workbook");

        let _home = EnvVarGuard::set("QUIRE_HOME", home.path().as_os_str());
        let _path = EnvVarGuard::set("PATH", std::ffi::OsStr::new(""));

        let mut options = options_in(&workbook);
        options.require_login = false;
        options.secure = true;
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        let err = run(options, &mut prompter).unwrap_err();
        assert!(matches!(err, LaunchError::Tls(TlsError::ToolMissing)));
        assert!(!paths::artifact_path(&workbook).exists());
        assert!(!home.path().join("tls").join("private.pem").exists());
    }
}

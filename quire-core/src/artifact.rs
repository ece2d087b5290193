//! The launch descriptor consumed by the `quired` supervisor.
//!
//! The artifact is a typed, versioned value serialized to TOML. It is fully
//! regenerated on every launch and never partially edited, so it is always
//! self-consistent with the options of the invocation that wrote it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ServerIdentity;

/// Schema version of the supervisor artifact. Bumped on any change to the
/// field set so a mismatched `quired` can refuse cleanly.
pub const ARTIFACT_VERSION: u32 = 1;

/// File name of the artifact inside the application directory.
pub const ARTIFACT_FILE: &str = "quired.toml";

/// File name of the PID file the supervisor writes on successful bind.
pub const PID_FILE: &str = "quired.pid";

/// Log file used when the supervisor is spawned detached.
pub const LOG_FILE: &str = "quired.log";

/// Exit code the supervisor uses when the address is already bound by
/// another process (EADDRINUSE).
pub const EXIT_PORT_IN_USE: i32 = 98;

/// Security-protocol identifier embedded in secure-mode listen sections.
pub const TLS_PROTOCOL: &str = "ssl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub version: u32,

    /// Literal identity line, exactly [`ServerIdentity::conf_line`]. Kept
    /// as one opaque field so the cross-instance text contract survives
    /// schema changes around it.
    pub identity: String,

    /// Absolute application directory.
    pub directory: PathBuf,

    /// Per-launch random value; the first auto-opened browser request
    /// presents it to bypass one login prompt.
    pub startup_token: String,

    pub listen: ListenConfig,
    pub app: AppConfig,
    pub viewer: ViewerConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    pub interface: String,
    pub port: u16,
    pub secure: bool,

    /// Present only in secure mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Always [`TLS_PROTOCOL`].
    pub protocol: String,
    pub private_key: PathBuf,
    pub certificate: PathBuf,
}

/// Application options passed through to the served process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub require_login: bool,
    pub idle_timeout: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_pool: Option<String>,

    pub ulimit: String,
}

/// Whether and where the supervisor opens a browser once the socket is
/// bound. Opening from the supervisor side avoids racing the bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub open_browser: bool,

    /// Path opened first, e.g. `/?startup_token=<token>`.
    pub start_path: String,

    /// Second page opened after login when an upload was requested
    /// alongside a login-required launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_login_path: Option<String>,
}

/// The shutdown hook contract: on termination the supervisor must tell the
/// application to halt active sub-sessions and persist its state, in that
/// order, before exiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    pub quit_sessions: bool,
    pub save_state: bool,
}

impl SupervisorConfig {
    /// The identity triple recovered from the embedded literal line.
    pub fn server_identity(&self) -> Option<ServerIdentity> {
        ServerIdentity::scan(&self.identity)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(port: u16, secure: bool) -> SupervisorConfig {
        let identity = ServerIdentity::new("localhost", port, secure);
        SupervisorConfig {
            version: ARTIFACT_VERSION,
            identity: identity.conf_line(),
            directory: PathBuf::from("/home/user/.quire/workbook"),
            startup_token: "00c0ffee00c0ffee00c0ffee00c0ffee".to_string(),
            listen: ListenConfig {
                interface: identity.interface.clone(),
                port,
                secure,
                tls: secure.then(|| TlsConfig {
                    protocol: TLS_PROTOCOL.to_string(),
                    private_key: PathBuf::from("/home/user/.quire/tls/private.pem"),
                    certificate: PathBuf::from("/home/user/.quire/tls/public.pem"),
                }),
            },
            app: AppConfig {
                require_login: true,
                idle_timeout: 0,
                server_pool: None,
                ulimit: String::new(),
            },
            viewer: ViewerConfig {
                open_browser: true,
                start_path: "/?startup_token=00c0ffee00c0ffee00c0ffee00c0ffee".to_string(),
                post_login_path: None,
            },
            shutdown: ShutdownConfig {
                quit_sessions: true,
                save_state: true,
            },
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = sample(8080, true);
        let text = config.to_toml_string().unwrap();
        let parsed = SupervisorConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_identical_inputs_render_identically() {
        let a = sample(8080, false).to_toml_string().unwrap();
        let b = sample(8080, false).to_toml_string().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_port_change_touches_only_port_bearing_lines() {
        let a = sample(9000, false).to_toml_string().unwrap();
        let b = sample(9001, false).to_toml_string().unwrap();

        let differing: Vec<(&str, &str)> = a
            .lines()
            .zip(b.lines())
            .filter(|(left, right)| left != right)
            .collect();
        assert_eq!(a.lines().count(), b.lines().count());
        assert!(!differing.is_empty());
        for (left, right) in differing {
            assert!(left.contains("9000"), "unexpected diff line: {left}");
            assert!(right.contains("9001"), "unexpected diff line: {right}");
        }
    }

    #[test]
    fn test_identity_survives_round_trip() {
        let config = sample(8443, true);
        let text = config.to_toml_string().unwrap();
        let parsed = SupervisorConfig::from_toml_str(&text).unwrap();
        assert_eq!(
            parsed.server_identity(),
            Some(ServerIdentity::new("localhost", 8443, true))
        );
    }

    #[test]
    fn test_secure_config_embeds_protocol_and_cert_paths() {
        let text = sample(8443, true).to_toml_string().unwrap();
        assert!(text.contains("[listen.tls]"));
        assert!(text.contains("protocol = \"ssl\""));
        assert!(text.contains("private.pem"));
        assert!(text.contains("public.pem"));
    }

    #[test]
    fn test_insecure_config_omits_tls_table() {
        let text = sample(8080, false).to_toml_string().unwrap();
        assert!(!text.contains("[listen.tls]"));
        assert!(!text.contains("protocol"));
    }
}

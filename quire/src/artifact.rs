//! Renders the supervisor launch artifact from resolved launch options.
//!
//! The artifact is the only channel between `quire` and `quired`: everything
//! the supervisor needs (listen identity, TLS material, viewer instructions,
//! shutdown policy) is written into one TOML document, fully overwriting any
//! artifact left behind by a previous launch.

use std::path::{Path, PathBuf};

use quire_core::{
    AppConfig, ListenConfig, ServerIdentity, ShutdownConfig, SupervisorConfig, TLS_PROTOCOL,
    TlsConfig, ViewerConfig,
};

use crate::launch::LaunchOptions;
use crate::tls::CertificateMaterial;

/// Bytes of entropy behind each startup token. Hex-encoded, so the token
/// string is twice this length.
const STARTUP_TOKEN_BYTES: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to generate startup token: {0}")]
    Token(String),
    #[error("failed to encode launch artifact: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("failed to write launch artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// One-shot secret the viewer presents to skip the login form on first
/// contact. Regenerated on every launch.
pub fn generate_startup_token() -> Result<String> {
    let mut bytes = [0u8; STARTUP_TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| ArtifactError::Token(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Relative path that asks the server to import a workbook file on arrival.
pub fn upload_redirect_path(upload: &Path) -> String {
    let raw = upload.to_string_lossy();
    format!("/upload_workbook?url=file://{}", urlencoding::encode(&raw))
}

/// Builds the artifact document for one launch. Pure assembly; nothing here
/// touches the filesystem.
pub fn render(
    options: &LaunchOptions,
    identity: &ServerIdentity,
    material: Option<&CertificateMaterial>,
    startup_token: &str,
) -> SupervisorConfig {
    let tls = material.map(|m| TlsConfig {
        protocol: TLS_PROTOCOL.to_string(),
        private_key: m.key_path.clone(),
        certificate: m.cert_path.clone(),
    });

    let (start_path, post_login_path) = viewer_paths(options, startup_token);

    SupervisorConfig {
        version: quire_core::ARTIFACT_VERSION,
        identity: identity.conf_line(),
        directory: options.directory.clone(),
        startup_token: startup_token.to_string(),
        listen: ListenConfig {
            interface: identity.interface.clone(),
            port: identity.port,
            secure: identity.secure,
            tls,
        },
        app: AppConfig {
            require_login: options.require_login,
            idle_timeout: options.timeout,
            server_pool: options.server_pool.clone(),
            ulimit: options.ulimit.clone(),
        },
        viewer: ViewerConfig {
            open_browser: options.open_viewer || options.upload.is_some(),
            start_path,
            post_login_path,
        },
        shutdown: ShutdownConfig {
            quit_sessions: true,
            save_state: true,
        },
    }
}

// With login enabled the viewer must enter through the token URL, so an
// upload becomes the post-login destination instead of the landing page.
fn viewer_paths(options: &LaunchOptions, startup_token: &str) -> (String, Option<String>) {
    if options.require_login {
        let start = format!("/?startup_token={startup_token}");
        let post = options.upload.as_deref().map(upload_redirect_path);
        (start, post)
    } else if let Some(upload) = &options.upload {
        (upload_redirect_path(upload), None)
    } else if options.start_path.is_empty() {
        ("/".to_string(), None)
    } else {
        (options.start_path.clone(), None)
    }
}

/// Writes the artifact, truncating whatever a previous launch left there.
pub fn write(config: &SupervisorConfig, path: &Path) -> Result<()> {
    let rendered = config.to_toml_string()?;
    std::fs::write(path, rendered).map_err(|source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("wrote launch artifact {}", path.display());
    Ok(())
}

//! Certificate provisioning through external tools.
//!
//! Secure mode needs a private key and a self-signed certificate on disk.
//! Generation is delegated to whichever of two tool families is installed:
//! GnuTLS `certtool` (template-file driven) or `openssl`. Key generation
//! prefers openssl when both exist since it is much faster; self-signing
//! prefers certtool. Neither tool present is a precondition failure.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::output;
use crate::prompt::Prompter;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error(
        "Neither certtool nor openssl was found on PATH. Install one of them to use the secure server."
    )]
    ToolMissing,

    #[error("Certificate generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk key/certificate pair plus the template used to produce it.
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub template_path: PathBuf,
}

impl CertificateMaterial {
    /// Material under the given directory, with the fixed file names the
    /// rest of the system expects.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            key_path: dir.join("private.pem"),
            cert_path: dir.join("public.pem"),
            template_path: dir.join("cert.cfg"),
        }
    }

    /// Both output files exist. The template alone does not count.
    pub fn exists(&self) -> bool {
        self.key_path.exists() && self.cert_path.exists()
    }
}

/// Discovered external tool executables.
#[derive(Debug, Clone)]
pub struct CertTools {
    certtool: Option<PathBuf>,
    openssl: Option<PathBuf>,
}

impl CertTools {
    pub fn discover() -> Self {
        Self {
            certtool: which::which("certtool").ok(),
            openssl: which::which("openssl").ok(),
        }
    }

    pub fn available(&self) -> bool {
        self.certtool.is_some() || self.openssl.is_some()
    }
}

/// Subject and validity settings for one self-signed certificate.
#[derive(Debug, Clone)]
pub struct CertTemplate {
    pub common_name: String,
    pub organization: String,
    pub unit: String,
    pub state: String,
    pub country: String,
    pub uid: String,
    pub email: String,
    pub serial: u32,
    pub expiration_days: u32,
}

impl CertTemplate {
    pub fn for_domain(domain: &str) -> Result<Self, TlsError> {
        Ok(Self {
            common_name: domain.to_string(),
            organization: format!("Quire (at {domain})"),
            unit: "389".to_string(),
            state: "Washington".to_string(),
            country: "US".to_string(),
            uid: "quire_user".to_string(),
            email: "dev@quire.sh".to_string(),
            serial: random_serial()?,
            expiration_days: 10_000,
        })
    }

    /// certtool template syntax: quoted strings, bare numbers, usage flags
    /// as bare lines.
    pub fn render_certtool(&self) -> String {
        format!(
            "organization = \"{}\"\n\
             unit = \"{}\"\n\
             state = \"{}\"\n\
             country = \"{}\"\n\
             cn = \"{}\"\n\
             uid = \"{}\"\n\
             serial = {}\n\
             expiration_days = {}\n\
             email = \"{}\"\n\
             tls_www_server\n\
             signing_key\n\
             encryption_key\n",
            self.organization,
            self.unit,
            self.state,
            self.country,
            self.common_name,
            self.uid,
            self.serial,
            self.expiration_days,
            self.email,
        )
    }

    /// Equivalent subject for `openssl req -subj`.
    pub fn subject_line(&self) -> String {
        format!(
            "/C={}/ST={}/O={}/OU={}/CN={}/emailAddress={}",
            self.country, self.state, self.organization, self.unit, self.common_name, self.email,
        )
    }
}

/// Random serial in 1..2^31.
fn random_serial() -> Result<u32, TlsError> {
    let mut bytes = [0u8; 4];
    getrandom::fill(&mut bytes)
        .map_err(|e| TlsError::Generation(format!("entropy source unavailable: {e}")))?;
    Ok((u32::from_le_bytes(bytes) & 0x7fff_ffff).max(1))
}

/// Interactive provisioning flow: collect the subject domain, write the
/// template, generate the key, self-sign the certificate, lock down the
/// key permissions.
///
/// Does not check for existing files; the launcher skips the whole call
/// when [`CertificateMaterial::exists`] already holds.
pub fn provision(
    material: &CertificateMaterial,
    prompter: &mut dyn Prompter,
) -> Result<(), TlsError> {
    let tools = CertTools::discover();
    if !tools.available() {
        return Err(TlsError::ToolMissing);
    }

    if let Some(parent) = material.key_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut domain = prompter.input("Domain name", Some("localhost"))?;
    domain = domain.trim().to_string();
    if domain.is_empty() {
        output::muted("Using default localhost");
        domain = "localhost".to_string();
    }

    let template = CertTemplate::for_domain(&domain)?;
    std::fs::write(&material.template_path, template.render_certtool())?;

    generate_key(&tools, &material.key_path)?;
    self_sign(&tools, material, &template)?;

    if !material.exists() {
        return Err(TlsError::Generation(
            "tool reported success but output files are missing".to_string(),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&material.key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(
        key_path = %material.key_path.display(),
        cert_path = %material.cert_path.display(),
        domain = %domain,
        "Provisioned self-signed certificate"
    );

    Ok(())
}

fn generate_key(tools: &CertTools, key_path: &Path) -> Result<(), TlsError> {
    // openssl is vastly faster at RSA key generation than certtool.
    if let Some(openssl) = &tools.openssl {
        output::step("Using openssl to generate key");
        let mut cmd = Command::new(openssl);
        cmd.args(["genrsa", "-out"]).arg(key_path);
        return run_tool(cmd);
    }

    let certtool = tools.certtool.as_ref().ok_or(TlsError::ToolMissing)?;
    output::step("Using certtool to generate key");
    let mut cmd = Command::new(certtool);
    cmd.arg("--generate-privkey").arg("--outfile").arg(key_path);
    run_tool(cmd)
}

fn self_sign(
    tools: &CertTools,
    material: &CertificateMaterial,
    template: &CertTemplate,
) -> Result<(), TlsError> {
    if let Some(certtool) = &tools.certtool {
        let mut cmd = Command::new(certtool);
        cmd.arg("--generate-self-signed")
            .arg("--template")
            .arg(&material.template_path)
            .arg("--load-privkey")
            .arg(&material.key_path)
            .arg("--outfile")
            .arg(&material.cert_path);
        return run_tool(cmd);
    }

    let openssl = tools.openssl.as_ref().ok_or(TlsError::ToolMissing)?;
    let mut cmd = Command::new(openssl);
    cmd.args(["req", "-new", "-x509"])
        .arg("-key")
        .arg(&material.key_path)
        .arg("-out")
        .arg(&material.cert_path)
        .arg("-days")
        .arg(template.expiration_days.to_string())
        .arg("-subj")
        .arg(template.subject_line());
    run_tool(cmd)
}

fn run_tool(mut cmd: Command) -> Result<(), TlsError> {
    tracing::debug!(command = ?cmd, "running certificate tool");
    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(TlsError::Generation(format!(
            "{:?} exited with {}: {}",
            cmd.get_program(),
            output.status,
            tail.join(" / ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use tempfile::TempDir;

    #[test]
    fn material_uses_fixed_file_names() {
        let material = CertificateMaterial::in_dir(Path::new("/home/user/.quire/tls"));
        assert_eq!(
            material.key_path,
            Path::new("/home/user/.quire/tls/private.pem")
        );
        assert_eq!(
            material.cert_path,
            Path::new("/home/user/.quire/tls/public.pem")
        );
        assert_eq!(
            material.template_path,
            Path::new("/home/user/.quire/tls/cert.cfg")
        );
    }

    #[test]
    fn material_exists_requires_both_output_files() {
        let temp = TempDir::new().unwrap();
        let material = CertificateMaterial::in_dir(temp.path());
        assert!(!material.exists());

        std::fs::write(&material.key_path, "key").unwrap();
        assert!(!material.exists());

        std::fs::write(&material.cert_path, "cert").unwrap();
        assert!(material.exists());
    }

    #[test]
    fn template_renders_certtool_syntax() {
        let mut template = CertTemplate::for_domain("example.org").unwrap();
        template.serial = 42;

        let rendered = template.render_certtool();
        assert!(rendered.contains("organization = \"Quire (at example.org)\"\n"));
        assert!(rendered.contains("cn = \"example.org\"\n"));
        assert!(rendered.contains("serial = 42\n"));
        assert!(rendered.contains("expiration_days = 10000\n"));
        assert!(rendered.contains("\ntls_www_server\n"));
        assert!(rendered.contains("\nsigning_key\n"));
        assert!(rendered.contains("\nencryption_key\n"));
    }

    #[test]
    fn template_serial_is_positive_31_bit() {
        for _ in 0..32 {
            let template = CertTemplate::for_domain("localhost").unwrap();
            assert!(template.serial >= 1);
            assert!(template.serial < 1 << 31);
        }
    }

    #[test]
    fn subject_line_carries_common_name() {
        let template = CertTemplate::for_domain("example.org").unwrap();
        let subject = template.subject_line();
        assert!(subject.contains("/CN=example.org"));
        assert!(subject.starts_with("/C=US/ST=Washington"));
    }

    #[test]
    fn provision_fails_without_tools_before_touching_files() {
        let _lock = crate::paths::test_env_lock();
        let previous = std::env::var_os("PATH");
        let temp = TempDir::new().unwrap();
        // Empty PATH so neither tool family resolves.
        unsafe {
            std::env::set_var("PATH", temp.path());
        }

        let material = CertificateMaterial::in_dir(&temp.path().join("tls"));
        let mut prompter = ScriptedPrompter::new(["localhost"]);
        let result = provision(&material, &mut prompter);

        match previous {
            Some(value) => unsafe { std::env::set_var("PATH", value) },
            None => unsafe { std::env::remove_var("PATH") },
        }

        assert!(matches!(result, Err(TlsError::ToolMissing)));
        assert!(!temp.path().join("tls").exists());
        assert_eq!(prompter.remaining(), 1);
    }

    #[test]
    fn provision_generates_material_when_a_tool_is_installed() {
        // Exercises the real external tools; skipped where neither exists.
        if !CertTools::discover().available() {
            return;
        }

        let temp = TempDir::new().unwrap();
        let material = CertificateMaterial::in_dir(temp.path());
        let mut prompter = ScriptedPrompter::new([""]);

        provision(&material, &mut prompter).unwrap();

        assert!(material.exists());
        let cert = std::fs::read_to_string(&material.cert_path).unwrap();
        assert!(cert.contains("BEGIN CERTIFICATE"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&material.key_path)
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}

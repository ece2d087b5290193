//! Resolved server identity and its one-line text form.
//!
//! The text form is the only cross-instance protocol: a newly started
//! launcher discovers an already-running instance's settings by scanning
//! that instance's previously written artifact for this exact pattern.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The resolved (interface, port, secure) triple for one server instance,
/// either the one about to start or one discovered already running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Hostname or the literal "localhost".
    pub interface: String,
    /// Listening port, 1-65535.
    pub port: u16,
    /// Whether the instance listens with transport encryption.
    pub secure: bool,
}

impl ServerIdentity {
    pub fn new(interface: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            interface: interface.into(),
            port,
            secure,
        }
    }

    /// The literal one-line form embedded in every artifact:
    /// `interface="<value>",port=<digits>,secure=<True|False>`.
    ///
    /// Writers must preserve this exact shape; [`ServerIdentity::scan`]
    /// depends on it for cross-instance detection.
    pub fn conf_line(&self) -> String {
        format!(
            "interface=\"{}\",port={},secure={}",
            self.interface,
            self.port,
            if self.secure { "True" } else { "False" }
        )
    }

    /// Recovers an identity by scanning arbitrary artifact text for the
    /// [`conf_line`](Self::conf_line) pattern.
    ///
    /// Returns `None` on any mismatch. A prior instance whose artifact
    /// cannot be parsed has unknown settings; that is degraded state for
    /// the caller, never an error.
    pub fn scan(text: &str) -> Option<Self> {
        let start = text.find("interface=\"")?;
        let rest = &text[start + "interface=\"".len()..];
        let close = rest.find('"')?;
        let interface = &rest[..close];
        let rest = rest[close + 1..].strip_prefix(",port=")?;
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let port: u16 = rest[..digits].parse().ok()?;
        if port == 0 {
            return None;
        }
        let rest = rest[digits..].strip_prefix(",secure=")?;
        let secure = if rest.starts_with("True") {
            true
        } else if rest.starts_with("False") {
            false
        } else {
            return None;
        };
        Some(Self::new(interface, port, secure))
    }

    /// Base URL of the instance, e.g. `https://localhost:8080/`.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/",
            if self.secure { "https" } else { "http" },
            self.interface,
            self.port
        )
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.conf_line())
    }
}

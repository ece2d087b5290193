//! Administrative accounts: the account-store seam the served application
//! exposes, the file-backed registry implementing it, the admin credential
//! policy, and the startup migrations.

mod credentials;
mod migrations;
mod registry;

pub use credentials::*;
pub use migrations::*;
pub use registry::*;

use std::path::PathBuf;
use thiserror::Error;

/// Well-known name of the administrative account.
pub const ADMIN_USER: &str = "admin";

/// Shortest password the setup flow accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Account errors
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account '{0}' already exists")]
    AlreadyExists(String),

    #[error("Account '{0}' does not exist")]
    NoSuchUser(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Failed to read account registry {}: {}", .0.display(), .1)]
    RegistryRead(PathBuf, std::io::Error),

    #[error("Failed to write account registry {}: {}", .0.display(), .1)]
    RegistryWrite(PathBuf, std::io::Error),

    #[error("Malformed account registry {}: {}", .0.display(), .1)]
    RegistryParse(PathBuf, toml::de::Error),

    #[error("Failed to serialize account registry: {0}")]
    RegistrySerialize(#[from] toml::ser::Error),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AccountError>;

/// The user-account capability the served application exposes. The
/// launcher only ever talks to accounts through this seam.
pub trait AccountStore {
    fn user_exists(&self, name: &str) -> bool;

    fn create_user(&mut self, name: &str, password: &str) -> Result<()>;

    fn set_password(&mut self, name: &str, password: &str) -> Result<()>;

    /// First-run account set: the admin account with the given password
    /// plus the locked system accounts.
    fn create_default_users(&mut self, admin_password: &str) -> Result<()>;

    /// Creates `name` carrying `other`'s password hash unchanged.
    fn create_user_with_same_password(&mut self, name: &str, other: &str) -> Result<()>;

    fn save(&self) -> Result<()>;
}

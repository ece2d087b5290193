//! File-backed account registry.
//!
//! Accounts live in `users.toml` inside the application directory, one
//! record per account holding only the Argon2id password hash. An empty
//! hash marks a locked system account that no password can log into.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ADMIN_USER, AccountError, AccountStore, Result};

/// Registry file name inside the application directory.
pub const REGISTRY_FILE: &str = "users.toml";

/// Locked accounts created alongside admin on first run.
const SYSTEM_USERS: &[&str] = &["guest", "pub"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct UserRecord {
    password_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
}

#[derive(Debug)]
pub struct UserRegistry {
    path: PathBuf,
    users: BTreeMap<String, UserRecord>,
}

impl UserRegistry {
    /// Loads the registry for an application directory, starting empty
    /// when no registry file exists yet.
    pub fn load(directory: &Path) -> Result<Self> {
        let path = directory.join(REGISTRY_FILE);
        let users = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let file: RegistryFile = toml::from_str(&text)
                    .map_err(|e| AccountError::RegistryParse(path.clone(), e))?;
                file.users
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(AccountError::RegistryRead(path.clone(), e)),
        };
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a pre-computed hash, used by the legacy-backup import.
    pub fn insert_hash(&mut self, name: &str, password_hash: String) -> Result<()> {
        if self.users.contains_key(name) {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }
        self.users.insert(name.to_string(), UserRecord { password_hash });
        Ok(())
    }

    pub fn password_hash(&self, name: &str) -> Option<&str> {
        self.users.get(name).map(|r| r.password_hash.as_str())
    }

    /// Checks a candidate password. Locked accounts never verify.
    pub fn verify_password(&self, name: &str, password: &str) -> bool {
        match self.password_hash(name) {
            Some(hash) if !hash.is_empty() => verify_hash(hash, password),
            _ => false,
        }
    }
}

impl AccountStore for UserRegistry {
    fn user_exists(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    fn create_user(&mut self, name: &str, password: &str) -> Result<()> {
        if self.users.contains_key(name) {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }
        let password_hash = hash_password(password)?;
        self.users.insert(name.to_string(), UserRecord { password_hash });
        Ok(())
    }

    fn set_password(&mut self, name: &str, password: &str) -> Result<()> {
        let record = self
            .users
            .get_mut(name)
            .ok_or_else(|| AccountError::NoSuchUser(name.to_string()))?;
        record.password_hash = hash_password(password)?;
        Ok(())
    }

    fn create_default_users(&mut self, admin_password: &str) -> Result<()> {
        self.create_user(ADMIN_USER, admin_password)?;
        for name in SYSTEM_USERS {
            if !self.users.contains_key(*name) {
                self.users.insert(
                    (*name).to_string(),
                    UserRecord {
                        password_hash: String::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn create_user_with_same_password(&mut self, name: &str, other: &str) -> Result<()> {
        if self.users.contains_key(name) {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }
        let hash = self
            .users
            .get(other)
            .ok_or_else(|| AccountError::NoSuchUser(other.to_string()))?
            .password_hash
            .clone();
        self.users.insert(name.to_string(), UserRecord { password_hash: hash });
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AccountError::RegistryWrite(self.path.clone(), e))?;
        }
        let file = RegistryFile {
            users: self.users.clone(),
        };
        let text = toml::to_string(&file)?;
        std::fs::write(&self.path, text)
            .map_err(|e| AccountError::RegistryWrite(self.path.clone(), e))?;
        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};

    let mut salt_bytes = [0u8; 16];
    getrandom::fill(&mut salt_bytes).map_err(|e| AccountError::Hash(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AccountError::Hash(e.to_string()))?;

    let hash = argon2::Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AccountError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_hash(hash: &str, password: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    argon2::Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

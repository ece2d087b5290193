//! Startup migrations.
//!
//! Each step is independently testable and guarded by idempotent existence
//! checks; running them again is always a no-op.

use std::path::Path;

use crate::output;

use super::{ADMIN_USER, AccountError, AccountStore, Result, UserRegistry};

/// Line-oriented account backup written by older releases.
pub const LEGACY_REGISTRY_FILE: &str = "users-legacy.bak";

/// Runs all startup migrations against the registry of one application
/// directory.
pub fn run_startup_migrations(registry: &mut UserRegistry, directory: &Path) -> Result<()> {
    if migrate_root_to_admin(registry)? {
        tracing::info!("migrated root account credentials to admin");
    }
    if import_legacy_registry(registry, directory)? {
        output::success("Updating to new format complete.");
    }
    Ok(())
}

/// One very old release shipped the administrative account under the name
/// "root". Copy its password hash over to "admin" when only "root" exists.
/// The escalated old account is left in place; deleting it is deferred.
///
/// Returns whether anything changed.
pub fn migrate_root_to_admin(store: &mut dyn AccountStore) -> Result<bool> {
    if !store.user_exists("root") || store.user_exists(ADMIN_USER) {
        return Ok(false);
    }
    store.create_user_with_same_password(ADMIN_USER, "root")?;
    store.save()?;
    Ok(true)
}

/// Older releases kept accounts in a `name:hash` line file. Import every
/// entry that does not collide with a current account, then delete the
/// backup so the import runs at most once.
///
/// Returns whether a backup file was consumed.
pub fn import_legacy_registry(registry: &mut UserRegistry, directory: &Path) -> Result<bool> {
    let path = directory.join(LEGACY_REGISTRY_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(AccountError::RegistryRead(path, e)),
    };

    let mut imported = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, hash)) = line.split_once(':') else {
            tracing::warn!(line, "skipping unrecognized legacy registry line");
            continue;
        };
        let name = name.trim();
        if name.is_empty() || registry.user_exists(name) {
            continue;
        }
        registry.insert_hash(name, hash.trim().to_string())?;
        imported += 1;
    }

    registry.save()?;
    std::fs::remove_file(&path).map_err(|e| AccountError::RegistryWrite(path, e))?;
    tracing::info!(imported, "imported legacy account registry");
    Ok(true)
}

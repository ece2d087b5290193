//! Admin credential policy: first-run setup and explicit reset.

use crate::output;
use crate::prompt::Prompter;

use super::{ADMIN_USER, AccountStore, MIN_PASSWORD_LENGTH, Result};

/// Makes sure a usable admin account exists before a login-required server
/// starts.
///
/// A missing admin forces setup regardless of `reset_requested`; an
/// existing admin is only touched when a reset was asked for. Policy
/// violations (short password, mismatched confirmation) are handled by
/// re-prompting and never escalate; store and prompt failures do.
pub fn ensure_admin(
    store: &mut dyn AccountStore,
    reset_requested: bool,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    let admin_exists = store.user_exists(ADMIN_USER);
    if admin_exists && !reset_requested {
        return Ok(());
    }

    let password = collect_admin_password(prompter)?;
    if admin_exists {
        store.set_password(ADMIN_USER, &password)?;
        output::success("Password changed for user 'admin'.");
    } else {
        store.create_default_users(&password)?;
        output::success("User admin created with the password you specified.");
    }
    store.save()?;

    output::muted("Please login with the username 'admin' and the above password.");
    Ok(())
}

/// Double-entry password collection. Loops until an acceptable pair is
/// entered; the plaintext lives only in the returned value.
fn collect_admin_password(prompter: &mut dyn Prompter) -> Result<String> {
    output::section("Admin password");
    output::muted("Please choose a new password for the 'admin' user.");
    output::muted("Do not choose a password someone could guess; anybody who can log in as admin can access or delete your files.");
    output::muted("Only a one-way hash of the password you type is stored.");
    output::muted("You can change the password later by rerunning with --reset.");

    loop {
        let password = prompter.password("Enter new password:")?;
        if password.len() < MIN_PASSWORD_LENGTH {
            output::warning(&format!(
                "That password is way too short. Enter a password with at least {MIN_PASSWORD_LENGTH} characters."
            ));
            continue;
        }
        let confirmation = prompter.password("Retype new password:")?;
        if password != confirmation {
            output::warning("Sorry, passwords do not match.");
            continue;
        }
        return Ok(password);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::UserRegistry;
    use crate::prompt::ScriptedPrompter;
    use tempfile::TempDir;

    #[test]
    fn missing_admin_forces_setup_without_reset_flag() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();
        let mut prompter = ScriptedPrompter::new(["hunter22", "hunter22"]);

        ensure_admin(&mut registry, false, &mut prompter).unwrap();

        assert!(registry.user_exists("admin"));
        assert!(registry.verify_password("admin", "hunter22"));
        assert_eq!(prompter.remaining(), 0);

        // The registry was persisted, not just mutated in memory.
        let reloaded = UserRegistry::load(temp.path()).unwrap();
        assert!(reloaded.verify_password("admin", "hunter22"));
    }

    #[test]
    fn existing_admin_is_untouched_without_reset() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();
        registry.create_user("admin", "hunter22").unwrap();

        // No scripted responses: any prompt would fail the test.
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        ensure_admin(&mut registry, false, &mut prompter).unwrap();

        assert!(registry.verify_password("admin", "hunter22"));
    }

    #[test]
    fn reset_changes_the_existing_admin_password() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();
        registry.create_user("admin", "oldpassword").unwrap();

        let mut prompter = ScriptedPrompter::new(["newpassword", "newpassword"]);
        ensure_admin(&mut registry, true, &mut prompter).unwrap();

        assert!(!registry.verify_password("admin", "oldpassword"));
        assert!(registry.verify_password("admin", "newpassword"));
    }

    #[test]
    fn short_passwords_are_rejected_until_long_enough() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();

        // Two rejected attempts, then an accepted pair.
        let mut prompter = ScriptedPrompter::new(["abc", "12345", "hunter22", "hunter22"]);
        ensure_admin(&mut registry, false, &mut prompter).unwrap();

        assert!(registry.verify_password("admin", "hunter22"));
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn mismatched_confirmation_rejects_the_whole_pair() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();

        let mut prompter =
            ScriptedPrompter::new(["hunter22", "hunter23", "correcthorse", "correcthorse"]);
        ensure_admin(&mut registry, false, &mut prompter).unwrap();

        assert!(!registry.verify_password("admin", "hunter22"));
        assert!(registry.verify_password("admin", "correcthorse"));
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn exactly_minimum_length_is_accepted() {
        let temp = TempDir::new().unwrap();
        let mut registry = UserRegistry::load(temp.path()).unwrap();

        let mut prompter = ScriptedPrompter::new(["sixsix", "sixsix"]);
        ensure_admin(&mut registry, false, &mut prompter).unwrap();

        assert!(registry.verify_password("admin", "sixsix"));
    }
}

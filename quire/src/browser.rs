//! Opens URLs in the user's page viewer.

use crate::output;

/// Environment override naming a browser command to run instead of the
/// platform opener. Invoked as `<command> <url>`.
pub const BROWSER_ENV: &str = "QUIRE_BROWSER";

/// Best-effort browser launch. A failed open is reported and swallowed;
/// the server is still reachable by pasting the printed URL.
pub fn open_page(url: &str) {
    if let Ok(command) = std::env::var(BROWSER_ENV)
        && !command.is_empty()
    {
        tracing::debug!("opening {url} with {command}");
        match std::process::Command::new(&command).arg(url).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                output::warning(&format!("Browser command '{command}' exited with {status}."));
            }
            Err(e) => {
                output::warning(&format!("Could not run browser command '{command}': {e}"));
            }
        }
        return;
    }

    if let Err(e) = open::that(url) {
        output::warning(&format!("Could not open a web browser: {e}"));
    }
}

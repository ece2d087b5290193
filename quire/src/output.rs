use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use console::{Term, style};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

pub fn section(title: &str) {
    println!();
    println!("{}", style(title).cyan().bold());
}

pub fn step(message: &str) {
    println!("{} {}", style("•").cyan().bold(), message);
}

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

pub fn muted(message: &str) {
    println!("{}", style(message).dim());
}

/// Read one line of input. Falls back to `default` when no terminal is
/// attached; errors `Unsupported` when there is no terminal and no default.
pub fn prompt_input(
    prompt: &str,
    allow_empty: bool,
    default: Option<&str>,
) -> std::io::Result<String> {
    if !is_interactive() {
        return match default {
            Some(value) => Ok(value.to_string()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "Input prompt requires an interactive terminal",
            )),
        };
    }

    let term = Term::stderr();
    match default {
        Some(value) => term.write_str(&format!(
            "{} {} ",
            style(prompt).cyan().bold(),
            style(format!("[{value}]")).dim()
        ))?,
        None => term.write_str(&format!("{} ", style(prompt).cyan().bold()))?,
    }

    let line = term.read_line()?;
    let value = line.trim();
    if value.is_empty() {
        if let Some(default) = default {
            return Ok(default.to_string());
        }
        if allow_empty {
            return Ok(String::new());
        }
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Input cannot be empty",
        ));
    }

    Ok(value.to_string())
}

/// Read a password with echo suppressed. Password entry cannot fall back to
/// a default, so a missing terminal is an error.
pub fn prompt_password(prompt: &str) -> std::io::Result<String> {
    if !is_interactive() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Password prompt requires an interactive terminal",
        ));
    }

    let term = Term::stderr();
    term.write_str(&format!("{} ", style(prompt).cyan().bold()))?;
    term.read_secure_line()
}

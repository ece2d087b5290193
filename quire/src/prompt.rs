//! Injected prompt capability so interactive flows stay testable.

use std::io;

/// Interactive input seam. Core flows (credential setup, certificate
/// subject entry) take a prompter instead of reading the terminal
/// directly, so they can run under test without a TTY.
pub trait Prompter {
    /// One line of visible input; an empty submission resolves to
    /// `default` when one is given.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> io::Result<String>;

    /// One line with echo suppressed.
    fn password(&mut self, prompt: &str) -> io::Result<String>;
}

/// Prompter backed by the real terminal.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> io::Result<String> {
        crate::output::prompt_input(prompt, false, default)
    }

    fn password(&mut self, prompt: &str) -> io::Result<String> {
        crate::output::prompt_password(prompt)
    }
}

/// Replays a fixed sequence of responses, one per prompt.
#[cfg(test)]
pub(crate) struct ScriptedPrompter {
    responses: std::collections::VecDeque<String>,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub(crate) fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.responses.len()
    }

    fn next(&mut self, prompt: &str) -> io::Result<String> {
        self.responses
            .pop_front()
            .ok_or_else(|| io::Error::other(format!("no scripted response for prompt: {prompt}")))
    }
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> io::Result<String> {
        let value = self.next(prompt)?;
        if value.is_empty()
            && let Some(default) = default
        {
            return Ok(default.to_string());
        }
        Ok(value)
    }

    fn password(&mut self, prompt: &str) -> io::Result<String> {
        self.next(prompt)
    }
}

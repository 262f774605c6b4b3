//! Enriched CLI error: message + context + suggestions.

use console::style;
use std::fmt;

pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), context: None, suggestions: Vec::new() }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}", style("\u{2717}").red().bold(), style(&self.message).red().bold());
        if let Some(context) = &self.context {
            eprintln!("{context}");
        }
        for (i, suggestion) in self.suggestions.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, suggestion);
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn index_not_found() -> CliError {
    CliError::new("not a DroneDB index")
        .with_context("No .ddb directory was found at or above the current directory.")
        .with_suggestion("Initialize one: ddb init")
}

/// Converts an `anyhow::Error` (which usually wraps a `DdbError`) into a
/// `CliError`, adding a suggestion for the error kinds that have an
/// obvious fix.
pub fn from_anyhow(error: anyhow::Error) -> CliError {
    let message = error.to_string();
    if message.contains("no .ddb") || message.contains("no such entry") {
        CliError::new(message).with_suggestion("Check the path and that `ddb add` has indexed it")
    } else if message.contains("build dependency missing") {
        CliError::new(message).with_suggestion("Add the missing sidecar file(s) and re-run `ddb build`")
    } else {
        CliError::new(message)
    }
}

//! Interactive confirmation before deploying past validation findings.

use std::io::{self, BufRead, IsTerminal};

use super::OutputManager;
use crate::pipeline::{ConfirmationGate, ValidationResult};

/// Asks on the terminal. Declines when stdin is not interactive.
#[derive(Debug, Clone)]
pub struct TerminalConfirmation {
    out: OutputManager,
}

impl TerminalConfirmation {
    /// Creates a gate that reports findings through `out`.
    pub fn new(out: OutputManager) -> Self {
        Self { out }
    }
}

impl ConfirmationGate for TerminalConfirmation {
    fn confirm(&self, validation: &ValidationResult) -> bool {
        let _ = self.out.section("Validation found problems");
        for error in &validation.errors {
            let _ = self.out.error(error);
        }
        for warning in &validation.warnings {
            let _ = self.out.warn(warning);
        }

        if !io::stdin().is_terminal() {
            let _ = self.out.warn("stdin is not a terminal; pass --yes to deploy anyway");
            return false;
        }

        let _ = self.out.prompt("Continue with deployment? [y/N] ");

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(e) => {
                log::warn!("Failed to read confirmation: {}", e);
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}

//! ui::prompts
//!
//! Interactive prompts and confirmations.
//!
//! # Design
//!
//! Prompts are only shown in interactive mode. In non-interactive mode,
//! operations requiring user input must either have defaults or fail
//! with a clear error message.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Interpret a yes/no answer. Empty input picks `default`.
fn parse_answer(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn confirm_with(
    message: &str,
    default: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{message} {hint}: ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(default);
        }
        if let Some(answer) = parse_answer(&line, default) {
            return Ok(answer);
        }
        writeln!(output, "Error: invalid input")?;
    }
}

/// Prompt for confirmation (yes/no) on stderr.
///
/// Returns `Err(PromptError::NotInteractive)` if not in interactive mode.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    confirm_with(message, default, &mut io::stdin().lock(), &mut io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(input: &str, default: bool) -> bool {
        let mut out = Vec::new();
        confirm_with("Remove?", default, &mut input.as_bytes(), &mut out).unwrap()
    }

    #[test]
    fn answers() {
        assert!(ask("y\n", false));
        assert!(!ask("no\n", true));
        assert!(ask("\n", true));
        assert!(!ask("", false));
        // Re-asks until the answer is understood
        assert!(ask("maybe\nyes\n", false));
    }

    #[test]
    fn non_interactive_fails() {
        assert!(matches!(
            confirm("x", true, false),
            Err(PromptError::NotInteractive)
        ));
    }
}

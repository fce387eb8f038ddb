//! The approval prompt.
//!
//! One request, one choice. The prompt writes to stderr only — stdout
//! belongs to the script — and reads its keystrokes from the stderr
//! terminal, which keeps prompts working inside `cmd | think ...`
//! pipelines where stdin is the pipe.

use std::path::Path;

use dialoguer::Select;
use dialoguer::console::Term;

use super::tty_lock::PromptLock;
use super::ApprovalError;
use crate::ui;

/// What the user chose for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Allow this one request; nothing is remembered.
    Once,
    /// Allow matching requests for the rest of this run.
    Session,
    /// Allow and persist to the thought policy.
    Always,
    /// Deny and persist to the thought policy.
    Deny,
}

/// Ask the user to approve one request.
///
/// `category` labels the request kind (net/read/write/delete/env); `detail`
/// is the host, path, or variable name. The prompt lock is held for the
/// whole interaction so concurrent invocations on the same terminal never
/// interleave.
pub fn ask(
    category: &str,
    detail: &str,
    locks_dir: Option<&Path>,
) -> Result<PromptOutcome, ApprovalError> {
    let _lock = match locks_dir {
        Some(dir) => Some(PromptLock::acquire(dir)?),
        None => None,
    };

    eprintln!(
        "\n{} {}",
        ui::warn(&format!("{category}:")),
        ui::dim(&truncate(detail, 200))
    );

    let choice = Select::new()
        .with_prompt("Allow this action?")
        .items(&[
            "Yes, once",
            "Yes, for this session",
            "Always (remember for this thought)",
            "No",
        ])
        .default(0)
        .interact_on_opt(&Term::stderr())
        .map_err(|e| match e {
            dialoguer::Error::IO(err) if err.kind() == std::io::ErrorKind::Interrupted => {
                ApprovalError::Interrupted
            }
            dialoguer::Error::IO(err) => ApprovalError::Io(err),
            // The error type is non-exhaustive; treat anything new as an
            // abandoned prompt.
            _ => ApprovalError::Interrupted,
        })?;

    match choice {
        Some(0) => Ok(PromptOutcome::Once),
        Some(1) => Ok(PromptOutcome::Session),
        Some(2) => Ok(PromptOutcome::Always),
        Some(3) => Ok(PromptOutcome::Deny),
        // Esc / q abandon the prompt.
        _ => Err(ApprovalError::Interrupted),
    }
}

/// Collapse newlines and bound the detail line so a hostile path can't
/// flood the terminal.
fn truncate(s: &str, max: usize) -> String {
    let s = s.replace('\n', "\\n");
    if s.len() <= max {
        return s;
    }
    let mut cut = max.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

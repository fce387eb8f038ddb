//! Stderr styling.
//!
//! All user-facing interpreter chrome (tool traces, approval prompts,
//! failure text) goes to stderr; stdout is reserved for script output.
//! Styling is suppressed when stderr is not a terminal or `NO_COLOR` is
//! set.

use std::io::IsTerminal;
use std::sync::OnceLock;

use anstyle::{AnsiColor, Color, Style};

fn color_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
    })
}

fn paint(text: &str, style: Style) -> String {
    if !color_enabled() {
        return text.to_string();
    }
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Dimmed secondary text (debug echo, details, failure text).
pub fn dim(text: &str) -> String {
    paint(text, Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

/// Attention-grabbing prompt header.
pub fn warn(text: &str) -> String {
    paint(
        text,
        Style::new()
            .fg_color(Some(Color::Ansi(AnsiColor::Yellow)))
            .bold(),
    )
}

/// Accent for tool and script activity markers.
pub fn accent(text: &str) -> String {
    paint(text, Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
}

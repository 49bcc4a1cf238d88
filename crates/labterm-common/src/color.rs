//! ANSI color helpers for CLI output.
//!
//! Colors are disabled globally via `init` (the `--no-color` flag or the
//! `NO_COLOR` environment variable).

use std::sync::atomic::{AtomicBool, Ordering};

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Set the global color-disable flag. Call once at startup.
pub fn init(no_color: bool) {
    let disabled = no_color || std::env::var_os("NO_COLOR").is_some();
    DISABLED.store(disabled, Ordering::Relaxed);
}

pub fn is_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed)
}

pub struct Colors;

impl Colors {
    fn wrap(code: &str, text: &str) -> String {
        if is_disabled() {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    pub fn error(text: &str) -> String {
        Self::wrap("31", text)
    }

    pub fn success(text: &str) -> String {
        Self::wrap("32", text)
    }

    pub fn warning(text: &str) -> String {
        Self::wrap("33", text)
    }

    pub fn dim(text: &str) -> String {
        Self::wrap("2", text)
    }

    pub fn bold(text: &str) -> String {
        Self::wrap("1", text)
    }

    pub fn session_id(text: &str) -> String {
        Self::wrap("36", text)
    }
}

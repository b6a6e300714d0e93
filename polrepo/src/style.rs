//! TTY-aware color helpers built on [`console`], which detects whether the
//! stream is a terminal and honors `NO_COLOR`.

use console::Style;

/// A `Style` targeting **stdout**.
fn out() -> Style {
    Style::new()
}

/// A `Style` targeting **stderr**.
fn err() -> Style {
    Style::new().for_stderr()
}

/// Bold cyan section headers.
pub fn header(text: &str) -> String {
    out().cyan().bold().apply_to(text).to_string()
}

pub fn err_red_bold(text: &str) -> String {
    err().red().bold().apply_to(text).to_string()
}

pub fn err_cyan_bold(text: &str) -> String {
    err().cyan().bold().apply_to(text).to_string()
}

pub fn err_dim(text: &str) -> String {
    err().dim().apply_to(text).to_string()
}

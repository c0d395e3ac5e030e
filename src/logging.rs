//! Pretty-printing diagnostics to the console
//!
//! Workers report errors concurrently; every multi-line diagnostic is
//! written under one held stderr lock so messages interleave at message
//! granularity, never mid-line.

use crate::assembler::token::Token;
use colored::Colorize;
use std::io::{self, Write};

/// `<file>:<line>:<col>: error: <msg>` with the source line and a caret
/// underline beneath the offending token
pub fn token_error(file: &str, line_no: usize, line: &str, tk: Token, msg: &str, show_token: bool) {
    let mut out = io::stderr().lock();

    let position = format!("{}:{}:{}:", file, line_no, tk.start);
    let _ = writeln!(out);
    if show_token {
        let _ = writeln!(
            out,
            "{} {} {} \"{}\"",
            position.bold(),
            "error:".red().bold(),
            msg,
            tk.slice(line).bold()
        );
    } else {
        let _ = writeln!(out, "{} {} {}", position.bold(), "error:".red().bold(), msg);
    }

    // Echo the line with the token highlighted, then underline it
    let split = tk.start.min(line.len());
    let (before, rest) = line.split_at(split);
    let (span, after) = rest.split_at(tk.len.min(rest.len()));
    let _ = writeln!(out, "{} | {}{}{}", line_no, before, span.red().bold(), after);

    let gutter = " ".repeat(line_no.to_string().len());
    let underline = format!("^{}", "~".repeat(tk.len.saturating_sub(1)));
    let _ = writeln!(
        out,
        "{} | {}{}",
        gutter,
        " ".repeat(split),
        underline.red().bold()
    );
}

/// `<file>: error: <msg>`, quoting the token when one is given
pub fn linker_error(file: &str, msg: &str, token_text: &str) {
    let mut out = io::stderr().lock();
    let file = format!("{}:", file);
    if token_text.is_empty() {
        let _ = writeln!(out, "{} {} {}", file.bold(), "error:".red().bold(), msg);
    } else {
        let _ = writeln!(
            out,
            "{} {} {} \"{}\"",
            file.bold(),
            "error:".red().bold(),
            msg,
            token_text.bold()
        );
    }
}

/// `<file>: error: <msg>`
pub fn simple_error(file: &str, msg: &str) {
    linker_error(file, msg, "");
}

/// A fatal command-line error; assembly never starts
pub fn fatal(msg: &str) {
    let mut out = io::stderr().lock();
    let _ = writeln!(out, "{} {}", "fatal error:".red().bold(), msg);
    let _ = writeln!(out, "assembly terminated.");
}

//! User-facing console lines.
//!
//! Status lines carry a short tag (`info:`, `warn:`, `error:`, `ok:`), colored only when
//! stdout is a terminal. Warnings and errors go to stderr. Primary results (metadata,
//! JSON) are printed untagged so scripts can consume them.

use owo_colors::OwoColorize;
use serde::Serialize;

#[derive(Clone, Copy)]
enum Tone {
    Info,
    Warn,
    Error,
    Ok,
}

fn colored() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn tagged(tone: Tone, msg: &str, color: bool) -> String {
    let tag = match tone {
        Tone::Info => "info:",
        Tone::Warn => "warn:",
        Tone::Error => "error:",
        Tone::Ok => "ok:",
    };
    if !color {
        return format!("{tag} {msg}");
    }
    let tag = match tone {
        Tone::Info => tag.cyan().bold().to_string(),
        Tone::Warn => tag.yellow().bold().to_string(),
        Tone::Error => tag.red().bold().to_string(),
        Tone::Ok => tag.green().bold().to_string(),
    };
    format!("{tag} {msg}")
}

pub fn print_info(msg: &str) {
    println!("{}", tagged(Tone::Info, msg, colored()));
}

pub fn print_warn(msg: &str) {
    eprintln!("{}", tagged(Tone::Warn, msg, colored()));
}

pub fn print_error(msg: &str) {
    eprintln!("{}", tagged(Tone::Error, msg, colored()));
}

pub fn print_success(msg: &str) {
    println!("{}", tagged(Tone::Ok, msg, colored()));
}

/// Untagged line on stdout.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

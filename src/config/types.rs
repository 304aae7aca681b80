//! Configuration types.
//! - Config carries every runtime setting; nothing else is read globally.
//! - LogLevel is the user-facing verbosity with lenient parsing.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::metadata::StoreOption;

/// Console and file verbosity as written in config.xml or passed on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only
    Quiet,
    /// Operation outcomes (default)
    #[default]
    Normal,
    /// Adds tier decisions and per-step detail
    Info,
    /// Everything, including trace events
    Debug,
}

impl LogLevel {
    /// Parse common string names into a LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration for storage and metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Where annotations go on write (0/1/2)
    pub store_option: StoreOption,
    /// Opaque tree URI granting the document backend; None disables that tier
    pub tree_uri: Option<String>,
    /// Mount points of removable storage the tree URI covers
    pub storage_roots: Vec<PathBuf>,
    /// Roots where direct writes are known to fail
    pub direct_readonly_roots: Vec<PathBuf>,
    /// Registry file of the legacy media index; None disables that tier
    pub legacy_media_index: Option<PathBuf>,
    /// Directory holding the seed files used by legacy mkdir
    pub seed_dir: Option<PathBuf>,
    /// Keep modification times when a copy falls back to streaming
    pub preserve_times: bool,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
}

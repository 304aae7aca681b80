//! Tracing setup for the `eyepair` binary.
//!
//! - Verbosity comes from `LogLevel`; RUST_LOG is not consulted.
//! - Console events go to stderr so `show --json` keeps stdout clean.
//! - An optional log file gets its own non-blocking layer. The returned guard must be
//!   held until exit or buffered lines are lost.
//!
//! File logging is refused when any ancestor of the log path is a symlink.

use anyhow::Result;
use chrono::Local;
use eyepair::config::{LogLevel, default_log_path, path_has_symlink_ancestor};
use eyepair::output as out;
use eyepair::platform::open_log_file_secure_append;
use std::fmt as stdfmt;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tsfmt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// DD/MM/YY HH:MM:SS in local time.
struct LocalHumanTime;

impl FormatTime for LocalHumanTime {
    fn format_time(&self, w: &mut tsfmt::format::Writer<'_>) -> stdfmt::Result {
        write!(w, "{}", Local::now().format("%d/%m/%y %H:%M:%S"))
    }
}

fn to_level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::INFO,
        LogLevel::Info => LevelFilter::DEBUG,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

fn env_filter_for(lvl: LogLevel) -> EnvFilter {
    // LevelFilter displays as "error".."trace", which EnvFilter accepts as a directive.
    EnvFilter::new(to_level_filter(lvl).to_string().to_lowercase())
}

fn fmt_layer<W>(writer: W, json: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tsfmt::layer()
        .with_writer(writer)
        .with_level(true)
        .with_target(true)
        .with_thread_names(true);
    if json {
        layer.json().with_timer(LocalHumanTime).boxed()
    } else {
        layer.compact().with_timer(LocalHumanTime).boxed()
    }
}

fn open_file_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match path_has_symlink_ancestor(path) {
        Ok(false) => {}
        Ok(true) => {
            eprintln!(
                "Refusing to log to {}: an ancestor is a symlink.",
                path.display()
            );
            return None;
        }
        Err(e) => {
            eprintln!("Could not inspect log path {}: {e}", path.display());
            return None;
        }
    }

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", path.display());
            None
        }
    }
}

/// Install the global subscriber. Returns the file writer's guard when file logging
/// is active.
pub fn init_tracing(
    lvl: LogLevel,
    log_file: Option<&Path>,
    json: bool,
) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(io::stderr, json)];
    let mut guard = None;

    if let Some(path) = log_file {
        match open_file_writer(path) {
            Some((writer, g)) => {
                layers.push(fmt_layer(writer, json));
                guard = Some(g);
            }
            None => {
                out::print_warn(&format!(
                    "File logging to '{}' is off; logs go to stderr only.",
                    path.display()
                ));
                if let Ok(def) = default_log_path() {
                    out::print_info(&format!("The default log path is {}", def.display()));
                }
            }
        }
    }

    registry()
        .with(layers)
        .with(env_filter_for(lvl))
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_shift_one_step_verbose() {
        assert_eq!(to_level_filter(LogLevel::Quiet), LevelFilter::ERROR);
        assert_eq!(to_level_filter(LogLevel::Normal), LevelFilter::INFO);
        assert_eq!(to_level_filter(LogLevel::Info), LevelFilter::DEBUG);
        assert_eq!(to_level_filter(LogLevel::Debug), LevelFilter::TRACE);
    }
}

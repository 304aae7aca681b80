//! OS-specific file helpers for the config and log files.
//! Unix gets owner-only modes and durable renames; elsewhere these degrade to plain
//! std calls.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

#[cfg(unix)]
pub use unix::{
    open_log_file_secure_append, set_dir_mode_0700, set_file_mode_0600,
    write_config_secure_new_0600,
};

#[cfg(not(unix))]
pub use windows::{
    open_log_file_secure_append, set_dir_mode_0700, set_file_mode_0600,
    write_config_secure_new_0600,
};

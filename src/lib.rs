//! Core library for `eyepair`.
//!
//! - `metadata`: reads and writes eye-photo annotations inside JPEG files (XMP + EXIF).
//! - `storage`: file operations that fall back across direct, document-tree and legacy
//!   media-index backends, plus the temp-then-rename rewrite and background folder
//!   removal.
//! - `config`: XML configuration with CLI overrides.
//!
//! Library code returns `EyepairError`; the binary wraps it with `anyhow`.

pub mod cli;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod output;
pub mod platform;
pub mod storage;
pub mod utils;

pub use config::{Config, LogLevel, default_config_path, default_log_path, load_config};
pub use errors::EyepairError;
pub use metadata::{Metadata, MetadataCodec, StoreOption};
pub use storage::{BackendTier, StorageContext, StorageExecutor};

//! CLI definition and parsing.
//!
//! Notes:
//! - Global flags override values from config.xml.
//! - --debug is a shorthand for --log-level debug and wins over it.
//! - Without a subcommand the binary only loads config (creating the template if
//!   needed) and reports where it lives.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::metadata::{Metadata, StoreOption};

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Annotate eye photographs inside their JPEG metadata and manage them on removable storage"
)]
pub struct Args {
    /// Where annotations are written: 0 = nowhere, 1 = XMP, 2 = XMP + EXIF.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub store_option: Option<u8>,

    /// Document tree URI for removable storage (overrides config).
    #[arg(long, value_name = "URI")]
    pub tree_uri: Option<String>,

    /// Set log level: quiet, normal, info, debug.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable debug logging (shorthand for --log-level debug).
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    pub json: bool,

    /// Print the config file location and exit.
    #[arg(long)]
    pub print_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the annotations of JPEG files (directories are searched recursively).
    /// Without paths, the camera folder below each storage root's DCIM is shown.
    Show {
        #[arg(value_hint = ValueHint::AnyPath)]
        paths: Vec<PathBuf>,
        /// Print annotations as JSON.
        #[arg(long = "json")]
        as_json: bool,
        /// Also dump every EXIF field and the raw XMP packet.
        #[arg(long)]
        raw: bool,
    },
    /// Store annotations in a JPEG file. Unset fields keep their current value.
    Annotate {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[command(flatten)]
        fields: AnnotationArgs,
    },
    /// Copy a file.
    Cp { src: PathBuf, dst: PathBuf },
    /// Move a file.
    Mv { src: PathBuf, dst: PathBuf },
    /// Delete a file.
    Rm { path: PathBuf },
    /// Create a directory.
    Mkdir { path: PathBuf },
    /// Remove an empty directory.
    Rmdir {
        path: PathBuf,
        /// Remove on a background worker, retrying a few times.
        #[arg(long = "async")]
        background: bool,
    },
    /// Rename a folder, copying its files when a rename is impossible.
    RenameFolder { src: PathBuf, dst: PathBuf },
    /// Check whether a file path accepts direct writes.
    Probe {
        path: PathBuf,
        /// Treat PATH as a folder and check that files can be created in it, through
        /// the document tree if direct writes fail.
        #[arg(long)]
        tree: bool,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct AnnotationArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub comment: Option<String>,
    #[arg(long)]
    pub person: Option<String>,
    #[arg(long, allow_negative_numbers = true)]
    pub x_center: Option<f32>,
    #[arg(long, allow_negative_numbers = true)]
    pub y_center: Option<f32>,
    #[arg(long = "overlay-scale")]
    pub overlay_scale_factor: Option<f32>,
}

impl AnnotationArgs {
    pub fn to_metadata(&self) -> Metadata {
        Metadata {
            title: self.title.clone(),
            description: self.description.clone(),
            subject: self.subject.clone(),
            comment: self.comment.clone(),
            person: self.person.clone(),
            x_center: self.x_center,
            y_center: self.y_center,
            overlay_scale_factor: self.overlay_scale_factor,
        }
    }
}

impl Args {
    /// Precedence: --debug > --log-level > None (keep config value).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config in place. Unset flags are no-ops.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(opt) = self.store_option.and_then(StoreOption::from_u8) {
            cfg.store_option = opt;
        }
        if let Some(uri) = &self.tree_uri {
            cfg.tree_uri = Some(uri.clone());
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

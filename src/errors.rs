//! Typed error definitions for eyepair.
//! A small set of well-known failure modes so logs and tests can match on kind.
//!
//! Notes:
//! - The storage executor converts these to `bool` at its public boundary.
//! - The metadata codec propagates them from `write`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EyepairError {
    #[error("Not a JPEG file: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("No storage backend could {op} {path}")]
    BackendUnavailable { op: &'static str, path: PathBuf },

    #[error("Temporary file already exists, refusing to overwrite: {0}")]
    TempFileConflict(PathBuf),

    #[error("Folder operation stopped part-way at {path}: {context}")]
    PartialFailure { path: PathBuf, context: String },

    #[error("Directory not empty: {0}")]
    NotEmpty(PathBuf),

    #[error("Could not parse {field} from {value:?}; treating as absent")]
    ParseDegraded { field: &'static str, value: String },

    #[error("Path is not on managed storage: {0}")]
    NotOnManagedStorage(PathBuf),

    #[error("Metadata segment too large: {size} bytes (limit {limit})")]
    SegmentTooLarge { size: usize, limit: usize },

    #[error("Malformed {what}: {reason}")]
    Format { what: &'static str, reason: String },

    #[error(
        "Insufficient disk space for {path}: need {required} bytes, have {available} bytes"
    )]
    InsufficientSpace {
        required: u64,
        available: u64,
        path: PathBuf,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EyepairError {
    /// Stable numeric code per kind, used in structured logs.
    pub fn code(&self) -> i32 {
        match self {
            EyepairError::UnsupportedFormat(_) => 10,
            EyepairError::BackendUnavailable { .. } => 20,
            EyepairError::TempFileConflict(_) => 21,
            EyepairError::PartialFailure { .. } => 22,
            EyepairError::NotEmpty(_) => 23,
            EyepairError::NotOnManagedStorage(_) => 24,
            EyepairError::InsufficientSpace { .. } => 25,
            EyepairError::ParseDegraded { .. } => 30,
            EyepairError::SegmentTooLarge { .. } => 31,
            EyepairError::Format { .. } => 32,
            EyepairError::Io(_) => 40,
        }
    }

    /// Short machine-friendly kind label (`kind = ...` in log events).
    pub fn kind_label(&self) -> &'static str {
        match self {
            EyepairError::UnsupportedFormat(_) => "unsupported_format",
            EyepairError::BackendUnavailable { .. } => "backend_unavailable",
            EyepairError::TempFileConflict(_) => "temp_file_conflict",
            EyepairError::PartialFailure { .. } => "partial_failure",
            EyepairError::NotEmpty(_) => "not_empty",
            EyepairError::NotOnManagedStorage(_) => "not_on_managed_storage",
            EyepairError::InsufficientSpace { .. } => "insufficient_space",
            EyepairError::ParseDegraded { .. } => "parse_degraded",
            EyepairError::SegmentTooLarge { .. } => "segment_too_large",
            EyepairError::Format { .. } => "format",
            EyepairError::Io(_) => "io",
        }
    }

    pub(crate) fn format(what: &'static str, reason: impl ToString) -> Self {
        EyepairError::Format {
            what,
            reason: reason.to_string(),
        }
    }
}

/// Flatten an EyepairError into io::Error for backend code that speaks io::Result.
/// I/O errors pass through unchanged; everything else becomes `Unsupported`.
pub(crate) fn into_io(e: EyepairError) -> io::Error {
    match e {
        EyepairError::Io(inner) => inner,
        other => io::Error::new(io::ErrorKind::Unsupported, other),
    }
}

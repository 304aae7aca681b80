//! Storage layer.
//!
//! Callers hand in plain absolute paths. The executor tries each configured tier in a
//! fixed order (direct filesystem, document tree, legacy media index) and stops at the
//! first that succeeds. Which tier won is logged, never returned from the public API.
//!
//! Submodules:
//! - `direct`   : plain filesystem writes (with optional read-only roots)
//! - `tree`     : tree-document backend types and the local `file://` provider
//! - `resolver` : path -> document handle mapping
//! - `legacy`   : media-index workaround tier
//! - `executor` : copy/move/delete/mkdir/rmdir/rename_folder with fallback
//! - `rewrite`  : temp-then-rename protocol for in-place rewrites
//! - `reclaim`  : background folder removal with bounded retries
//! - `probe`    : writability checks

mod context;
mod direct;
mod executor;
mod helpers;
pub mod io_copy;
pub mod legacy;
mod probe;
pub mod reclaim;
pub mod resolver;
pub mod rewrite;
mod tier;
pub mod tree;

use serde::Serialize;
use std::fmt;

pub use context::StorageContext;
pub use executor::StorageExecutor;
pub use helpers::io_error_with_help_io;
pub use io_copy::{DurabilityMode, OutputStream};
pub use legacy::{LocalMediaIndex, MediaIndex};
pub use probe::PROBE_FILE_PREFIX;
pub use reclaim::{CompletionQueue, ReclaimHandle, ReclaimState, RetryPolicy, rmdir_async};
pub use resolver::DocumentResolver;
pub use tree::{DocumentHandle, DocumentProvider, LocalTreeProvider, TreeUri};

/// Which backend carried out an operation. Logged, not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BackendTier {
    Direct,
    TreeDocument,
    LegacyContentProvider,
}

impl fmt::Display for BackendTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendTier::Direct => "direct",
            BackendTier::TreeDocument => "tree-document",
            BackendTier::LegacyContentProvider => "legacy-content-provider",
        };
        f.write_str(s)
    }
}

/// Kind of node requested from the document tree for the final path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

//! Backend capability probes. Every failure reads as "not writable".

use std::path::{Path, PathBuf};
use tracing::debug;

use super::NodeKind;
use super::direct::DirectFs;
use super::tier::TreeTier;

/// Base name of the synthetic file used by the folder probe.
pub const PROBE_FILE_PREFIX: &str = "EyepairDummyFile";

/// First `EyepairDummyFile<n>` (n from 1) that does not exist in `folder`.
pub(crate) fn probe_path(folder: &Path) -> PathBuf {
    let mut i: u64 = 0;
    loop {
        i += 1;
        let candidate = folder.join(format!("{PROBE_FILE_PREFIX}{i}"));
        if std::fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
    }
}

pub(crate) fn is_writable(direct: &DirectFs, path: &Path) -> bool {
    direct.probe_append(path)
}

/// Can files be created in `folder`, directly or through the document tree?
pub(crate) fn is_writable_via_tree_backend(
    direct: &DirectFs,
    tree: Option<&TreeTier>,
    folder: &Path,
) -> bool {
    if !folder.is_dir() {
        return false;
    }
    let probe = probe_path(folder);
    if direct.probe_append(&probe) {
        return true;
    }

    let Some(tree) = tree else {
        debug!(folder = %folder.display(), "No document tree configured for probe");
        return false;
    };
    let resolver = tree.resolver();
    let doc = match resolver.resolve(&probe, NodeKind::File) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(folder = %folder.display(), error = %e, "Document tree probe failed");
            return false;
        }
    };
    // The resolver should have created the probe file at the host path.
    let result = resolver.provider().can_write(&doc) && probe.exists();
    if let Err(e) = resolver.provider().delete(&doc) {
        debug!(probe = %probe.display(), error = %e, "Could not remove probe document");
    }
    result
}

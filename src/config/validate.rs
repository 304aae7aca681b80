//! Config validation.
//! Storage roots must be readable directories; the tree URI must parse and be
//! backed by at least one root.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::types::Config;
use crate::storage::TreeUri;
use crate::utils::is_within;

impl Config {
    /// Check roots and backend settings before any storage work starts.
    pub fn validate(&self) -> Result<()> {
        for root in &self.storage_roots {
            ensure_readable_dir(root, "storage root")?;
        }
        for root in &self.direct_readonly_roots {
            if !self.storage_roots.iter().any(|r| is_within(root, r)) {
                warn!(
                    "direct_readonly root '{}' is outside every storage root; only direct writes are affected",
                    root.display()
                );
            }
        }

        if let Some(raw) = self.tree_uri.as_deref() {
            TreeUri::parse(raw).with_context(|| format!("tree_uri '{raw}'"))?;
            if self.storage_roots.is_empty() {
                warn!("tree_uri is set but no storage roots are configured; the tree backend cannot resolve paths");
            }
        }

        if let Some(index) = &self.legacy_media_index {
            if index.is_dir() {
                error!("legacy_media_index is a directory: {}", index.display());
                bail!("legacy_media_index is a directory: {}", index.display());
            }
        }

        info!(
            store_option = %self.store_option,
            roots = self.storage_roots.len(),
            tree = self.tree_uri.is_some(),
            legacy = self.legacy_media_index.is_some(),
            "Config validated"
        );
        Ok(())
    }
}

fn ensure_readable_dir(path: &Path, name: &str) -> Result<()> {
    if !path.is_dir() {
        error!("{name} is not a directory: {}", path.display());
        bail!("{name} is not a directory: {}", path.display());
    }
    fs::read_dir(path).with_context(|| {
        format!("Cannot read {name} '{}'; check permissions", path.display())
    })?;
    debug!("{name} readable: {}", path.display());
    Ok(())
}

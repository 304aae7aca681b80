//! Explicit construction inputs for the storage executor.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::legacy::{LocalMediaIndex, MediaIndex};
use super::tree::{DocumentProvider, LocalTreeProvider, TreeUri};
use crate::config::Config;
use crate::errors::EyepairError;

/// Everything the executor needs; nothing is looked up globally.
#[derive(Debug, Clone, Default)]
pub struct StorageContext {
    pub storage_roots: Vec<PathBuf>,
    pub direct_readonly_roots: Vec<PathBuf>,
    pub tree_uri: Option<TreeUri>,
    pub document_provider: Option<Arc<dyn DocumentProvider>>,
    pub media_index: Option<Arc<dyn MediaIndex>>,
    pub seed_dir: Option<PathBuf>,
    pub preserve_times: bool,
}

impl StorageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_roots.push(root.into());
        self
    }

    pub fn with_direct_readonly_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.direct_readonly_roots.push(root.into());
        self
    }

    pub fn with_tree(mut self, uri: TreeUri, provider: Arc<dyn DocumentProvider>) -> Self {
        self.tree_uri = Some(uri);
        self.document_provider = Some(provider);
        self
    }

    pub fn with_media_index(mut self, index: Arc<dyn MediaIndex>, seed_dir: PathBuf) -> Self {
        self.media_index = Some(index);
        self.seed_dir = Some(seed_dir);
        self
    }

    pub fn with_preserve_times(mut self, preserve: bool) -> Self {
        self.preserve_times = preserve;
        self
    }

    /// Build from loaded configuration. A `file://` tree URI gets the local provider;
    /// other schemes have no provider here, so that tier stays unavailable.
    pub fn from_config(cfg: &Config) -> Result<Self, EyepairError> {
        let mut ctx = StorageContext {
            storage_roots: cfg.storage_roots.clone(),
            direct_readonly_roots: cfg.direct_readonly_roots.clone(),
            preserve_times: cfg.preserve_times,
            ..Default::default()
        };

        if let Some(raw) = cfg.tree_uri.as_deref() {
            let uri = TreeUri::parse(raw)?;
            match LocalTreeProvider::from_tree_uri(&uri) {
                Some(provider) => {
                    debug!(tree_uri = %uri, "Document tree backend configured");
                    ctx.document_provider = Some(Arc::new(provider));
                }
                None => {
                    warn!(tree_uri = %uri, "No document provider for this tree URI scheme; tree backend disabled");
                }
            }
            ctx.tree_uri = Some(uri);
        }

        if let Some(index_file) = cfg.legacy_media_index.as_ref() {
            let index = LocalMediaIndex::open(index_file)?;
            let seed_dir = cfg.seed_dir.clone().unwrap_or_else(|| {
                index_file
                    .parent()
                    .map(|p| p.join("seed"))
                    .unwrap_or_else(|| PathBuf::from("seed"))
            });
            debug!(index = %index_file.display(), seed_dir = %seed_dir.display(), "Legacy media index configured");
            ctx.media_index = Some(Arc::new(index));
            ctx.seed_dir = Some(seed_dir);
        }

        Ok(ctx)
    }
}

//! The tier chain: one variant per backend, tried in declaration order.

use std::io;
use std::path::Path;

use super::direct::DirectFs;
use super::io_copy::OutputStream;
use super::legacy::LegacyTier;
use super::resolver::DocumentResolver;
use super::{BackendTier, NodeKind};
use crate::errors::into_io;

/// Document-tree tier: resolves paths through the resolver, acts through its provider.
#[derive(Debug, Clone)]
pub(crate) struct TreeTier {
    resolver: DocumentResolver,
}

impl TreeTier {
    pub(crate) fn new(resolver: DocumentResolver) -> Self {
        Self { resolver }
    }

    pub(crate) fn resolver(&self) -> &DocumentResolver {
        &self.resolver
    }

    fn open_output(&self, path: &Path) -> io::Result<OutputStream> {
        let doc = self.resolver.resolve(path, NodeKind::File).map_err(into_io)?;
        Ok(OutputStream::Stream(self.resolver.provider().open_output(&doc)?))
    }

    fn delete_node(&self, path: &Path, expect: NodeKind) -> io::Result<()> {
        match self.resolver.lookup(path).map_err(into_io)? {
            Some((doc, kind)) if kind == expect => self.resolver.provider().delete(&doc),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unexpected document kind at {}", path.display()),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no document for {}", path.display()),
            )),
        }
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.resolver
            .resolve(path, NodeKind::Directory)
            .map(|_| ())
            .map_err(into_io)
    }

    /// Only renames within one parent folder.
    fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let same_parent = src.parent().is_some() && src.parent() == dst.parent();
        let new_name = dst.file_name().and_then(|n| n.to_str());
        let (true, Some(new_name)) = (same_parent, new_name) else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "document tree renames only within one folder: {} -> {}",
                    src.display(),
                    dst.display()
                ),
            ));
        };
        let (doc, _) = self.resolver.lookup(src).map_err(into_io)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no document for {}", src.display()),
            )
        })?;
        self.resolver.provider().rename(&doc, new_name).map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Tier {
    Direct(DirectFs),
    TreeDocument(TreeTier),
    LegacyContentProvider(LegacyTier),
}

impl Tier {
    pub(crate) fn label(&self) -> BackendTier {
        match self {
            Tier::Direct(_) => BackendTier::Direct,
            Tier::TreeDocument(_) => BackendTier::TreeDocument,
            Tier::LegacyContentProvider(_) => BackendTier::LegacyContentProvider,
        }
    }

    pub(crate) fn open_output(&self, path: &Path) -> io::Result<OutputStream> {
        match self {
            Tier::Direct(d) => d.open_output(path),
            Tier::TreeDocument(t) => t.open_output(path),
            Tier::LegacyContentProvider(l) => l.open_output(path),
        }
    }

    pub(crate) fn delete_file(&self, path: &Path) -> io::Result<()> {
        match self {
            Tier::Direct(d) => d.delete_file(path),
            Tier::TreeDocument(t) => t.delete_node(path, NodeKind::File),
            Tier::LegacyContentProvider(l) => l.delete_file(path),
        }
    }

    pub(crate) fn create_dir(&self, path: &Path) -> io::Result<()> {
        match self {
            Tier::Direct(d) => d.create_dir(path),
            Tier::TreeDocument(t) => t.create_dir(path),
            Tier::LegacyContentProvider(l) => l.create_dir(path),
        }
    }

    pub(crate) fn remove_dir(&self, path: &Path) -> io::Result<()> {
        match self {
            Tier::Direct(d) => d.remove_dir(path),
            Tier::TreeDocument(t) => t.delete_node(path, NodeKind::Directory),
            Tier::LegacyContentProvider(l) => l.remove_dir(path),
        }
    }

    pub(crate) fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        match self {
            Tier::Direct(d) => d.rename(src, dst),
            Tier::TreeDocument(t) => t.rename(src, dst),
            Tier::LegacyContentProvider(l) => l.rename(src, dst),
        }
    }
}

//! Document path resolver.
//!
//! Maps an absolute host path below a configured storage root to a node of the
//! granted document tree. `resolve` creates missing nodes on the way (intermediate
//! segments as folders, the last one as the requested kind). `lookup` only walks.
//!
//! - Roots are canonicalized once at construction; paths per call.
//! - The longest matching root wins; matching is per path component.
//! - Nothing is transactional: folders created before a failure stay.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use super::NodeKind;
use super::tree::{DEFAULT_FILE_MIME, DocumentHandle, DocumentProvider, TreeUri};
use crate::errors::EyepairError;
use crate::utils::{canonicalize_lenient, is_within};

#[derive(Debug, Clone)]
pub struct DocumentResolver {
    roots: Vec<PathBuf>,
    tree: Option<TreeUri>,
    provider: Arc<dyn DocumentProvider>,
}

impl DocumentResolver {
    pub fn new(
        roots: &[PathBuf],
        tree: Option<TreeUri>,
        provider: Arc<dyn DocumentProvider>,
    ) -> Self {
        Self {
            roots: roots.iter().map(|r| canonicalize_lenient(r)).collect(),
            tree,
            provider,
        }
    }

    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.provider
    }

    /// Segments of `path` relative to its storage root.
    pub fn relative_segments(&self, path: &Path) -> Result<Vec<String>, EyepairError> {
        let not_managed = || EyepairError::NotOnManagedStorage(path.to_path_buf());
        if self.tree.is_none() {
            return Err(not_managed());
        }
        let canon = canonicalize_lenient(path);
        let root = self
            .roots
            .iter()
            .filter(|r| is_within(&canon, r))
            .max_by_key(|r| r.components().count())
            .ok_or_else(not_managed)?;
        let rel = canon.strip_prefix(root).map_err(|_| not_managed())?;
        rel.components()
            .map(|c| {
                c.as_os_str()
                    .to_str()
                    .map(str::to_string)
                    .ok_or_else(not_managed)
            })
            .collect()
    }

    /// Resolve `path` to a document node, creating missing nodes.
    pub fn resolve(&self, path: &Path, kind: NodeKind) -> Result<DocumentHandle, EyepairError> {
        let segments = self.relative_segments(path)?;
        let tree = self
            .tree
            .clone()
            .ok_or_else(|| EyepairError::NotOnManagedStorage(path.to_path_buf()))?;
        let mut doc = DocumentHandle::root(tree);
        if segments.is_empty() && kind == NodeKind::File {
            return Err(EyepairError::format(
                "document path",
                format!("storage root {} cannot be a file", path.display()),
            ));
        }

        let last = segments.len().saturating_sub(1);
        for (i, seg) in segments.iter().enumerate() {
            let want = if i < last { NodeKind::Directory } else { kind };
            doc = match self.provider.find_child(&doc, seg)? {
                Some(found) if found == want => doc.child(seg),
                Some(_) => {
                    return Err(EyepairError::format(
                        "document path",
                        format!("{seg:?} in {} has the wrong node kind", path.display()),
                    ));
                }
                None => {
                    trace!(segment = %seg, ?want, "Creating missing document node");
                    match want {
                        NodeKind::Directory => self.provider.create_directory(&doc, seg)?,
                        NodeKind::File => {
                            self.provider.create_file(&doc, DEFAULT_FILE_MIME, seg)?
                        }
                    }
                }
            };
        }
        debug!(path = %path.display(), segments = doc.segments.len(), "Resolved document");
        Ok(doc)
    }

    /// Walk to `path` without creating anything. Ok(None) when some segment is missing.
    pub fn lookup(&self, path: &Path) -> Result<Option<(DocumentHandle, NodeKind)>, EyepairError> {
        let segments = self.relative_segments(path)?;
        let tree = self
            .tree
            .clone()
            .ok_or_else(|| EyepairError::NotOnManagedStorage(path.to_path_buf()))?;
        let mut doc = DocumentHandle::root(tree);
        let mut kind = NodeKind::Directory;
        for seg in &segments {
            if kind != NodeKind::Directory {
                return Ok(None);
            }
            match self.provider.find_child(&doc, seg)? {
                Some(k) => {
                    kind = k;
                    doc = doc.child(seg);
                }
                None => return Ok(None),
            }
        }
        Ok(Some((doc, kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tree::LocalTreeProvider;
    use std::fs;
    use tempfile::tempdir;

    fn resolver_for(root: &Path) -> DocumentResolver {
        let uri = TreeUri::parse(&format!("file://{}", root.display())).unwrap();
        DocumentResolver::new(
            &[root.to_path_buf()],
            Some(uri),
            Arc::new(LocalTreeProvider::new(root)),
        )
    }

    #[test]
    fn resolve_creates_intermediates_and_file() {
        let td = tempdir().unwrap();
        let r = resolver_for(td.path());
        let target = td.path().join("DCIM").join("Eyes").join("left.jpg");
        let doc = r.resolve(&target, NodeKind::File).unwrap();
        assert_eq!(doc.segments, vec!["DCIM", "Eyes", "left.jpg"]);
        assert!(td.path().join("DCIM/Eyes").is_dir());
        assert!(td.path().join("DCIM/Eyes/left.jpg").is_file());
    }

    #[test]
    fn resolve_directory_is_idempotent() {
        let td = tempdir().unwrap();
        let r = resolver_for(td.path());
        let target = td.path().join("A").join("B");
        r.resolve(&target, NodeKind::Directory).unwrap();
        r.resolve(&target, NodeKind::Directory).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn outside_roots_is_not_managed() {
        let td = tempdir().unwrap();
        let other = tempdir().unwrap();
        let r = resolver_for(td.path());
        let err = r
            .resolve(&other.path().join("x.jpg"), NodeKind::File)
            .unwrap_err();
        assert!(matches!(err, EyepairError::NotOnManagedStorage(_)));
    }

    #[test]
    fn no_tree_uri_is_not_managed() {
        let td = tempdir().unwrap();
        let r = DocumentResolver::new(
            &[td.path().to_path_buf()],
            None,
            Arc::new(LocalTreeProvider::new(td.path())),
        );
        let err = r.lookup(&td.path().join("x")).unwrap_err();
        assert!(matches!(err, EyepairError::NotOnManagedStorage(_)));
    }

    #[test]
    fn lookup_does_not_create() {
        let td = tempdir().unwrap();
        let r = resolver_for(td.path());
        assert!(r.lookup(&td.path().join("a/b.jpg")).unwrap().is_none());
        assert!(!td.path().join("a").exists());

        fs::create_dir(td.path().join("a")).unwrap();
        fs::write(td.path().join("a/b.jpg"), b"x").unwrap();
        let (doc, kind) = r.lookup(&td.path().join("a/b.jpg")).unwrap().unwrap();
        assert_eq!(kind, NodeKind::File);
        assert_eq!(doc.name(), Some("b.jpg"));
    }

    #[test]
    fn file_in_the_middle_is_rejected() {
        let td = tempdir().unwrap();
        fs::write(td.path().join("plain"), b"x").unwrap();
        let r = resolver_for(td.path());
        let err = r
            .resolve(&td.path().join("plain/child.jpg"), NodeKind::File)
            .unwrap_err();
        assert!(matches!(err, EyepairError::Format { .. }));
    }
}

//! Tree-document backend.
//!
//! A document tree is addressed by an opaque tree URI granted by the host. Nodes are
//! `DocumentHandle`s: the tree URI plus the names walked from the tree root. Handles
//! are built per call and never cached.
//!
//! `DocumentProvider` is the seam to the host's document service. `LocalTreeProvider`
//! serves `file://` tree URIs from a host directory; it is what the CLI and the tests
//! use.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use super::NodeKind;
use super::helpers::io_error_with_help_io;
use crate::errors::EyepairError;

/// Mime type used when the tree backend has to create a file node.
pub const DEFAULT_FILE_MIME: &str = "image";

/// Opaque identifier of a granted document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeUri(String);

impl TreeUri {
    /// Accepts any `scheme://rest` string with a non-empty scheme and rest.
    pub fn parse(s: &str) -> Result<Self, EyepairError> {
        let trimmed = s.trim();
        match trimmed.split_once("://") {
            Some((scheme, rest))
                if !scheme.is_empty()
                    && !rest.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
            {
                Ok(TreeUri(trimmed.to_string()))
            }
            _ => Err(EyepairError::format("tree URI", format!("{trimmed:?}"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host directory for `file://` URIs; None for any other scheme.
    pub fn local_root(&self) -> Option<PathBuf> {
        self.0.strip_prefix("file://").map(PathBuf::from)
    }
}

impl fmt::Display for TreeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node inside a document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub tree: TreeUri,
    pub segments: Vec<String>,
}

impl DocumentHandle {
    pub fn root(tree: TreeUri) -> Self {
        Self {
            tree,
            segments: Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self {
            tree: self.tree.clone(),
            segments,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            tree: self.tree.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

/// Host document service for one kind of tree URI.
pub trait DocumentProvider: Send + Sync + fmt::Debug {
    /// Kind of the named child of `parent`, or None when it does not exist.
    fn find_child(&self, parent: &DocumentHandle, name: &str) -> io::Result<Option<NodeKind>>;

    fn create_directory(&self, parent: &DocumentHandle, name: &str) -> io::Result<DocumentHandle>;

    fn create_file(
        &self,
        parent: &DocumentHandle,
        mime: &str,
        name: &str,
    ) -> io::Result<DocumentHandle>;

    /// Truncating write stream for an existing file node.
    fn open_output(&self, doc: &DocumentHandle) -> io::Result<Box<dyn Write + Send>>;

    /// Delete a file node or an empty directory node.
    fn delete(&self, doc: &DocumentHandle) -> io::Result<()>;

    /// Rename within the same parent; fails if the new name is taken.
    fn rename(&self, doc: &DocumentHandle, new_name: &str) -> io::Result<DocumentHandle>;

    fn can_write(&self, doc: &DocumentHandle) -> bool;
}

/// Provider for `file://` trees, backed by a host directory.
#[derive(Debug, Clone)]
pub struct LocalTreeProvider {
    root: PathBuf,
}

impl LocalTreeProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_tree_uri(tree: &TreeUri) -> Option<Self> {
        tree.local_root().map(Self::new)
    }

    fn host_path(&self, doc: &DocumentHandle) -> io::Result<PathBuf> {
        let mut p = self.root.clone();
        for seg in &doc.segments {
            if seg.is_empty() || seg == "." || seg == ".." || seg.contains(['/', '\\']) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid document segment {seg:?}"),
                ));
            }
            p.push(seg);
        }
        Ok(p)
    }
}

impl DocumentProvider for LocalTreeProvider {
    fn find_child(&self, parent: &DocumentHandle, name: &str) -> io::Result<Option<NodeKind>> {
        let p = self.host_path(&parent.child(name))?;
        match fs::metadata(&p) {
            Ok(m) if m.is_dir() => Ok(Some(NodeKind::Directory)),
            Ok(_) => Ok(Some(NodeKind::File)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_directory(&self, parent: &DocumentHandle, name: &str) -> io::Result<DocumentHandle> {
        let doc = parent.child(name);
        let p = self.host_path(&doc)?;
        match fs::create_dir(&p) {
            Ok(()) => Ok(doc),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && p.is_dir() => Ok(doc),
            Err(e) => Err(io_error_with_help_io("create document folder", &p)(e)),
        }
    }

    fn create_file(
        &self,
        parent: &DocumentHandle,
        _mime: &str,
        name: &str,
    ) -> io::Result<DocumentHandle> {
        let doc = parent.child(name);
        let p = self.host_path(&doc)?;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&p)
            .map_err(io_error_with_help_io("create document", &p))?;
        Ok(doc)
    }

    fn open_output(&self, doc: &DocumentHandle) -> io::Result<Box<dyn Write + Send>> {
        let p = self.host_path(doc)?;
        let f = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&p)
            .map_err(io_error_with_help_io("open document for writing", &p))?;
        Ok(Box::new(f))
    }

    fn delete(&self, doc: &DocumentHandle) -> io::Result<()> {
        let p = self.host_path(doc)?;
        if fs::symlink_metadata(&p)?.is_dir() {
            fs::remove_dir(&p).map_err(io_error_with_help_io("delete document folder", &p))
        } else {
            fs::remove_file(&p).map_err(io_error_with_help_io("delete document", &p))
        }
    }

    fn rename(&self, doc: &DocumentHandle, new_name: &str) -> io::Result<DocumentHandle> {
        let parent = doc.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot rename the tree root")
        })?;
        let target = parent.child(new_name);
        let from = self.host_path(doc)?;
        let to = self.host_path(&target)?;
        if fs::symlink_metadata(&to).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("document already exists: {}", to.display()),
            ));
        }
        fs::rename(&from, &to).map_err(io_error_with_help_io("rename document", &from))?;
        Ok(target)
    }

    fn can_write(&self, doc: &DocumentHandle) -> bool {
        match self.host_path(doc).and_then(fs::metadata) {
            Ok(m) => !m.permissions().readonly(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn tree_uri_parse_and_local_root() {
        let t = TreeUri::parse("file:///mnt/card").unwrap();
        assert_eq!(t.local_root(), Some(PathBuf::from("/mnt/card")));
        let t = TreeUri::parse("content://com.android.externalstorage/tree/1234").unwrap();
        assert_eq!(t.local_root(), None);
        assert!(TreeUri::parse("").is_err());
        assert!(TreeUri::parse("no-scheme").is_err());
    }

    #[test]
    fn handle_navigation() {
        let root = DocumentHandle::root(TreeUri::parse("file:///x").unwrap());
        let a = root.child("DCIM").child("a.jpg");
        assert_eq!(a.name(), Some("a.jpg"));
        assert_eq!(a.parent().unwrap().segments, vec!["DCIM".to_string()]);
        assert!(root.parent().is_none());
    }

    #[test]
    fn local_provider_create_write_rename_delete() {
        let td = tempdir().unwrap();
        let uri = TreeUri::parse(&format!("file://{}", td.path().display())).unwrap();
        let provider = LocalTreeProvider::from_tree_uri(&uri).unwrap();
        let root = DocumentHandle::root(uri);

        let dir = provider.create_directory(&root, "Eyes").unwrap();
        // idempotent
        provider.create_directory(&root, "Eyes").unwrap();
        let file = provider.create_file(&dir, DEFAULT_FILE_MIME, "a.jpg").unwrap();
        assert_eq!(provider.find_child(&dir, "a.jpg").unwrap(), Some(NodeKind::File));
        assert_eq!(provider.find_child(&root, "Eyes").unwrap(), Some(NodeKind::Directory));
        assert!(provider.can_write(&file));

        let mut w = provider.open_output(&file).unwrap();
        w.write_all(b"jpeg").unwrap();
        drop(w);
        assert_eq!(fs::read(td.path().join("Eyes/a.jpg")).unwrap(), b"jpeg");

        let renamed = provider.rename(&file, "b.jpg").unwrap();
        assert!(td.path().join("Eyes/b.jpg").exists());
        provider.delete(&renamed).unwrap();
        provider.delete(&dir).unwrap();
        assert!(!td.path().join("Eyes").exists());
    }

    #[test]
    fn local_provider_rejects_traversal() {
        let td = tempdir().unwrap();
        let provider = LocalTreeProvider::new(td.path());
        let root = DocumentHandle::root(TreeUri::parse("file:///x").unwrap());
        let err = provider.create_directory(&root, "..").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}

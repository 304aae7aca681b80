//! File operation executor.
//!
//! Every operation walks the tier chain (direct -> document tree -> legacy index) and
//! stops at the first tier that gets the job done. The public API answers with a bool.
//! The `try_*` variants keep the error and the winning tier for logs and tests.
//!
//! Reads and existence checks always use the host filesystem; only writes differ
//! per tier.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::direct::DirectFs;
use super::helpers::io_error_with_help_io;
use super::io_copy::{self, DurabilityMode, OutputStream};
use super::legacy::LegacyTier;
use super::resolver::DocumentResolver;
use super::tier::{Tier, TreeTier};
use super::{BackendTier, StorageContext, probe};
use crate::errors::EyepairError;

#[derive(Debug, Clone)]
pub struct StorageExecutor {
    tiers: Vec<Tier>,
    preserve_times: bool,
}

fn log_outcome(op: &str, path: &Path, res: &Result<BackendTier, EyepairError>) -> bool {
    match res {
        Ok(tier) => {
            info!(op, path = %path.display(), tier = %tier, "Storage operation succeeded");
            true
        }
        Err(e) => {
            warn!(op, path = %path.display(), code = e.code(), kind = e.kind_label(), error = %e, "Storage operation failed");
            false
        }
    }
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

impl StorageExecutor {
    pub fn new(ctx: StorageContext) -> Self {
        let mut tiers = vec![Tier::Direct(DirectFs::new(&ctx.direct_readonly_roots))];

        if let (Some(uri), Some(provider)) = (ctx.tree_uri.clone(), ctx.document_provider.clone())
        {
            let resolver = DocumentResolver::new(&ctx.storage_roots, Some(uri), provider);
            tiers.push(Tier::TreeDocument(TreeTier::new(resolver)));
        }

        if let Some(index) = ctx.media_index.clone() {
            let seed_dir = ctx
                .seed_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("eyepair-seed"));
            tiers.push(Tier::LegacyContentProvider(LegacyTier::new(index, seed_dir)));
        }

        debug!(
            tiers = ?tiers.iter().map(Tier::label).collect::<Vec<_>>(),
            "Storage executor ready"
        );
        Self {
            tiers,
            preserve_times: ctx.preserve_times,
        }
    }

    /// Labels of the configured tiers in the order they are tried.
    pub fn tiers(&self) -> Vec<BackendTier> {
        self.tiers.iter().map(Tier::label).collect()
    }

    fn direct(&self) -> Option<&DirectFs> {
        self.tiers.iter().find_map(|t| match t {
            Tier::Direct(d) => Some(d),
            _ => None,
        })
    }

    fn tree(&self) -> Option<&TreeTier> {
        self.tiers.iter().find_map(|t| match t {
            Tier::TreeDocument(t) => Some(t),
            _ => None,
        })
    }

    /// Run `attempt` on each tier until one returns Ok and `done` confirms the effect.
    fn first_tier<F, C>(
        &self,
        op: &'static str,
        path: &Path,
        mut attempt: F,
        done: C,
    ) -> Result<BackendTier, EyepairError>
    where
        F: FnMut(&Tier) -> io::Result<()>,
        C: Fn() -> bool,
    {
        for tier in &self.tiers {
            match attempt(tier) {
                Ok(()) if done() => return Ok(tier.label()),
                Ok(()) => {
                    debug!(op, tier = %tier.label(), path = %path.display(), "Tier reported success but the effect is not visible")
                }
                Err(e) => {
                    debug!(op, tier = %tier.label(), path = %path.display(), error = %e, "Tier failed; trying next")
                }
            }
        }
        Err(EyepairError::BackendUnavailable {
            op,
            path: path.to_path_buf(),
        })
    }

    /// Open a write stream for `path` on the first tier that can.
    pub(crate) fn open_output(
        &self,
        path: &Path,
    ) -> Result<(OutputStream, BackendTier), EyepairError> {
        for tier in &self.tiers {
            match tier.open_output(path) {
                Ok(out) => return Ok((out, tier.label())),
                Err(e) => {
                    debug!(tier = %tier.label(), path = %path.display(), error = %e, "Cannot open output; trying next tier")
                }
            }
        }
        Err(EyepairError::BackendUnavailable {
            op: "write",
            path: path.to_path_buf(),
        })
    }

    /// Rename `src` onto `dst` on the first tier that can.
    pub(crate) fn try_rename_file(&self, src: &Path, dst: &Path) -> Result<BackendTier, EyepairError> {
        self.first_tier(
            "rename",
            src,
            |t| t.rename(src, dst),
            || !exists_no_follow(src) && exists_no_follow(dst),
        )
    }

    /// Plain copy; the source stays, so the OS page cache is enough.
    pub(crate) fn try_copy(&self, src: &Path, dst: &Path) -> Result<BackendTier, EyepairError> {
        self.try_copy_with(src, dst, DurabilityMode::Data)
    }

    /// Copy with an explicit durability. Callers that delete the source afterwards
    /// pass `Full`.
    pub(crate) fn try_copy_with(
        &self,
        src: &Path,
        dst: &Path,
        durability: DurabilityMode,
    ) -> Result<BackendTier, EyepairError> {
        if !src.is_file() {
            return Err(EyepairError::Io(io_error_with_help_io("copy", src)(
                io::Error::from(io::ErrorKind::NotFound),
            )));
        }
        for tier in &self.tiers {
            let out = match tier.open_output(dst) {
                Ok(out) => out,
                Err(e) => {
                    debug!(tier = %tier.label(), dst = %dst.display(), error = %e, "Cannot open copy target; trying next tier");
                    continue;
                }
            };
            match io_copy::copy_into(src, out, durability) {
                Ok(res) => {
                    debug!(tier = %tier.label(), bytes = res.bytes, src = %src.display(), dst = %dst.display(), "Copied");
                    if self.preserve_times {
                        self.copy_times(src, dst);
                    }
                    return Ok(tier.label());
                }
                Err(e) => {
                    warn!(tier = %tier.label(), dst = %dst.display(), error = %e, "Copy failed mid-stream; removing partial target");
                    let _ = tier.delete_file(dst);
                }
            }
        }
        Err(EyepairError::BackendUnavailable {
            op: "copy",
            path: dst.to_path_buf(),
        })
    }

    fn copy_times(&self, src: &Path, dst: &Path) {
        let res = fs::metadata(src).and_then(|m| {
            let atime = filetime::FileTime::from_last_access_time(&m);
            let mtime = filetime::FileTime::from_last_modification_time(&m);
            filetime::set_file_times(dst, atime, mtime)
        });
        if let Err(e) = res {
            warn!(dst = %dst.display(), error = %e, "Could not preserve file times");
        }
    }

    pub(crate) fn try_move_file(&self, src: &Path, dst: &Path) -> Result<BackendTier, EyepairError> {
        if !src.is_file() {
            return Err(EyepairError::Io(io_error_with_help_io("move", src)(
                io::Error::from(io::ErrorKind::NotFound),
            )));
        }
        if let Some(direct) = self.direct() {
            match direct.rename(src, dst) {
                Ok(()) => return Ok(BackendTier::Direct),
                Err(e) => debug!(src = %src.display(), error = %e, "Direct rename failed; copying instead"),
            }
        }
        let tier = self.try_copy_with(src, dst, DurabilityMode::Full)?;
        self.try_delete(src).map_err(|e| EyepairError::PartialFailure {
            path: src.to_path_buf(),
            context: format!("copied to {} but could not delete the source: {e}", dst.display()),
        })?;
        Ok(tier)
    }

    pub(crate) fn try_delete(&self, path: &Path) -> Result<BackendTier, EyepairError> {
        match fs::symlink_metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BackendTier::Direct),
            Err(e) => return Err(io_error_with_help_io("stat", path)(e).into()),
            Ok(m) if m.is_dir() => {
                return Err(EyepairError::Io(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("refusing to delete folder as a file: {}", path.display()),
                )));
            }
            Ok(_) => {}
        }
        self.first_tier("delete", path, |t| t.delete_file(path), || !exists_no_follow(path))
    }

    pub(crate) fn try_mkdir(&self, path: &Path) -> Result<BackendTier, EyepairError> {
        if let Ok(m) = fs::metadata(path) {
            if m.is_dir() {
                return Ok(BackendTier::Direct);
            }
            return Err(EyepairError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("a file is in the way: {}", path.display()),
            )));
        }
        self.first_tier("mkdir", path, |t| t.create_dir(path), || path.is_dir())
    }

    pub(crate) fn try_rmdir(&self, path: &Path) -> Result<BackendTier, EyepairError> {
        match fs::symlink_metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BackendTier::Direct),
            Err(e) => return Err(io_error_with_help_io("stat", path)(e).into()),
            Ok(m) if !m.is_dir() => {
                return Err(EyepairError::Io(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a folder: {}", path.display()),
                )));
            }
            Ok(_) => {}
        }
        let mut entries = fs::read_dir(path).map_err(io_error_with_help_io("list folder", path))?;
        if entries.next().is_some() {
            return Err(EyepairError::NotEmpty(path.to_path_buf()));
        }
        self.first_tier("rmdir", path, |t| t.remove_dir(path), || !exists_no_follow(path))
    }

    pub(crate) fn try_rename_folder(&self, src: &Path, dst: &Path) -> Result<BackendTier, EyepairError> {
        if !src.is_dir() {
            return Err(EyepairError::Io(io_error_with_help_io("rename folder", src)(
                io::Error::from(io::ErrorKind::NotFound),
            )));
        }
        if exists_no_follow(dst) {
            return Err(EyepairError::Io(io_error_with_help_io("rename folder", dst)(
                io::Error::from(io::ErrorKind::AlreadyExists),
            )));
        }

        // Direct rename, then document-tree rename (same parent only).
        for tier in &self.tiers {
            if matches!(tier, Tier::LegacyContentProvider(_)) {
                continue;
            }
            match tier.rename(src, dst) {
                Ok(()) if dst.is_dir() => return Ok(tier.label()),
                Ok(()) => {}
                Err(e) => {
                    debug!(tier = %tier.label(), src = %src.display(), error = %e, "Folder rename failed; trying next")
                }
            }
        }

        // Manual move of the children. The emptied source folder stays behind.
        let tier = self.try_mkdir(dst)?;
        let children = sorted_children(src)?;
        for child in &children {
            let Some(name) = child.file_name() else { continue };
            if child.is_dir() {
                return Err(EyepairError::PartialFailure {
                    path: child.clone(),
                    context: "nested folders cannot be moved by copying".into(),
                });
            }
            let target = dst.join(name);
            self.try_copy_with(child, &target, DurabilityMode::Full)
                .map_err(|e| EyepairError::PartialFailure {
                    path: child.clone(),
                    context: format!("copy to {} failed: {e}", target.display()),
                })?;
        }
        for child in &children {
            self.try_delete(child)
                .map_err(|e| EyepairError::PartialFailure {
                    path: child.clone(),
                    context: format!("delete after copy failed: {e}"),
                })?;
        }
        info!(src = %src.display(), dst = %dst.display(), files = children.len(), "Folder contents moved by copy");
        Ok(tier)
    }

    /// Copy `src` to `dst` (overwriting). True on success.
    pub fn copy(&self, src: &Path, dst: &Path) -> bool {
        log_outcome("copy", dst, &self.try_copy(src, dst))
    }

    /// Move a file: rename if possible, else copy then delete the source.
    pub fn move_file(&self, src: &Path, dst: &Path) -> bool {
        log_outcome("move", dst, &self.try_move_file(src, dst))
    }

    /// Delete a file. A missing file counts as deleted.
    pub fn delete(&self, path: &Path) -> bool {
        log_outcome("delete", path, &self.try_delete(path))
    }

    /// Create a folder. True if it exists as a folder afterwards.
    pub fn mkdir(&self, path: &Path) -> bool {
        log_outcome("mkdir", path, &self.try_mkdir(path))
    }

    /// Remove an empty folder. Non-empty folders are left alone and give false.
    pub fn rmdir(&self, path: &Path) -> bool {
        log_outcome("rmdir", path, &self.try_rmdir(path))
    }

    /// Rename a folder. False if the target exists. When it has to fall back to
    /// copying, the emptied source folder is left in place.
    pub fn rename_folder(&self, src: &Path, dst: &Path) -> bool {
        log_outcome("rename_folder", src, &self.try_rename_folder(src, dst))
    }

    /// Delete every non-folder child of `folder`; keeps going after failures.
    pub fn delete_files_in_folder(&self, folder: &Path) -> bool {
        let children = match sorted_children(folder) {
            Ok(c) => c,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "Cannot list folder");
                return false;
            }
        };
        let mut all_ok = true;
        for child in children.iter().filter(|c| !c.is_dir()) {
            if let Err(e) = self.try_delete(child) {
                warn!(path = %child.display(), code = e.code(), error = %e, "Failed to delete file");
                all_ok = false;
            }
        }
        all_ok
    }

    /// Append-open probe of a single path.
    pub fn is_writable(&self, path: &Path) -> bool {
        self.direct()
            .is_some_and(|d| probe::is_writable(d, path))
    }

    /// Can files be created in `folder`, directly or through the document tree?
    pub fn is_writable_via_tree_backend(&self, folder: &Path) -> bool {
        let fallback = DirectFs::default();
        let direct = self.direct().unwrap_or(&fallback);
        probe::is_writable_via_tree_backend(direct, self.tree(), folder)
    }
}

fn sorted_children(folder: &Path) -> Result<Vec<PathBuf>, EyepairError> {
    let mut children = fs::read_dir(folder)
        .map_err(io_error_with_help_io("list folder", folder))?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalTreeProvider;
    use crate::storage::TreeUri;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn direct_only() -> StorageExecutor {
        StorageExecutor::new(StorageContext::new())
    }

    /// Direct writes refused under `card`; the tree backend serves the same folder.
    fn tree_fallback(card: &Path) -> StorageExecutor {
        let uri = TreeUri::parse(&format!("file://{}", card.display())).unwrap();
        StorageExecutor::new(
            StorageContext::new()
                .with_storage_root(card)
                .with_direct_readonly_root(card)
                .with_tree(uri, Arc::new(LocalTreeProvider::new(card))),
        )
    }

    #[test]
    fn copy_direct() {
        let td = tempdir().unwrap();
        let src = td.path().join("a.jpg");
        fs::write(&src, b"abc").unwrap();
        let ex = direct_only();
        assert_eq!(ex.try_copy(&src, &td.path().join("b.jpg")).unwrap(), BackendTier::Direct);
        assert_eq!(fs::read(td.path().join("b.jpg")).unwrap(), b"abc");
    }

    #[test]
    fn copy_falls_back_to_tree() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir(&card).unwrap();
        let src = td.path().join("a.jpg");
        fs::write(&src, b"abc").unwrap();
        let ex = tree_fallback(&card);
        let dst = card.join("Eyes").join("a.jpg");
        assert_eq!(ex.try_copy(&src, &dst).unwrap(), BackendTier::TreeDocument);
        assert_eq!(fs::read(&dst).unwrap(), b"abc");
    }

    #[test]
    fn copy_without_any_writable_tier_fails() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir(&card).unwrap();
        let src = td.path().join("a.jpg");
        fs::write(&src, b"abc").unwrap();
        let ex = StorageExecutor::new(StorageContext::new().with_direct_readonly_root(&card));
        let err = ex.try_copy(&src, &card.join("a.jpg")).unwrap_err();
        assert!(matches!(err, EyepairError::BackendUnavailable { op: "copy", .. }));
        assert!(!ex.copy(&src, &card.join("a.jpg")));
    }

    #[test]
    fn delete_missing_is_success() {
        let td = tempdir().unwrap();
        assert!(direct_only().delete(&td.path().join("nothing.jpg")));
    }

    #[test]
    fn mkdir_existing_file_is_false() {
        let td = tempdir().unwrap();
        let f = td.path().join("f");
        fs::write(&f, b"").unwrap();
        let ex = direct_only();
        assert!(!ex.mkdir(&f));
        assert!(ex.mkdir(td.path()));
    }

    #[test]
    fn rmdir_non_empty_is_refused() {
        let td = tempdir().unwrap();
        let d = td.path().join("d");
        fs::create_dir(&d).unwrap();
        fs::write(d.join("keep.jpg"), b"x").unwrap();
        let ex = direct_only();
        assert!(matches!(ex.try_rmdir(&d), Err(EyepairError::NotEmpty(_))));
        assert!(d.join("keep.jpg").exists());
    }

    #[test]
    fn rmdir_via_tree() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        let d = card.join("old");
        fs::create_dir_all(&d).unwrap();
        let ex = tree_fallback(&card);
        assert_eq!(ex.try_rmdir(&d).unwrap(), BackendTier::TreeDocument);
        assert!(!d.exists());
    }

    #[test]
    fn rename_folder_target_exists_is_false() {
        let td = tempdir().unwrap();
        let a = td.path().join("a");
        let b = td.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        assert!(!direct_only().rename_folder(&a, &b));
        assert!(a.is_dir());
    }

    #[test]
    fn rename_folder_tree_same_parent() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir_all(card.join("Anna")).unwrap();
        fs::write(card.join("Anna/l.jpg"), b"l").unwrap();
        let ex = tree_fallback(&card);
        let tier = ex
            .try_rename_folder(&card.join("Anna"), &card.join("Anna B"))
            .unwrap();
        assert_eq!(tier, BackendTier::TreeDocument);
        assert!(card.join("Anna B/l.jpg").exists());
        assert!(!card.join("Anna").exists());
    }

    #[test]
    fn rename_folder_across_parents_copies_children() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir_all(card.join("in/Anna")).unwrap();
        fs::create_dir_all(card.join("out")).unwrap();
        fs::write(card.join("in/Anna/l.jpg"), b"l").unwrap();
        fs::write(card.join("in/Anna/r.jpg"), b"r").unwrap();
        let ex = tree_fallback(&card);
        assert!(ex.rename_folder(&card.join("in/Anna"), &card.join("out/Anna")));
        assert_eq!(fs::read(card.join("out/Anna/l.jpg")).unwrap(), b"l");
        assert_eq!(fs::read(card.join("out/Anna/r.jpg")).unwrap(), b"r");
        // emptied source is left for the reclaimer
        assert!(card.join("in/Anna").is_dir());
        assert_eq!(fs::read_dir(card.join("in/Anna")).unwrap().count(), 0);
    }

    #[test]
    fn rename_folder_nested_dir_is_partial_failure() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir_all(card.join("in/Anna/sub")).unwrap();
        fs::create_dir_all(card.join("out")).unwrap();
        let ex = tree_fallback(&card);
        let err = ex
            .try_rename_folder(&card.join("in/Anna"), &card.join("out/Anna"))
            .unwrap_err();
        assert!(matches!(err, EyepairError::PartialFailure { .. }));
        // target was created and is not rolled back
        assert!(card.join("out/Anna").is_dir());
    }

    #[test]
    fn delete_files_in_folder_skips_subfolders() {
        let td = tempdir().unwrap();
        fs::write(td.path().join("a"), b"").unwrap();
        fs::write(td.path().join("b"), b"").unwrap();
        fs::create_dir(td.path().join("sub")).unwrap();
        assert!(direct_only().delete_files_in_folder(td.path()));
        assert!(!td.path().join("a").exists());
        assert!(td.path().join("sub").is_dir());
    }

    #[test]
    fn probe_via_tree_cleans_up() {
        let td = tempdir().unwrap();
        let card = td.path().join("card");
        fs::create_dir(&card).unwrap();
        let ex = tree_fallback(&card);
        assert!(!ex.is_writable(&card.join("x")));
        assert!(ex.is_writable_via_tree_backend(&card));
        assert_eq!(fs::read_dir(&card).unwrap().count(), 0);

        let plain = direct_only();
        assert!(!plain.is_writable_via_tree_backend(&td.path().join("nope")));
    }
}

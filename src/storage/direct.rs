//! Direct filesystem tier.
//!
//! Writes go straight through std::fs. Roots listed in `readonly_roots` model mounts
//! where the host grants reads but refuses direct writes (removable cards on newer
//! systems); every mutating call under them fails with PermissionDenied.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::helpers::io_error_with_help_io;
use super::io_copy::OutputStream;
use crate::utils::{canonicalize_lenient, is_within};

#[derive(Debug, Clone, Default)]
pub(crate) struct DirectFs {
    readonly_roots: Vec<PathBuf>,
}

impl DirectFs {
    pub(crate) fn new(readonly_roots: &[PathBuf]) -> Self {
        Self {
            readonly_roots: readonly_roots
                .iter()
                .map(|r| canonicalize_lenient(r))
                .collect(),
        }
    }

    fn guard(&self, path: &Path) -> io::Result<()> {
        if self.readonly_roots.is_empty() {
            return Ok(());
        }
        let canon = canonicalize_lenient(path);
        if self.readonly_roots.iter().any(|r| is_within(&canon, r)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("direct writes refused below read-only root: {}", path.display()),
            ));
        }
        Ok(())
    }

    pub(crate) fn open_output(&self, path: &Path) -> io::Result<OutputStream> {
        self.guard(path)?;
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_error_with_help_io("open for writing", path))?;
        Ok(OutputStream::File(f))
    }

    pub(crate) fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.guard(path)?;
        fs::remove_file(path).map_err(io_error_with_help_io("delete file", path))
    }

    pub(crate) fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.guard(path)?;
        fs::create_dir_all(path).map_err(io_error_with_help_io("create folder", path))
    }

    pub(crate) fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.guard(path)?;
        fs::remove_dir(path).map_err(io_error_with_help_io("remove folder", path))
    }

    pub(crate) fn rename(&self, src: &Path, dst: &Path) -> io::Result<()> {
        self.guard(src)?;
        self.guard(dst)?;
        fs::rename(src, dst).map_err(io_error_with_help_io("rename", src))?;
        #[cfg(unix)]
        if let Some(parent) = dst.parent() {
            let _ = fs::File::open(parent).and_then(|d| d.sync_all());
        }
        Ok(())
    }

    /// Open for append (creating if needed), close, and report success. A file
    /// created only for the probe is removed again.
    pub(crate) fn probe_append(&self, path: &Path) -> bool {
        if self.guard(path).is_err() {
            return false;
        }
        let existed = path.exists();
        let ok = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .is_ok();
        if !existed && path.exists() {
            let _ = fs::remove_file(path);
        }
        ok
    }
}

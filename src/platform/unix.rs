//! Unix helpers: owner-only modes, durable config writes.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use super::temp::config_temp_sibling;

/// Append-open the log file. A new file is created 0600; an existing file keeps
/// whatever mode the administrator gave it.
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let created = fs::symlink_metadata(path).is_err();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    if created {
        // umask may have narrowed or widened the create mode
        set_file_mode_0600(path)?;
    }
    Ok(file)
}

/// Write `contents` to `path` through a 0600 temp sibling, fsync it, rename it
/// over `path`, then fsync the directory.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("create config dir '{}'", dir.display()))?;

    let tmp = config_temp_sibling(path);
    let written = (|| -> io::Result<()> {
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&tmp)?;
        f.write_all(contents)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("write config '{}'", path.display()));
    }

    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("fsync config dir '{}'", dir.display()))?;
    Ok(())
}

pub fn set_dir_mode_0700(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

pub fn set_file_mode_0600(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

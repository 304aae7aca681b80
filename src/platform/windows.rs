//! Non-Unix fallbacks. There are no POSIX modes to apply; config writes still go
//! through a temp sibling and a rename.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::temp::config_temp_sibling;

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create config dir '{}'", dir.display()))?;
    }
    let tmp = config_temp_sibling(path);
    let written = (|| -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        f.write_all(contents)?;
        f.sync_all()?;
        // rename does not replace an existing file on every Windows filesystem
        if path.exists() {
            fs::remove_file(path)?;
        }
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("write config '{}'", path.display()));
    }
    Ok(())
}

pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn set_file_mode_0600(_path: &Path) -> io::Result<()> {
    Ok(())
}

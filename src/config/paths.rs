//! Default config/log locations and the symlink-ancestor check.

use dirs::{config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file (or a directory holding
/// `config.xml`).
pub const CONFIG_ENV_VAR: &str = "EYEPAIR_CONFIG";

const APP_DIR: &str = "eyepair";
const CONFIG_FILE: &str = "config.xml";
const LOG_FILE: &str = "eyepair.log";

fn home_fallback(parts: &[&str]) -> Option<PathBuf> {
    let mut p = PathBuf::from(env::var_os("HOME")?);
    for part in parts {
        p.push(part);
    }
    Some(p)
}

/// Config file location: `$EYEPAIR_CONFIG` if set (relative paths resolve against
/// the current directory), else the per-user config dir.
pub fn default_config_path() -> io::Result<PathBuf> {
    if let Some(raw) = env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
        let mut p = PathBuf::from(raw);
        if p.is_relative() {
            p = env::current_dir()?.join(p);
        }
        if p.is_dir() {
            p.push(CONFIG_FILE);
        }
        return Ok(p);
    }
    config_dir()
        .map(|d| d.join(APP_DIR).join(CONFIG_FILE))
        .or_else(|| home_fallback(&[".config", APP_DIR, CONFIG_FILE]))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory for this user"))
}

/// Log file location under the per-user data dir.
pub fn default_log_path() -> io::Result<PathBuf> {
    data_dir()
        .map(|d| d.join(APP_DIR).join(LOG_FILE))
        .or_else(|| home_fallback(&[".local", "share", APP_DIR, LOG_FILE]))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no data directory for this user"))
}

/// True if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    for anc in path.ancestors().skip(1) {
        if anc.as_os_str().is_empty() {
            continue;
        }
        match fs::symlink_metadata(anc) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_ancestors_are_not_symlinks() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("a").join("b").join("config.xml");
        assert!(!path_has_symlink_ancestor(&p).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ancestor_is_detected() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(path_has_symlink_ancestor(&link.join("config.xml")).unwrap());
    }
}

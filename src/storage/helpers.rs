//! I/O error enrichment.
//!
//! Wraps io::Error with the operation, the path and a platform hint, for use
//! with `map_err`.
//!
//! Usage:
//!   fs::create_dir(dir).map_err(io_error_with_help_io("create folder", dir))?;

use std::io;
use std::path::Path;

#[cfg(unix)]
fn hint_for_os_code(code: i32) -> Option<&'static str> {
    let hint = match code {
        libc::EACCES | libc::EPERM => "permission denied; the backend may need a document grant",
        libc::EXDEV => "different filesystem; rename is not possible, copy instead",
        libc::EBUSY => "resource busy; another process holds the file",
        libc::ENOENT => "path not found; verify it exists",
        libc::EEXIST => "already exists; remove the target or pick another name",
        libc::ENOSPC => "insufficient space on device",
        libc::EROFS => "read-only filesystem; direct writes are not possible here",
        libc::ENOTEMPTY => "directory not empty",
        libc::ELOOP => "too many symbolic link levels; possible symlink cycle",
        libc::ENAMETOOLONG => "file name or path too long",
        libc::EMFILE => "process file descriptor limit reached",
        libc::ENFILE => "system-wide file table overflow",
        _ => return None,
    };
    Some(hint)
}

#[cfg(windows)]
fn hint_for_os_code(code: i32) -> Option<&'static str> {
    let hint = match code {
        5 => "access denied; check permissions",
        17 => "not same device; rename across volumes is not possible",
        32 => "sharing violation; file is in use",
        2 | 3 => "path not found; verify it exists",
        80 | 183 => "already exists; remove the target or pick another name",
        112 => "insufficient disk space",
        19 => "write protected media",
        145 => "directory not empty",
        206 => "file name or path too long",
        _ => return None,
    };
    Some(hint)
}

#[cfg(not(any(unix, windows)))]
fn hint_for_os_code(_code: i32) -> Option<&'static str> {
    None
}

fn hint_for_kind(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => Some("permission denied; check write access"),
        io::ErrorKind::NotFound => Some("path not found; verify it exists"),
        io::ErrorKind::AlreadyExists => Some("already exists; remove or choose another name"),
        io::ErrorKind::Unsupported => Some("not supported by this storage backend"),
        _ => None,
    }
}

fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);
    match e.raw_os_error() {
        Some(code) => {
            if let Some(hint) = hint_for_os_code(code) {
                msg.push_str("; ");
                msg.push_str(hint);
            }
            msg.push_str(&format!(" [os code: {code}]"));
        }
        None => {
            if let Some(hint) = hint_for_kind(e.kind()) {
                msg.push_str("; ");
                msg.push_str(hint);
            }
        }
    }
    msg
}

/// Adapter for io::Result code; keeps the original ErrorKind.
pub fn io_error_with_help_io<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> io::Error + 'a {
    move |e: io::Error| io::Error::new(e.kind(), build_message(op, path, &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_gets_backend_hint() {
        let p = Path::new("/card/DCIM/a.jpg");
        let e = io_error_with_help_io("rename", p)(io::Error::from(io::ErrorKind::Unsupported));
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);
        assert!(e.to_string().contains("storage backend"));
        assert!(e.to_string().contains("/card/DCIM/a.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn enotempty_hint_present() {
        let msg = build_message(
            "remove folder",
            Path::new("/tmp/x"),
            &io::Error::from_raw_os_error(libc::ENOTEMPTY),
        );
        assert!(msg.contains("directory not empty"), "msg was: {msg}");
        assert!(msg.contains("os code"));
    }
}

//! Temp-then-rename rewrite protocol.
//!
//! 1. Write the full new content to `<target>.temp` (refuse if that name is taken).
//! 2. Flush, sync and close it.
//! 3. Delete the target.
//! 4. Rename the temp onto the target. When no tier can rename (the legacy media
//!    index), stream the temp into the target and delete the temp instead.
//!
//! A failure in 1-3 removes the temp and leaves the target untouched. A failure in
//! 4 leaves only the temp behind; that window is logged, not repaired. No locking.
//! Every step goes through the executor, so it works on any tier.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use super::io_copy::DurabilityMode;
use super::{BackendTier, StorageExecutor};
use crate::errors::EyepairError;

/// Suffix of the temporary sibling written before the swap.
pub const TEMP_SUFFIX: &str = ".temp";

/// `<target>.temp` next to the target.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(TEMP_SUFFIX);
    target.with_file_name(name)
}

/// Refuse early when the volume clearly lacks room for `needed` bytes.
fn ensure_space(dir: &Path, needed: u64, target: &Path) -> Result<(), EyepairError> {
    match fs2::available_space(dir) {
        Ok(available) if available < needed => Err(EyepairError::InsufficientSpace {
            required: needed,
            available,
            path: target.to_path_buf(),
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Free space unknown; continuing");
            Ok(())
        }
    }
}

/// Replace (or create) `target` with whatever `write` produces.
/// Returns the tier that wrote the temp file.
pub fn write_atomically<F>(
    storage: &StorageExecutor,
    target: &Path,
    write: F,
) -> Result<BackendTier, EyepairError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let temp = temp_path_for(target);
    if fs::symlink_metadata(&temp).is_ok() {
        return Err(EyepairError::TempFileConflict(temp));
    }
    if let (Some(dir), Ok(meta)) = (target.parent(), fs::metadata(target)) {
        ensure_space(dir, meta.len(), target)?;
    }

    let (mut out, tier) = storage.open_output(&temp)?;
    let written = write(&mut out).and_then(|()| out.finish(DurabilityMode::Full));
    if let Err(e) = written {
        warn!(temp = %temp.display(), error = %e, "Writing temp file failed; target left untouched");
        if storage.try_delete(&temp).is_err() {
            debug!(temp = %temp.display(), "Temp file could not be removed");
        }
        return Err(e.into());
    }
    debug!(temp = %temp.display(), tier = %tier, "Temp file written");

    if fs::symlink_metadata(target).is_ok() {
        if let Err(e) = storage.try_delete(target) {
            // Target still intact; drop the temp again.
            let _ = storage.try_delete(&temp);
            return Err(e);
        }
    }

    if let Err(e) = commit(storage, &temp, target) {
        error!(
            target = %target.display(),
            temp = %temp.display(),
            error = %e,
            "Target deleted but temp could not be moved into place; content is only in the temp file"
        );
        return Err(e);
    }
    Ok(tier)
}

/// Put the finished temp in place of the (already deleted) target.
fn commit(storage: &StorageExecutor, temp: &Path, target: &Path) -> Result<(), EyepairError> {
    match storage.try_rename_file(temp, target) {
        Ok(_) => return Ok(()),
        Err(e) => {
            debug!(temp = %temp.display(), error = %e, "No tier can rename; copying the temp into place")
        }
    }
    let tier = storage.try_copy_with(temp, target, DurabilityMode::Full)?;
    if let Err(e) = storage.try_delete(temp) {
        warn!(temp = %temp.display(), error = %e, "Target written but the temp file could not be removed");
        return Err(EyepairError::PartialFailure {
            path: temp.to_path_buf(),
            context: format!("{} was written but the temp file is still there: {e}", target.display()),
        });
    }
    debug!(target = %target.display(), tier = %tier, "Temp copied into place");
    Ok(())
}

//! Path helpers shared by the storage layer and the CLI.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Canonicalize a path that may not exist yet.
///
/// The deepest existing ancestor is canonicalized (symlinks resolved, no `\\?\`
/// prefix on Windows thanks to dunce) and the remaining components are appended
/// lexically. `.` components are dropped and `..` pops the tail.
pub fn canonicalize_lenient(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let Ok(base) = dunce::canonicalize(ancestor) {
            let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
            return append_lexical(base, rest);
        }
    }
    append_lexical(PathBuf::new(), path)
}

fn append_lexical(mut base: PathBuf, rest: &Path) -> PathBuf {
    for comp in rest.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    base
}

/// True when `path` lies at or below `root`. Comparison is per component, so
/// `/mnt/sd10` is not inside `/mnt/sd1`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Folder names camera apps commonly use below DCIM, in lookup order.
pub const CAMERA_FOLDER_NAMES: [&str; 3] = ["Camera", "100ANDRO", "100MEDIA"];

/// Best guess for the folder a camera app writes into below `dcim`.
pub fn default_camera_folder(dcim: &Path) -> Option<PathBuf> {
    CAMERA_FOLDER_NAMES
        .iter()
        .map(|name| dcim.join(name))
        .find(|candidate| candidate.is_dir())
}

/// Camera folders below `<root>/DCIM` for each root that has one.
pub fn camera_folders(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .filter_map(|root| default_camera_folder(&root.join("DCIM")))
        .collect()
}

/// Derive the storage root from an app-specific directory such as
/// `/storage/ABCD-1234/Android/data/org.example/files`, giving `/storage/ABCD-1234`.
/// Returns None when the path has no `Android/data` pair.
pub fn storage_root_from_app_dir(app_dir: &Path) -> Option<PathBuf> {
    let comps: Vec<Component<'_>> = app_dir.components().collect();
    let idx = comps.windows(2).position(|w| {
        w[0].as_os_str() == OsStr::new("Android") && w[1].as_os_str() == OsStr::new("data")
    })?;
    if idx == 0 {
        return None;
    }
    Some(comps[..idx].iter().collect())
}

/// True for `.jpg` / `.jpeg` in any case.
pub fn has_jpeg_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

/// JPEG files at or below `root`, sorted. A file path is returned as-is; unreadable
/// entries are skipped. Symlinks are not followed.
pub fn find_jpegs(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_jpeg_extension(e.path()))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

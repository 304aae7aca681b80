//! Legacy content-provider tier.
//!
//! Some hosts refuse direct writes to removable storage and offer no document tree,
//! but their system media index still writes there on the app's behalf. This tier
//! drives that index:
//! - write: register an image entry for the path, then stream through the index
//! - delete: register the path, then remove the entry so the index deletes the file
//! - mkdir: point an album-art entry at `<dir>/dummyImage.jpg`, open it so the index
//!   creates the folder, then delete the dummy
//!
//! `MediaIndex` is the seam to the host index. `LocalMediaIndex` is a file-backed
//! stand-in (JSON registry via serde_json) that performs the same filesystem effects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::helpers::io_error_with_help_io;
use super::io_copy::OutputStream;

/// Name of the placeholder image used to make the index create a folder.
pub const DUMMY_IMAGE_NAME: &str = "dummyImage.jpg";
/// Seed files copied into the seed folder before the first legacy mkdir.
pub const SEED_ALBUM_ART_NAME: &str = "albumart.jpg";
pub const SEED_SILENCE_NAME: &str = "silence.mp3";

/// Smallest JPEG the index accepts as album art (SOI, APP0/JFIF, EOI).
const SEED_ALBUM_ART: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

/// An empty ID3v2.3 tag followed by one silent MPEG-1 Layer III frame header.
const SEED_SILENCE: &[u8] = &[
    b'I', b'D', b'3', 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFB, 0x90, 0x64, 0x00,
    0x00, 0x00, 0x00,
];

/// Host media index, as seen by the legacy tier.
pub trait MediaIndex: Send + Sync + fmt::Debug {
    /// Write stream for `path`, created by the index on the app's behalf.
    fn open_output(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Register `path` as an image entry.
    fn register_image(&self, path: &Path) -> io::Result<()>;

    /// Remove the entry for `path`; the index deletes the file (or empty folder).
    fn remove_entry(&self, path: &Path) -> io::Result<()>;

    /// Album id of an audio file, scanning it into the index if needed.
    fn album_id_for_audio(&self, path: &Path) -> io::Result<Option<i64>>;

    /// Point an existing album-art row at `data_path`. False if there is no row.
    fn update_album_art(&self, album_id: i64, data_path: &Path) -> io::Result<bool>;

    fn insert_album_art(&self, album_id: i64, data_path: &Path) -> io::Result<()>;

    /// Open the album art, which makes the index materialize its data path.
    fn touch_album_art(&self, album_id: i64) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EntryKind {
    Image,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    album_id: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    next_album_id: i64,
    entries: BTreeMap<String, IndexEntry>,
    album_art: BTreeMap<i64, String>,
}

/// File-backed media index. Entries persist as JSON at `index_file`.
#[derive(Debug)]
pub struct LocalMediaIndex {
    index_file: PathBuf,
    state: Mutex<IndexState>,
}

impl LocalMediaIndex {
    /// Open (or start) the registry at `index_file`.
    pub fn open(index_file: impl Into<PathBuf>) -> io::Result<Self> {
        let index_file = index_file.into();
        let state = match fs::read(&index_file) {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Ok(_) => IndexState::default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => IndexState::default(),
            Err(e) => return Err(io_error_with_help_io("read media index", &index_file)(e)),
        };
        Ok(Self {
            index_file,
            state: Mutex::new(state),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut IndexState) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| io::Error::other("media index lock poisoned"))?;
        let out = f(&mut guard)?;
        self.persist(&guard)?;
        Ok(out)
    }

    fn persist(&self, state: &IndexState) -> io::Result<()> {
        if let Some(parent) = self.index_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(io::Error::other)?;
        fs::write(&self.index_file, json)
            .map_err(io_error_with_help_io("write media index", &self.index_file))
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Number of registered entries (test and diagnostics helper).
    pub fn entry_count(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }
}

impl MediaIndex for LocalMediaIndex {
    fn open_output(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_error_with_help_io("media index write", path))?;
        Ok(Box::new(f))
    }

    fn register_image(&self, path: &Path) -> io::Result<()> {
        self.with_state(|s| {
            s.entries.insert(
                Self::key(path),
                IndexEntry {
                    kind: EntryKind::Image,
                    album_id: None,
                },
            );
            Ok(())
        })
    }

    fn remove_entry(&self, path: &Path) -> io::Result<()> {
        self.with_state(|s| {
            if s.entries.remove(&Self::key(path)).is_none() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no media index entry for {}", path.display()),
                ));
            }
            match fs::symlink_metadata(path) {
                Ok(m) if m.is_dir() => fs::remove_dir(path)?,
                Ok(_) => fs::remove_file(path)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            Ok(())
        })
    }

    fn album_id_for_audio(&self, path: &Path) -> io::Result<Option<i64>> {
        if !path.is_file() {
            return Ok(None);
        }
        self.with_state(|s| {
            let key = Self::key(path);
            if let Some(id) = s.entries.get(&key).and_then(|e| e.album_id) {
                return Ok(Some(id));
            }
            s.next_album_id += 1;
            let id = s.next_album_id;
            s.entries.insert(
                key,
                IndexEntry {
                    kind: EntryKind::Audio,
                    album_id: Some(id),
                },
            );
            Ok(Some(id))
        })
    }

    fn update_album_art(&self, album_id: i64, data_path: &Path) -> io::Result<bool> {
        self.with_state(|s| match s.album_art.get_mut(&album_id) {
            Some(existing) => {
                *existing = Self::key(data_path);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    fn insert_album_art(&self, album_id: i64, data_path: &Path) -> io::Result<()> {
        self.with_state(|s| {
            s.album_art.insert(album_id, Self::key(data_path));
            Ok(())
        })
    }

    fn touch_album_art(&self, album_id: i64) -> io::Result<()> {
        let data = self
            .with_state(|s| Ok(s.album_art.get(&album_id).cloned()))?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no album art {album_id}"))
            })?;
        let data = PathBuf::from(data);
        if let Some(parent) = data.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().write(true).create(true).open(&data)?;
        Ok(())
    }
}

/// Legacy tier: index plus the folder holding the seed files.
#[derive(Debug, Clone)]
pub(crate) struct LegacyTier {
    index: Arc<dyn MediaIndex>,
    seed_dir: PathBuf,
}

impl LegacyTier {
    pub(crate) fn new(index: Arc<dyn MediaIndex>, seed_dir: PathBuf) -> Self {
        Self { index, seed_dir }
    }

    pub(crate) fn open_output(&self, path: &Path) -> io::Result<OutputStream> {
        self.index.register_image(path)?;
        Ok(OutputStream::Stream(self.index.open_output(path)?))
    }

    pub(crate) fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.index.register_image(path)?;
        self.index.remove_entry(path)
    }

    pub(crate) fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.index.register_image(path)?;
        self.index.remove_entry(path)
    }

    pub(crate) fn rename(&self, src: &Path, _dst: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("media index cannot rename {}", src.display()),
        ))
    }

    /// Copy the seed files into the seed folder if missing; returns the silence track.
    fn ensure_seed_files(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.seed_dir)
            .map_err(io_error_with_help_io("create seed folder", &self.seed_dir))?;
        for (name, bytes) in [
            (SEED_ALBUM_ART_NAME, SEED_ALBUM_ART),
            (SEED_SILENCE_NAME, SEED_SILENCE),
        ] {
            let target = self.seed_dir.join(name);
            if !target.exists() {
                let mut f = File::create(&target)
                    .map_err(io_error_with_help_io("write seed file", &target))?;
                f.write_all(bytes)?;
            }
        }
        Ok(self.seed_dir.join(SEED_SILENCE_NAME))
    }

    pub(crate) fn create_dir(&self, path: &Path) -> io::Result<()> {
        let silence = self.ensure_seed_files()?;
        let album_id = self.index.album_id_for_audio(&silence)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("media index has no album for {}", silence.display()),
            )
        })?;
        let dummy = path.join(DUMMY_IMAGE_NAME);
        if !self.index.update_album_art(album_id, &dummy)? {
            self.index.insert_album_art(album_id, &dummy)?;
        }
        let touched = self.index.touch_album_art(album_id);

        // The dummy goes whether or not the touch worked.
        if dummy.exists() {
            if let Err(e) = self.delete_file(&dummy) {
                warn!(path = %dummy.display(), error = %e, "Could not remove placeholder image");
            }
        }
        touched?;
        debug!(path = %path.display(), album_id, "Folder created through media index");
        Ok(())
    }
}

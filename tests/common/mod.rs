#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyepair::storage::{LocalMediaIndex, LocalTreeProvider, TreeUri};
use eyepair::{StorageContext, StorageExecutor};

fn segment(marker: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Small baseline JPEG (8x8 grey) with a JFIF header and no metadata.
pub fn tiny_jpeg() -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));
    let mut dqt = vec![0x00];
    dqt.extend([1u8; 64]);
    out.extend(segment(0xDB, &dqt));
    out.extend(segment(0xC0, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]));
    for class in [0x00u8, 0x10] {
        let mut dht = vec![class, 1];
        dht.extend([0u8; 15]);
        dht.push(0);
        out.extend(segment(0xC4, &dht));
    }
    out.extend(segment(0xDA, &[1, 1, 0, 0, 63, 0]));
    out.extend([0x00, 0x3F, 0xFF, 0xD9]);
    out
}

/// Write a fresh test image at `dir/name`.
pub fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, tiny_jpeg()).expect("write jpeg");
    p
}

/// Direct filesystem only.
pub fn direct_storage() -> Arc<StorageExecutor> {
    Arc::new(StorageExecutor::new(StorageContext::new()))
}

/// Direct writes refused below `card`; the document tree serves the same folder.
pub fn card_storage(card: &Path) -> Arc<StorageExecutor> {
    let uri = TreeUri::parse(&format!("file://{}", card.display())).expect("tree uri");
    Arc::new(StorageExecutor::new(
        StorageContext::new()
            .with_storage_root(card)
            .with_direct_readonly_root(card)
            .with_tree(uri, Arc::new(LocalTreeProvider::new(card))),
    ))
}

/// Direct writes refused below `card`, no tree grant; the media index under `work`
/// is the only tier that can write there.
pub fn legacy_storage(card: &Path, work: &Path) -> Arc<StorageExecutor> {
    let index = LocalMediaIndex::open(work.join("index.json")).expect("media index");
    Arc::new(StorageExecutor::new(
        StorageContext::new()
            .with_direct_readonly_root(card)
            .with_media_index(Arc::new(index), work.join("seed")),
    ))
}

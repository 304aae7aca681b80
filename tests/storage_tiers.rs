mod common;

use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use eyepair::storage::LocalMediaIndex;
use eyepair::{BackendTier, StorageContext, StorageExecutor};

/// Direct writes refused below `card`, no tree grant, media index available.
fn legacy_only(card: &std::path::Path, work: &std::path::Path) -> StorageExecutor {
    let index = LocalMediaIndex::open(work.join("index.json")).unwrap();
    StorageExecutor::new(
        StorageContext::new()
            .with_direct_readonly_root(card)
            .with_media_index(Arc::new(index), work.join("seed")),
    )
}

#[test]
fn tiers_follow_configuration() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    fs::create_dir(&card).unwrap();
    assert_eq!(
        StorageExecutor::new(StorageContext::new()).tiers(),
        vec![BackendTier::Direct]
    );
    let ex = legacy_only(&card, td.path());
    assert_eq!(
        ex.tiers(),
        vec![BackendTier::Direct, BackendTier::LegacyContentProvider]
    );
}

#[test]
fn legacy_tier_creates_folder_and_copies_into_it() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    fs::create_dir(&card).unwrap();
    let src = common::write_jpeg(td.path(), "eye.jpg");
    let ex = legacy_only(&card, td.path());

    let folder = card.join("Eyes").join("Anna");
    assert!(ex.mkdir(&folder));
    assert!(folder.is_dir());
    // the placeholder used to provoke creation is gone again
    assert_eq!(fs::read_dir(&folder).unwrap().count(), 0);

    let dst = folder.join("eye.jpg");
    assert!(ex.copy(&src, &dst));
    assert_eq!(fs::read(&dst).unwrap(), fs::read(&src).unwrap());

    assert!(ex.delete(&dst));
    assert!(!dst.exists());
    assert!(ex.rmdir(&folder));
    assert!(!folder.exists());
}

#[test]
fn legacy_tier_moves_by_copy_then_delete() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    fs::create_dir(&card).unwrap();
    let ex = legacy_only(&card, td.path());

    // source on the card, so the direct rename is refused as well
    let src = card.join("eye.jpg");
    fs::write(&src, common::tiny_jpeg()).unwrap();
    let dst = card.join("eye_left.jpg");

    assert!(ex.move_file(&src, &dst));
    assert_eq!(fs::read(&dst).unwrap(), common::tiny_jpeg());
    assert!(!src.exists());
    assert!(!card.join("eye_left.jpg.temp").exists());
}

#[test]
fn tree_fallback_looks_like_direct_success() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    let local = td.path().join("local");
    fs::create_dir_all(&card).unwrap();
    fs::create_dir_all(&local).unwrap();
    let src = common::write_jpeg(td.path(), "eye.jpg");

    let tree = common::card_storage(&card);
    let direct = common::direct_storage();
    for (ex, root) in [(&tree, &card), (&direct, &local)] {
        let folder = root.join("Anna");
        assert!(ex.mkdir(&folder));
        assert!(ex.copy(&src, &folder.join("l.jpg")));
        assert!(ex.move_file(&folder.join("l.jpg"), &folder.join("left.jpg")));
        assert!(!ex.rmdir(&folder), "non-empty folder must stay");
        assert!(folder.join("left.jpg").is_file());
    }
    assert_eq!(
        fs::read(card.join("Anna/left.jpg")).unwrap(),
        fs::read(local.join("Anna/left.jpg")).unwrap()
    );
}

#[test]
fn probe_reports_tree_writability() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    fs::create_dir(&card).unwrap();
    let ex = common::card_storage(&card);
    assert!(!ex.is_writable(&card.join("eye.jpg")));
    assert!(ex.is_writable_via_tree_backend(&card));
    // the probe document is removed again
    assert_eq!(fs::read_dir(&card).unwrap().count(), 0);
    assert!(common::direct_storage().is_writable(&td.path().join("eye.jpg")));
    assert!(!td.path().join("eye.jpg").exists());
}

#[test]
fn clearing_a_folder_keeps_subfolders() {
    use assert_fs::prelude::*;

    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("l.jpg").write_binary(&common::tiny_jpeg()).unwrap();
    temp.child("notes.txt").write_str("left eye").unwrap();
    temp.child("archive").create_dir_all().unwrap();
    temp.child("archive/old.jpg").touch().unwrap();

    assert!(common::direct_storage().delete_files_in_folder(temp.path()));
    assert!(!temp.child("l.jpg").path().exists());
    assert!(!temp.child("notes.txt").path().exists());
    assert!(temp.child("archive/old.jpg").path().is_file());
}

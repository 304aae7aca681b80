mod common;

use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use eyepair::metadata::NS_EYE;
use eyepair::storage::rewrite::temp_path_for;
use eyepair::{EyepairError, Metadata, MetadataCodec, StorageContext, StorageExecutor, StoreOption};

fn eye_l() -> Metadata {
    Metadata {
        title: Some("Eye L".into()),
        comment: Some("follow-up".into()),
        x_center: Some(0.5),
        y_center: Some(0.4),
        overlay_scale_factor: Some(1.2),
        ..Default::default()
    }
}

#[test]
fn eye_scenario_survives_a_full_write() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "anna_l.jpg");
    let codec = MetadataCodec::new(common::direct_storage(), StoreOption::XmpAndExif);

    codec.write(&img, &eye_l()).unwrap();
    let back = codec.read(&img).unwrap();

    assert_eq!(back.title.as_deref(), Some("Eye L"));
    assert_eq!(back.comment.as_deref(), Some("follow-up"));
    assert_eq!(back.x_center, Some(0.5));
    assert_eq!(back.y_center, Some(0.4));
    assert_eq!(back.overlay_scale_factor, Some(1.2));
    assert!(back.has_coordinates());
    assert!(!temp_path_for(&img).exists());

    let exif = codec.dump_exif(&img).unwrap();
    assert!(
        exif.iter().any(|l| l.contains("ImageDescription") && l.contains("Eye L")),
        "EXIF lines: {exif:?}"
    );
}

#[test]
fn custom_title_wins_over_exif() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let storage = common::direct_storage();
    let full = MetadataCodec::new(storage.clone(), StoreOption::XmpAndExif);
    let xmp_only = MetadataCodec::new(storage, StoreOption::XmpOnly);

    full.write(
        &img,
        &Metadata {
            title: Some("Eye L".into()),
            ..Default::default()
        },
    )
    .unwrap();
    xmp_only
        .write(
            &img,
            &Metadata {
                title: Some("Eye R".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(full.read(&img).unwrap().title.as_deref(), Some("Eye R"));
    let exif = full.dump_exif(&img).unwrap();
    assert!(exif.iter().any(|l| l.contains("Eye L")));
    assert!(!exif.iter().any(|l| l.contains("Eye R")));
}

#[test]
fn xmp_only_leaves_exif_alone() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let storage = common::direct_storage();
    MetadataCodec::new(storage.clone(), StoreOption::XmpAndExif)
        .write(&img, &eye_l())
        .unwrap();

    let codec = MetadataCodec::new(storage, StoreOption::XmpOnly);
    let exif_before = codec.dump_exif(&img).unwrap();
    codec
        .write(
            &img,
            &Metadata {
                comment: Some("second visit".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(codec.dump_exif(&img).unwrap(), exif_before);
    let back = codec.read(&img).unwrap();
    assert_eq!(back.comment.as_deref(), Some("second visit"));
    // unassigned fields are kept
    assert_eq!(back.title.as_deref(), Some("Eye L"));
}

#[test]
fn disabled_store_option_never_touches_the_file() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let before = fs::read(&img).unwrap();
    MetadataCodec::new(common::direct_storage(), StoreOption::Disabled)
        .write(&img, &eye_l())
        .unwrap();
    assert_eq!(fs::read(&img).unwrap(), before);
}

#[test]
fn coordinates_are_only_complete_together() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let codec = MetadataCodec::new(common::direct_storage(), StoreOption::XmpOnly);
    codec
        .write(
            &img,
            &Metadata {
                x_center: Some(0.25),
                y_center: Some(-0.1),
                ..Default::default()
            },
        )
        .unwrap();

    let back = codec.read(&img).unwrap();
    assert_eq!(back.x_center, Some(0.25));
    assert_eq!(back.y_center, Some(-0.1));
    assert_eq!(back.overlay_scale_factor, None);
    assert!(!back.has_coordinates());
}

#[test]
fn leftover_temp_blocks_the_rewrite() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let before = fs::read(&img).unwrap();
    fs::write(temp_path_for(&img), b"stale").unwrap();

    let codec = MetadataCodec::new(common::direct_storage(), StoreOption::XmpAndExif);
    let err = codec.write(&img, &eye_l()).unwrap_err();
    assert!(matches!(err, EyepairError::TempFileConflict(_)));
    assert_eq!(fs::read(&img).unwrap(), before);
    assert_eq!(fs::read(temp_path_for(&img)).unwrap(), b"stale");
}

#[test]
fn tree_backend_write_matches_direct_write() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    let local = td.path().join("local");
    fs::create_dir_all(&card).unwrap();
    fs::create_dir_all(&local).unwrap();
    let on_card = common::write_jpeg(&card, "eye.jpg");
    let on_disk = common::write_jpeg(&local, "eye.jpg");

    MetadataCodec::new(common::card_storage(&card), StoreOption::XmpAndExif)
        .write(&on_card, &eye_l())
        .unwrap();
    MetadataCodec::new(common::direct_storage(), StoreOption::XmpAndExif)
        .write(&on_disk, &eye_l())
        .unwrap();

    assert_eq!(fs::read(&on_card).unwrap(), fs::read(&on_disk).unwrap());
    assert!(!temp_path_for(&on_card).exists());
}

#[test]
fn non_jpeg_input_is_unsupported() {
    let td = tempdir().unwrap();
    let p = td.path().join("scan.png");
    fs::write(&p, b"\x89PNG\r\n\x1a\n").unwrap();
    let codec = MetadataCodec::new(common::direct_storage(), StoreOption::XmpAndExif);
    assert!(matches!(codec.read(&p), Err(EyepairError::UnsupportedFormat(_))));
    assert!(matches!(
        codec.write(&p, &eye_l()),
        Err(EyepairError::UnsupportedFormat(_))
    ));
}

#[test]
fn every_field_survives_a_write() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "anna_r.jpg");
    let codec = MetadataCodec::new(common::direct_storage(), StoreOption::XmpAndExif);
    let full = Metadata {
        title: Some("Eye R".into()),
        description: Some("right eye, dilated".into()),
        subject: Some("iris".into()),
        comment: Some("control visit".into()),
        person: Some("Anna B".into()),
        x_center: Some(0.75),
        y_center: Some(0.25),
        overlay_scale_factor: Some(1.5),
    };

    codec.write(&img, &full).unwrap();
    assert_eq!(codec.read(&img).unwrap(), full);
    let packet = codec.dump_xmp(&img).unwrap().expect("xmp packet");
    assert!(packet.contains(NS_EYE));
}

#[test]
fn legacy_backend_write_keeps_the_image() {
    let td = tempdir().unwrap();
    let card = td.path().join("card");
    fs::create_dir_all(&card).unwrap();
    let img = common::write_jpeg(&card, "eye.jpg");
    let codec = MetadataCodec::new(common::legacy_storage(&card, td.path()), StoreOption::XmpAndExif);

    codec.write(&img, &eye_l()).unwrap();

    assert!(img.is_file());
    assert!(!temp_path_for(&img).exists());
    let back = codec.read(&img).unwrap();
    assert_eq!(back.title.as_deref(), Some("Eye L"));
    assert!(back.has_coordinates());
}

#[test]
fn refused_delete_leaves_original_untouched() {
    let td = tempdir().unwrap();
    let img = common::write_jpeg(td.path(), "eye.jpg");
    let before = fs::read(&img).unwrap();
    // The temp sibling can be written, but the image itself cannot be deleted.
    let storage = Arc::new(StorageExecutor::new(
        StorageContext::new().with_direct_readonly_root(&img),
    ));

    let err = MetadataCodec::new(storage, StoreOption::XmpAndExif)
        .write(&img, &eye_l())
        .unwrap_err();
    assert!(matches!(err, EyepairError::BackendUnavailable { .. }));
    assert_eq!(fs::read(&img).unwrap(), before);
    assert!(!temp_path_for(&img).exists());
}

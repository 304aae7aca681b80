use clap::Parser;

use eyepair::cli::{Args, Command};
use eyepair::{Config, LogLevel, StoreOption};

#[test]
fn global_flags_override_config() {
    let args = Args::try_parse_from([
        "eyepair",
        "--store-option",
        "1",
        "--tree-uri",
        "file:///mnt/card",
        "--log-level",
        "info",
        "rm",
        "/tmp/x.jpg",
    ])
    .unwrap();
    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.store_option, StoreOption::XmpOnly);
    assert_eq!(cfg.tree_uri.as_deref(), Some("file:///mnt/card"));
    assert_eq!(cfg.log_level, LogLevel::Info);
    assert!(matches!(args.command, Some(Command::Rm { .. })));
}

#[test]
fn unset_flags_keep_config_values() {
    let args = Args::try_parse_from(["eyepair"]).unwrap();
    let mut cfg = Config {
        store_option: StoreOption::Disabled,
        log_level: LogLevel::Quiet,
        ..Default::default()
    };
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.store_option, StoreOption::Disabled);
    assert_eq!(cfg.log_level, LogLevel::Quiet);
    assert!(args.command.is_none());
}

#[test]
fn debug_flag_wins_over_log_level() {
    let args = Args::try_parse_from(["eyepair", "--log-level", "quiet", "-d"]).unwrap();
    assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
    let args = Args::try_parse_from(["eyepair", "--log-level", "shouty"]).unwrap();
    assert_eq!(args.effective_log_level(), None);
}

#[test]
fn store_option_out_of_range_is_rejected() {
    assert!(Args::try_parse_from(["eyepair", "--store-option", "3", "rm", "x"]).is_err());
}

#[test]
fn annotate_collects_fields() {
    let args = Args::try_parse_from([
        "eyepair",
        "annotate",
        "/photos/anna_l.jpg",
        "--title",
        "Eye L",
        "--comment",
        "follow-up",
        "--x-center",
        "-0.5",
        "--y-center",
        "0.4",
        "--overlay-scale",
        "1.2",
    ])
    .unwrap();
    let Some(Command::Annotate { path, fields }) = args.command else {
        panic!("expected annotate");
    };
    assert_eq!(path.to_str(), Some("/photos/anna_l.jpg"));
    let meta = fields.to_metadata();
    assert_eq!(meta.title.as_deref(), Some("Eye L"));
    assert_eq!(meta.comment.as_deref(), Some("follow-up"));
    assert_eq!(meta.x_center, Some(-0.5));
    assert_eq!(meta.y_center, Some(0.4));
    assert_eq!(meta.overlay_scale_factor, Some(1.2));
    assert!(meta.subject.is_none() && meta.person.is_none());
}

#[test]
fn rmdir_async_and_probe_tree_flags() {
    let args = Args::try_parse_from(["eyepair", "rmdir", "--async", "/mnt/card/old"]).unwrap();
    assert!(matches!(
        args.command,
        Some(Command::Rmdir {
            background: true,
            ..
        })
    ));
    let args = Args::try_parse_from(["eyepair", "probe", "--tree", "/mnt/card"]).unwrap();
    assert!(matches!(args.command, Some(Command::Probe { tree: true, .. })));
    let args =
        Args::try_parse_from(["eyepair", "rename-folder", "/mnt/a", "/mnt/b"]).unwrap();
    assert!(matches!(args.command, Some(Command::RenameFolder { .. })));
}

#[test]
fn show_paths_are_optional() {
    let args = Args::try_parse_from(["eyepair", "show"]).unwrap();
    assert!(matches!(args.command, Some(Command::Show { ref paths, .. }) if paths.is_empty()));
    let args = Args::try_parse_from(["eyepair", "show", "--json", "--raw", "a.jpg", "b"]).unwrap();
    let Some(Command::Show {
        paths,
        as_json,
        raw,
    }) = args.command
    else {
        panic!("expected show");
    };
    assert_eq!(paths.len(), 2);
    assert!(as_json && raw);
}

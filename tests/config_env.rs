use serial_test::serial;
use std::fs;
use tempfile::tempdir;

use eyepair::config::CONFIG_ENV_VAR;
use eyepair::{LogLevel, StoreOption, default_config_path, load_config};

fn set_env(value: &std::path::Path) {
    unsafe {
        std::env::set_var(CONFIG_ENV_VAR, value);
    }
}

fn clear_env() {
    unsafe {
        std::env::remove_var(CONFIG_ENV_VAR);
    }
}

#[test]
#[serial]
fn explicit_config_file_is_loaded() {
    let td = tempdir().unwrap();
    let root = td.path().join("card");
    fs::create_dir(&root).unwrap();
    let cfg_path = td.path().join("eyepair.xml");
    fs::write(
        &cfg_path,
        format!(
            r#"<config>
  <store_option>1</store_option>
  <storage_roots><root>{}</root></storage_roots>
  <log_level>quiet</log_level>
</config>"#,
            root.display()
        ),
    )
    .unwrap();

    set_env(&cfg_path);
    let loaded = load_config();
    clear_env();

    let loaded = loaded.unwrap();
    assert_eq!(loaded.path, cfg_path);
    assert!(!loaded.created_template);
    assert_eq!(loaded.config.store_option, StoreOption::XmpOnly);
    assert_eq!(loaded.config.storage_roots, vec![root]);
    assert_eq!(loaded.config.log_level, LogLevel::Quiet);
    assert!(loaded.config.validate().is_ok());
}

#[test]
#[serial]
fn env_directory_means_config_xml_inside() {
    let td = tempdir().unwrap();
    set_env(td.path());
    let resolved = default_config_path();
    clear_env();
    assert_eq!(resolved.unwrap(), td.path().join("config.xml"));
}

#[test]
#[serial]
fn missing_explicit_config_is_an_error() {
    let td = tempdir().unwrap();
    let missing = td.path().join("nope.xml");
    set_env(&missing);
    let res = load_config();
    clear_env();
    assert!(res.is_err());
    assert!(!missing.exists(), "no template for an explicit path");
}

#[test]
#[serial]
fn invalid_store_option_is_reported() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><store_option>9</store_option></config>").unwrap();
    set_env(&cfg_path);
    let res = load_config();
    clear_env();
    assert!(res.is_err());
}

//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Writes a commented template (0600) when the default file is missing.
//!
//! Notes:
//! - Unknown elements are rejected so typos surface instead of being ignored.
//! - Empty elements read as unset.

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::paths::{CONFIG_ENV_VAR, default_config_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel};
use crate::metadata::StoreOption;
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};
use crate::utils::storage_root_from_app_dir;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlRoots {
    #[serde(rename = "root", default)]
    root: Vec<String>,
}

/// Mirror of config.xml for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    store_option: Option<String>,
    tree_uri: Option<String>,
    #[serde(default)]
    storage_roots: Option<XmlRoots>,
    #[serde(default)]
    direct_readonly_roots: Option<XmlRoots>,
    legacy_media_index: Option<String>,
    seed_dir: Option<String>,
    preserve_times: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn roots(r: Option<XmlRoots>) -> Vec<PathBuf> {
    r.map(|r| r.root)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| non_empty(Some(s.as_str())))
        .map(PathBuf::from)
        .collect()
}

fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(s) = non_empty(parsed.store_option.as_deref()) {
        cfg.store_option = s
            .parse::<StoreOption>()
            .map_err(anyhow::Error::msg)
            .context("store_option")?;
    }
    cfg.tree_uri = non_empty(parsed.tree_uri.as_deref()).map(str::to_string);
    cfg.storage_roots = roots(parsed.storage_roots)
        .into_iter()
        .map(|root| match storage_root_from_app_dir(&root) {
            Some(card) => {
                debug!(app_dir = %root.display(), root = %card.display(), "Storage root derived from app directory");
                card
            }
            None => root,
        })
        .collect();
    cfg.direct_readonly_roots = roots(parsed.direct_readonly_roots);
    cfg.legacy_media_index = non_empty(parsed.legacy_media_index.as_deref()).map(PathBuf::from);
    cfg.seed_dir = non_empty(parsed.seed_dir.as_deref()).map(PathBuf::from);
    cfg.preserve_times = parsed.preserve_times.unwrap_or(false);
    cfg.log_file = non_empty(parsed.log_file.as_deref()).map(PathBuf::from);

    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        match s.parse::<LogLevel>() {
            Ok(level) => cfg.log_level = level,
            Err(e) => warn!("{e}; keeping '{}'", cfg.log_level),
        }
    }
    Ok(cfg)
}

/// Load a Config from a specific XML file.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    xml_to_config(parsed).with_context(|| format!("invalid value in '{}'", path.display()))
}

/// Outcome of [`load_config`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// File consulted (whether or not it existed).
    pub path: PathBuf,
    /// A template was written because the default file was missing.
    pub created_template: bool,
}

/// Resolve and load the config file.
///
/// An explicit `$EYEPAIR_CONFIG` must exist. The default location is optional: when
/// missing a template is written there (best-effort) and defaults are used.
pub fn load_config() -> Result<LoadedConfig> {
    let explicit = env::var_os(CONFIG_ENV_VAR).is_some_and(|v| !v.is_empty());
    let path = default_config_path().context("resolve config path")?;

    if path.exists() {
        let config = load_config_from_xml_path(&path)?;
        debug!(path = %path.display(), "Config loaded");
        return Ok(LoadedConfig {
            config,
            path,
            created_template: false,
        });
    }
    if explicit {
        bail!(
            "{CONFIG_ENV_VAR} points at '{}', which does not exist",
            path.display()
        );
    }

    let created_template = match create_template_config(&path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not write template config");
            false
        }
    };
    Ok(LoadedConfig {
        config: Config::default(),
        path,
        created_template,
    })
}

const TEMPLATE: &str = r#"<!--
  eyepair configuration (XML)

    store_option           -> 0 = never modify images, 1 = XMP only, 2 = XMP + EXIF
    tree_uri               -> document tree granted for removable storage (file:// maps to a host dir)
    storage_roots/root     -> mount points the tree URI covers (repeat <root>); an app
                              directory below Android/data is cut back to its card root
    direct_readonly_roots  -> roots where direct writes are refused (repeat <root>)
    legacy_media_index     -> registry file of the media index; enables the legacy tier
    seed_dir               -> where legacy mkdir keeps its seed files
    preserve_times         -> keep modification times on streamed copies (true/false)
    log_level              -> quiet | normal | info | debug
    log_file               -> path to log file (optional)

  CLI flags override these values.
-->
<config>
  <store_option>2</store_option>
  <tree_uri></tree_uri>
  <storage_roots></storage_roots>
  <direct_readonly_roots></direct_readonly_roots>
  <preserve_times>false</preserve_times>
  <log_level>normal</log_level>
</config>
"#;

/// Write the commented template config, refusing when an ancestor is a symlink.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }
    write_config_secure_new_0600(path, TEMPLATE.as_bytes())?;
    let _ = set_file_mode_0600(path);
    info!("Created template config at {}", path.display());
    Ok(())
}

//! Application orchestrator.
//! Loads config and applies CLI overrides, initializes logging, installs the interrupt
//! handler, builds the storage executor and runs the requested command.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;

use eyepair::cli::{Args, Command};
use eyepair::config::{CONFIG_ENV_VAR, Config, default_config_path, load_config};
use eyepair::output as out;
use eyepair::storage::{CompletionQueue, ReclaimState, RetryPolicy, rmdir_async};
use eyepair::utils::{camera_folders, find_jpegs};
use eyepair::{EyepairError, Metadata, MetadataCodec, StorageContext, StorageExecutor, StoreOption};

use crate::logging::init_tracing;

/// How long the primary thread waits for a background folder removal to report back.
const RECLAIM_WAIT: Duration = Duration::from_secs(5);

pub fn run(args: Args) -> Result<()> {
    if args.print_config {
        print_config_location();
        return Ok(());
    }

    let loaded = load_config()?;
    if loaded.created_template {
        out::print_success(&format!(
            "A template eyepair config was written to: {}",
            loaded.path.display()
        ));
    }
    let mut cfg = loaded.config;
    args.apply_overrides(&mut cfg);

    let Some(command) = args.command.clone() else {
        out::print_info(&format!("Using config: {}", loaded.path.display()));
        out::print_info("Nothing to do. Run `eyepair --help` for the available commands.");
        return Ok(());
    };

    let guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).inspect_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
    })?;

    // Dropping the guard flushes the file writer; do it on Ctrl-C too.
    let guard_slot: Arc<Mutex<Option<WorkerGuard>>> = Arc::new(Mutex::new(guard));
    {
        let guard_slot = Arc::clone(&guard_slot);
        if let Err(e) = ctrlc::set_handler(move || {
            out::print_warn("Interrupted; flushing logs and exiting.");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
            std::process::exit(130);
        }) {
            out::print_warn(&format!("Could not install interrupt handler: {e}"));
        }
    }

    debug!(?args, "Starting eyepair");
    let result = execute(&cfg, command);

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config_location() {
    if let Ok(p) = std::env::var(CONFIG_ENV_VAR) {
        out::print_info(&format!("Using {CONFIG_ENV_VAR} (explicit):\n  {p}"));
        out::print_info(&format!("To change it, unset {CONFIG_ENV_VAR} or point it at another file."));
        return;
    }
    match default_config_path() {
        Ok(p) => {
            out::print_info(&format!("Default eyepair config path:\n  {}", p.display()));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet; any command creates a template.");
            }
        }
        Err(e) => out::print_error(&format!("Could not determine a default config path: {e}")),
    }
}

fn execute(cfg: &Config, command: Command) -> Result<()> {
    cfg.validate()?;
    let ctx = StorageContext::from_config(cfg).context("build storage context")?;
    let storage = Arc::new(StorageExecutor::new(ctx));
    debug!(tiers = ?storage.tiers(), "Storage backends ready");
    let codec = MetadataCodec::new(Arc::clone(&storage), cfg.store_option);

    match command {
        Command::Show {
            paths,
            as_json,
            raw,
        } => {
            let paths = if paths.is_empty() {
                let found = camera_folders(&cfg.storage_roots);
                if found.is_empty() {
                    bail!("No paths given and no DCIM camera folder below the storage roots");
                }
                info!(folders = ?found, "Showing default camera folders");
                found
            } else {
                paths
            };
            show(&codec, &paths, as_json, raw)
        }
        Command::Annotate { path, fields } => annotate(&codec, &path, &fields.to_metadata()),
        Command::Cp { src, dst } => outcome(storage.copy(&src, &dst), "copy", &src, Some(&dst)),
        Command::Mv { src, dst } => {
            outcome(storage.move_file(&src, &dst), "move", &src, Some(&dst))
        }
        Command::Rm { path } => outcome(storage.delete(&path), "delete", &path, None),
        Command::Mkdir { path } => outcome(storage.mkdir(&path), "create", &path, None),
        Command::Rmdir { path, background } => {
            if background {
                reclaim(storage, path)
            } else {
                outcome(storage.rmdir(&path), "remove", &path, None)
            }
        }
        Command::RenameFolder { src, dst } => outcome(
            storage.rename_folder(&src, &dst),
            "rename",
            &src,
            Some(&dst),
        ),
        Command::Probe { path, tree } => {
            let writable = if tree {
                storage.is_writable_via_tree_backend(&path)
            } else {
                storage.is_writable(&path)
            };
            out::print_user(&format!(
                "{}: {}",
                path.display(),
                if writable { "writable" } else { "not writable" }
            ));
            if !writable {
                bail!("{} is not writable", path.display());
            }
            Ok(())
        }
    }
}

/// Storage operations report a bare bool; turn `false` into a non-zero exit.
fn outcome(ok: bool, verb: &str, path: &Path, dst: Option<&Path>) -> Result<()> {
    let target = match dst {
        Some(d) => format!("'{}' -> '{}'", path.display(), d.display()),
        None => format!("'{}'", path.display()),
    };
    if ok {
        out::print_success(&format!("{verb} {target}"));
        Ok(())
    } else {
        error!(op = verb, path = %path.display(), "Storage operation failed");
        bail!("Could not {verb} {target}")
    }
}

fn log_codec_error(e: &EyepairError, path: &Path) {
    error!(
        code = e.code(),
        kind = e.kind_label(),
        path = %path.display(),
        "{e}"
    );
}

#[derive(Serialize)]
struct ShowEntry<'a> {
    path: &'a Path,
    #[serde(flatten)]
    metadata: Metadata,
}

fn show(codec: &MetadataCodec, inputs: &[PathBuf], as_json: bool, raw: bool) -> Result<()> {
    let files: Vec<PathBuf> = inputs.iter().flat_map(|p| find_jpegs(p)).collect();
    if files.is_empty() {
        bail!("No JPEG files found");
    }

    let mut read = Vec::with_capacity(files.len());
    let mut failed = 0usize;
    for path in &files {
        match codec.read(path) {
            Ok(meta) => read.push((path, meta)),
            Err(e) => {
                log_codec_error(&e, path);
                out::print_error(&format!("{}: {e}", path.display()));
                failed += 1;
            }
        }
    }

    if as_json {
        let entries: Vec<ShowEntry<'_>> = read
            .into_iter()
            .map(|(path, metadata)| ShowEntry { path, metadata })
            .collect();
        out::print_json(&entries).context("serialize metadata")?;
    } else {
        for (path, meta) in &read {
            out::print_user(&format!("== {}", path.display()));
            out::print_user(&meta.to_string());
            if raw {
                print_raw(codec, path)?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} files could not be read", files.len());
    }
    Ok(())
}

fn print_raw(codec: &MetadataCodec, path: &Path) -> Result<()> {
    let exif = codec
        .dump_exif(path)
        .with_context(|| format!("dump EXIF of {}", path.display()))?;
    if exif.is_empty() {
        out::print_user("-- no EXIF");
    } else {
        out::print_user("-- EXIF");
        for line in exif {
            out::print_user(&line);
        }
    }
    match codec
        .dump_xmp(path)
        .with_context(|| format!("dump XMP of {}", path.display()))?
    {
        Some(packet) => {
            out::print_user("-- XMP");
            out::print_user(&packet);
        }
        None => out::print_user("-- no XMP"),
    }
    Ok(())
}

fn annotate(codec: &MetadataCodec, path: &Path, meta: &Metadata) -> Result<()> {
    if *meta == Metadata::default() {
        out::print_warn("No fields given; nothing to store.");
        return Ok(());
    }
    if codec.store_option() == StoreOption::Disabled {
        out::print_info("Store option 0: images are never modified.");
        return Ok(());
    }
    codec.write(path, meta).map_err(|e| {
        log_codec_error(&e, path);
        anyhow::Error::new(e).context(format!("annotate {}", path.display()))
    })?;
    info!(path = %path.display(), store_option = %codec.store_option(), "Annotations stored");
    out::print_success(&format!("annotated '{}'", path.display()));
    Ok(())
}

fn reclaim(storage: Arc<StorageExecutor>, folder: PathBuf) -> Result<()> {
    let queue = CompletionQueue::new();
    let done_path = folder.clone();
    let handle = rmdir_async(
        storage,
        folder.clone(),
        &queue,
        RetryPolicy::default(),
        move || out::print_success(&format!("removed '{}'", done_path.display())),
        |p: &Path| out::print_error(&format!("gave up removing '{}'", p.display())),
    )
    .context("start background removal")?;

    if !queue.run_next(RECLAIM_WAIT) {
        out::print_info(&format!(
            "Still removing '{}' ({:?}); waiting for the worker",
            folder.display(),
            handle.state()
        ));
    }
    match handle.join() {
        ReclaimState::Done => Ok(()),
        state => bail!("Could not remove '{}' ({state:?})", folder.display()),
    }
}

//! Watch command - rebuild on entry changes

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use prestatic_core::{Config, config::ScopeKind};
use prestatic_generator::Builder;
use tokio::sync::mpsc;

use super::{load_config, print_build_stats};

/// Debounce interval for file changes.
const DEBOUNCE_MS: u64 = 200;

/// Run the watch command.
///
/// Builds once, then rebuilds incrementally whenever a file under a collection
/// or singleton directory, or the configuration file, changes. Runs until
/// interrupted.
pub async fn run(config_path: &Path, root: &Path) -> Result<()> {
    tracing::info!(?config_path, ?root, "Starting watch mode");

    let config = load_config(config_path)?;

    tracing::info!("Running initial build...");
    let mut builder = Builder::new(config, root);
    let stats = builder.build().wrap_err("Build failed")?;
    print_build_stats(&stats);

    let output_dir = builder.output_dir().to_path_buf();

    let (tx, mut rx) = mpsc::channel::<()>(16);
    // Events carry absolute paths.
    let ignored = output_dir
        .canonicalize()
        .unwrap_or_else(|_| output_dir.clone());
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_))
                        | EventKind::Create(_)
                        | EventKind::Remove(_)
                ) && event.paths.iter().any(|p| !p.starts_with(&ignored));

                if relevant {
                    let _ = tx.blocking_send(());
                }
            }
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    for dir in watch_dirs(builder.config(), root) {
        if dir.exists() {
            watcher
                .watch(&dir, RecursiveMode::Recursive)
                .wrap_err_with(|| format!("Failed to watch {}", dir.display()))?;
            tracing::debug!(dir = %dir.display(), "Watching directory");
        } else {
            tracing::warn!(dir = %dir.display(), "Directory does not exist, not watching");
        }
    }
    watcher
        .watch(config_path, RecursiveMode::NonRecursive)
        .wrap_err("Failed to watch configuration file")?;

    println!();
    println!("  Watching for changes");
    println!("  Press Ctrl+C to stop");
    println!();

    loop {
        tokio::select! {
            received = rx.recv() => {
                if received.is_none() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        // Let a burst of events settle, then rebuild once.
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
        while rx.try_recv().is_ok() {}

        println!();
        println!("  Change detected, rebuilding...");

        match load_config(config_path) {
            Ok(config) => {
                builder = Builder::new(config, root).with_output_dir(&output_dir);
            }
            Err(e) => {
                tracing::error!("Reloading configuration failed: {e:#}");
                eprintln!("  ✗ Configuration invalid, keeping previous one: {e:#}");
            }
        }

        match builder.build() {
            Ok(stats) => {
                println!(
                    "  ✓ Rebuilt {} of {} entries in {}ms",
                    stats.total_compiled(),
                    stats.total_entries(),
                    stats.duration_ms
                );
            }
            Err(e) => {
                tracing::error!("Rebuild failed: {e}");
                eprintln!("  ✗ Rebuild failed: {e}");
            }
        }
    }

    tracing::info!("Watch mode stopped");
    Ok(())
}

/// Directories whose contents feed the build.
///
/// A collection is watched at its base path. A singleton path names the entry
/// itself, so its parent is watched.
fn watch_dirs(config: &Config, root: &Path) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();
    for (kind, _, scope) in config.scopes() {
        let base = root.join(scope.base_path());
        let dir = match kind {
            ScopeKind::Collection => base,
            ScopeKind::Singleton => base
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
        };
        dirs.insert(dir);
    }
    dirs
}

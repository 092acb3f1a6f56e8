//! Filesystem watching.
//!
//! Events funnel into the symbol index's debounced pending set; the loop
//! drains due batches and propagates them through the dependency graph and
//! trigram postings. Deletions fall out naturally: a pending path whose file
//! vanished is dropped from every index.

use anyhow::Result;
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::config::BAKED_IGNORES;
use crate::indexer::Engine;

/// Poll interval for the drain loop; well under the debounce window.
const TICK: Duration = Duration::from_millis(200);

/// Watch the engine's root until the shutdown channel fires.
pub fn watch(engine: &Engine, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
    let root = engine.root().to_path_buf();
    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        if tx.send(res).is_err() {
            eprintln!("watcher channel closed");
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("Watching {} for changes", root.display());

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("Received shutdown signal");
            break;
        }

        match rx.recv_timeout(TICK) {
            Ok(Ok(event)) => handle_event(engine, &root, event),
            Ok(Err(err)) => warn!("watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        match engine.drain_pending(false) {
            Ok(flushed) if !flushed.is_empty() => {
                debug!("reindexed batch of {}", flushed.len());
            }
            Ok(_) => {}
            Err(err) => warn!("failed to drain pending batch: {err:#}"),
        }
    }

    // Final drain so nothing buffered is lost on shutdown.
    engine.drain_pending(true)?;
    Ok(())
}

fn handle_event(engine: &Engine, root: &Path, event: Event) {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    if !relevant {
        debug!("ignoring event {:?}", event.kind);
        return;
    }
    for path in event.paths {
        let Some(path) = normalize_event_path(root, path) else {
            continue;
        };
        if is_ignored(root, &path) {
            continue;
        }
        engine.symbols.mark_file_modified(&path);
    }
}

fn normalize_event_path(root: &Path, path: PathBuf) -> Option<PathBuf> {
    let abs = if path.is_absolute() {
        path
    } else {
        root.join(path)
    };
    // Events outside the root (symlinked targets) are not ours.
    if abs.starts_with(root) {
        Some(abs)
    } else {
        None
    }
}

fn is_ignored(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return true;
    };
    rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| BAKED_IGNORES.contains(&name))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_engine_owned_paths() {
        let root = Path::new("/repo");
        assert!(is_ignored(root, Path::new("/repo/.mcp/index.db")));
        assert!(is_ignored(root, Path::new("/repo/node_modules/x/y.js")));
        assert!(!is_ignored(root, Path::new("/repo/src/a.ts")));
    }

    #[test]
    fn event_paths_outside_root_are_dropped() {
        let root = Path::new("/repo");
        assert_eq!(
            normalize_event_path(root, PathBuf::from("/elsewhere/a.ts")),
            None
        );
        assert_eq!(
            normalize_event_path(root, PathBuf::from("src/a.ts")),
            Some(PathBuf::from("/repo/src/a.ts"))
        );
    }
}

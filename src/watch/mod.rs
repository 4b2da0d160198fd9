//! File watcher
//!
//! Watches source roots with notify and feeds raw change events into the
//! engine. The watcher starts immediately so events arriving while the
//! caller finishes startup are buffered, not lost.
//!
//! ```text
//! notify → filter (temp files, metadata-only, ignores) → HmrEngine
//! ```
//!
//! Timing is the engine's job: every surviving event goes straight to
//! `handle_update`, and the engine's coalescing window absorbs bursts.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RemoveKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::engine::HmrEngine;
use crate::utils::{is_temp_file, normalize_path};

/// What a filtered notify event means for the module graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeAction {
    /// Content changed or file created: route into the coalescing window.
    Update,
    /// File permanently deleted: drop the node, then let classification
    /// of the now-unknown id escalate to a full reload.
    Remove,
}

/// Bridges notify events into the engine.
pub struct FileWatcher {
    /// Sync channel fed by notify's callback (notify is not async).
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Must be kept alive for the watch to stay active.
    watcher: RecommendedWatcher,
    engine: HmrEngine,
    /// Path substrings excluded from watching (from config).
    ignore: Vec<String>,
}

impl FileWatcher {
    /// Start watching `roots` recursively. Events buffer from this point.
    pub fn new(
        roots: &[PathBuf],
        ignore: Vec<String>,
        engine: HmrEngine,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for root in roots {
            if root.exists() {
                watcher.watch(root, RecursiveMode::Recursive)?;
            } else {
                crate::log!("watch"; "skipping missing root: {}", root.display());
            }
        }

        Ok(Self {
            notify_rx,
            watcher,
            engine,
            ignore,
        })
    }

    /// Run the watch loop until the engine closes or the watcher dies.
    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let _watcher = self.watcher;
        let engine = self.engine;
        let ignore = self.ignore;

        let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);

        // Poll the sync notify channel on a thread, forward into tokio
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        while let Some(event) = async_rx.recv().await {
            if engine.is_closed() {
                break;
            }
            dispatch_event(&engine, &event, &ignore);
        }
    }
}

/// Route one notify event into the engine, dropping noise.
fn dispatch_event(engine: &HmrEngine, event: &notify::Event, ignore: &[String]) {
    let Some(action) = classify_event(&event.kind) else {
        return;
    };

    for path in &event.paths {
        if !is_relevant(path, ignore) {
            continue;
        }

        match action {
            ChangeAction::Update => {
                crate::debug!("watch"; "changed: {}", path.display());
                // Completion is the flush finishing; nothing to do with it here
                drop(tokio::spawn(engine.handle_update(path)));
            }
            ChangeAction::Remove => {
                let normalized = normalize_path(path);
                let id = engine.with_graph(|graph| graph.id_for_path(&normalized).cloned());
                let Some(id) = id else {
                    continue;
                };
                crate::log!("watch"; "removed: {}", path.display());
                engine.unregister(&id);
                drop(tokio::spawn(engine.handle_update_id(id)));
            }
        }
    }
}

/// Map an event kind to an action, or `None` for noise.
fn classify_event(kind: &EventKind) -> Option<ChangeAction> {
    match kind {
        EventKind::Create(_) => Some(ChangeAction::Update),
        // Metadata-only changes (chmod, mtime touch) carry no new content
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeAction::Update),
        EventKind::Remove(RemoveKind::File | RemoveKind::Any | RemoveKind::Other) => {
            Some(ChangeAction::Remove)
        }
        // Directory removal surfaces as per-file removals on all platforms
        // we target, the directory event itself has no module behind it
        EventKind::Remove(RemoveKind::Folder) => None,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Editor droppings and configured ignores never reach the engine.
fn is_relevant(path: &Path, ignore: &[String]) -> bool {
    if is_temp_file(path) {
        return false;
    }
    let text = path.to_string_lossy();
    !ignore.iter().any(|pattern| text.contains(pattern.as_str()))
}

// =============================================================================
// Tests
// =============================================================================

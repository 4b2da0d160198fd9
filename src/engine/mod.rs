//! HMR Engine
//!
//! The façade other subsystems use: receives change events from the file
//! watcher, drives coalescing and classification, snapshots fast-refresh
//! state for affected modules, and hands the outcome to the broadcaster.
//!
//! One engine value is explicitly constructed and passed by handle to all
//! callers; there is no process-global instance. All graph, classifier,
//! coalescer, and refresh-store operations are serialized behind a single
//! mutex; the BFS walk and edge bookkeeping are not safe under concurrent
//! modification. Broadcast fan-out happens outside that lock.

pub mod coalesce;
pub mod scheduler;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::graph::classify::BoundarySet;
use crate::graph::{
    Accept, Classification, GraphError, ModuleGraph, ModuleId, ModuleKind, classify, order_boundary,
};
use crate::refresh::{InstanceId, RefreshStore, Signal, SignalKey, StateSnapshot};
use crate::reload::broadcast::{Broadcaster, Connection, ConnectionId};
use crate::reload::message::{UpdateEntry, UpdateMessage};
use crate::utils::normalize_path;
use coalesce::Coalescer;
use scheduler::{Scheduler, TokioScheduler};

// =============================================================================
// Configuration
// =============================================================================

/// Engine behavior knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Coalescing window: raw change events arriving within this delay of
    /// each other are merged into one classification pass.
    pub debounce: Duration,
    /// Surface classification failures to clients as `error` messages.
    /// When unset, failures are logged and swallowed.
    pub reload_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            reload_on_error: false,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Cheaply clonable handle to the hot-update engine.
#[derive(Clone)]
pub struct HmrEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<EngineState>,
    broadcaster: Broadcaster,
}

struct EngineState {
    graph: ModuleGraph,
    refresh: RefreshStore,
    coalescer: Coalescer,
    closed: bool,
    /// Flush counter stamped onto nodes as `last_invalidated`.
    tick: u64,
}

impl HmrEngine {
    /// Create an engine using tokio timers for the coalescing window.
    /// Must be called within a tokio runtime.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_scheduler(config, Arc::new(TokioScheduler::current()))
    }

    /// Create an engine with an explicit scheduler (deterministic tests).
    pub fn with_scheduler(config: EngineConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                scheduler,
                state: Mutex::new(EngineState {
                    graph: ModuleGraph::new(),
                    refresh: RefreshStore::new(),
                    coalescer: Coalescer::new(),
                    closed: false,
                    tick: 0,
                }),
                broadcaster: Broadcaster::new(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Graph surface (called by the transform layer)
    // -------------------------------------------------------------------------

    /// Insert or update a module and rewire its import edges.
    ///
    /// The path is normalized before it becomes a graph key, so a module
    /// registered with a relative path still matches the absolute paths
    /// the watcher reports.
    pub fn register_module(
        &self,
        id: ModuleId,
        path: impl Into<std::path::PathBuf>,
        kind: ModuleKind,
        dependency_ids: impl IntoIterator<Item = ModuleId>,
    ) {
        let path = normalize_path(&path.into());
        let mut state = self.inner.state.lock();
        state.graph.register_module(id, path, kind, dependency_ids);
    }

    /// Record a module's hot-update acceptance declaration.
    pub fn accept_hmr(&self, id: ModuleId, accept: Accept) {
        self.inner.state.lock().graph.accept_hmr(id, accept);
    }

    /// Remove a module permanently deleted from the source tree.
    pub fn unregister(&self, id: &ModuleId) {
        self.inner.state.lock().graph.unregister(id);
    }

    /// Read access to the graph for diagnostics and tests.
    pub fn with_graph<R>(&self, f: impl FnOnce(&ModuleGraph) -> R) -> R {
        f(&self.inner.state.lock().graph)
    }

    // -------------------------------------------------------------------------
    // Change intake (called by the file watcher)
    // -------------------------------------------------------------------------

    /// Route a raw file change into the coalescing window.
    ///
    /// The returned future resolves once the resulting message (if any)
    /// has been handed to the broadcaster. It is a completion signal, not
    /// a guarantee of client-side application. No-op after `close()`.
    pub fn handle_update(&self, path: &Path) -> impl Future<Output = ()> + Send + use<> {
        let normalized = normalize_path(path);
        let id = {
            let state = self.inner.state.lock();
            state
                .graph
                .id_for_path(&normalized)
                .cloned()
                .unwrap_or_else(|| ModuleId::from_path(&normalized))
        };
        self.handle_update_id(id)
    }

    /// Like [`HmrEngine::handle_update`], for callers that already resolved
    /// the module id.
    pub fn handle_update_id(&self, id: ModuleId) -> impl Future<Output = ()> + Send + use<> {
        let rx = {
            let mut state = self.inner.state.lock();

            if state.closed {
                let (tx, rx) = tokio::sync::oneshot::channel();
                let _ = tx.send(());
                rx
            } else {
                let needs_schedule = state.coalescer.enqueue(id);
                let rx = state.coalescer.add_waiter();

                if needs_schedule {
                    let inner = Arc::clone(&self.inner);
                    let handle = self.inner.scheduler.schedule(
                        self.inner.config.debounce,
                        Box::new(move || EngineInner::flush(&inner)),
                    );
                    state.coalescer.mark_scheduled(handle);
                }
                rx
            }
        };

        async move {
            let _ = rx.await;
        }
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Register a live client connection; it is immediately greeted with a
    /// `connected` message.
    pub fn add_connection(&self, mut conn: Box<dyn Connection>) {
        if self.inner.state.lock().closed {
            conn.close();
            return;
        }
        self.inner.broadcaster.add(conn);
    }

    pub fn remove_connection(&self, id: ConnectionId) -> bool {
        self.inner.broadcaster.remove(id)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.broadcaster.connection_count()
    }

    /// Broadcast a `custom` message to all open connections, independent
    /// of file changes. Completion means handed to the transport.
    pub fn send_custom(&self, event: impl Into<String>, data: Value) {
        if self.inner.state.lock().closed {
            return;
        }
        self.inner
            .broadcaster
            .broadcast(&UpdateMessage::custom(event, data));
    }

    /// Release all connections and cancel any pending coalescing window.
    ///
    /// Subsequent `handle_update` calls are no-ops; the pending set is
    /// cleared, never resurrected by a restart.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.coalescer.cancel()
        };

        self.inner.broadcaster.close_all();
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    // -------------------------------------------------------------------------
    // Fast-refresh surface (called by the UI runtime)
    // -------------------------------------------------------------------------

    /// Associate an instance's signal with a stable identity.
    pub fn register_signal(
        &self,
        instance: InstanceId,
        module_path: &str,
        signal_id: &str,
        signal: Signal,
    ) -> SignalKey {
        self.inner
            .state
            .lock()
            .refresh
            .register(instance, module_path, signal_id, signal)
    }

    pub fn preserve_state(&self, instance: InstanceId) -> Option<StateSnapshot> {
        self.inner.state.lock().refresh.preserve_state(instance)
    }

    pub fn restore_state(&self, instance: InstanceId, snapshot: StateSnapshot) {
        self.inner.state.lock().refresh.restore_state(instance, snapshot);
    }

    /// Take the snapshot captured for an instance during the last flush.
    pub fn take_pending_snapshot(&self, instance: InstanceId) -> Option<StateSnapshot> {
        self.inner.state.lock().refresh.take_pending(instance)
    }

    /// Record a module swap and its new exports token.
    pub fn refresh_module(&self, module_path: &str, new_exports: Value) {
        self.inner.state.lock().refresh.refresh(module_path, new_exports);
    }

    /// Latest exports recorded for a swapped module.
    pub fn latest_exports(&self, module_path: &str) -> Option<Value> {
        self.inner
            .state
            .lock()
            .refresh
            .latest_exports(module_path)
            .cloned()
    }

    pub fn unregister_signal(&self, instance: InstanceId, module_path: &str, signal_id: &str) {
        self.inner
            .state
            .lock()
            .refresh
            .unregister_signal(instance, module_path, signal_id);
    }

    pub fn remove_instance(&self, instance: InstanceId) {
        self.inner.state.lock().refresh.remove_instance(instance);
    }
}

impl EngineInner {
    /// Drain the coalescing window, classify, broadcast, resolve waiters.
    ///
    /// The state lock is held through take + classify and released before
    /// the broadcast, so a `handle_update` triggered from a connection's
    /// send lands in a freshly scheduled window, never inside this flush.
    fn flush(inner: &Arc<EngineInner>) {
        let (message, waiters) = {
            let mut state = inner.state.lock();
            let (batch, waiters) = state.coalescer.take_batch();

            if batch.is_empty() || state.closed {
                (None, waiters)
            } else {
                state.tick += 1;
                let message = match Self::classify_batch(&mut state, &batch) {
                    Ok(message) => message,
                    Err(e) => {
                        crate::logger::status_error("classification failed", &e.to_string());
                        if inner.config.reload_on_error {
                            Some(UpdateMessage::error(e.to_string()))
                        } else {
                            None
                        }
                    }
                };
                (message, waiters)
            }
        };

        if let Some(message) = &message {
            inner.broadcaster.broadcast(message);
            match message {
                UpdateMessage::Update { updates } => {
                    crate::logger::status_success(&format!(
                        "hot update: {} module{}",
                        updates.len(),
                        if updates.len() == 1 { "" } else { "s" }
                    ));
                }
                UpdateMessage::FullReload => crate::logger::status_success("full reload"),
                _ => {}
            }
        }

        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Classify every pending id and merge the outcome into one message.
    ///
    /// Any full reload collapses the whole batch; there is no point
    /// sending partial updates alongside a page reload.
    fn classify_batch(
        state: &mut EngineState,
        batch: &rustc_hash::FxHashSet<ModuleId>,
    ) -> Result<Option<UpdateMessage>, GraphError> {
        let tick = state.tick;
        let mut merged = BoundarySet::default();

        for changed in batch {
            match classify(&state.graph, changed)? {
                Classification::FullReload => {
                    crate::debug!("hmr"; "{} forces full reload", changed);
                    return Ok(Some(UpdateMessage::FullReload));
                }
                Classification::SelfUpdate(id) => {
                    merged.modules.insert(id);
                }
                Classification::Boundary(set) => merged.merge(set),
            }
        }

        if merged.modules.is_empty() {
            return Ok(None);
        }

        for id in merged.modules.iter().chain(merged.interior.iter()) {
            state.graph.touch(id, tick);
        }

        let ordered = order_boundary(&state.graph, &merged.modules, &merged.interior);
        let timestamp = now_ms();

        let mut updates = Vec::with_capacity(ordered.len());
        for id in ordered {
            let Some(node) = state.graph.get(&id) else {
                continue;
            };
            let path = node.path.to_string_lossy().into_owned();
            let kind = node.kind;

            // Snapshot live instances before the client tears the module down
            let captured = state.refresh.preserve_module(&path);
            if captured > 0 {
                crate::debug!("refresh"; "snapshotted {} instance(s) of {}", captured, path);
            }

            updates.push(UpdateEntry {
                path,
                module_kind: kind,
                timestamp,
            });
        }

        crate::debug!("hmr"; "update: {} boundary module(s)", updates.len());
        Ok(Some(UpdateMessage::update(updates)))
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// Tests
// =============================================================================

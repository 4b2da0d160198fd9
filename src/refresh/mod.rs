//! Fast-Refresh State Store
//!
//! Lets a component module be replaced in place without losing its live
//! reactive state: signal values are snapshotted against stable identities
//! immediately before a module is torn down, and written back into the
//! newly constructed instance afterwards.
//!
//! Identities are scoped to `(instance, module_path, signal_id)`; an
//! identity is assigned once at first registration and survives swaps as
//! long as the surrounding component instance does. Restoration is always
//! instance-for-instance: two instances of the same component type never
//! share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

// =============================================================================
// Identities and signal handles
// =============================================================================

/// Opaque identity of a running component instance, minted by the UI
/// runtime when the instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable key for one piece of reactive state, independent of the
/// component instance's memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey(u64);

/// A live reactive value cell, shared with the UI runtime.
#[derive(Debug, Clone, Default)]
pub struct Signal(Arc<Mutex<Value>>);

impl Signal {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Value {
        self.0.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }
}

/// Plain value map captured from an instance's signals.
///
/// Captured immediately before a swap, discarded immediately after
/// restoration; never retained across unrelated updates.
#[derive(Debug, Default)]
pub struct StateSnapshot {
    values: FxHashMap<SignalKey, Value>,
}

impl StateSnapshot {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: SignalKey) -> Option<&Value> {
        self.values.get(&key)
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
struct InstanceSignals {
    /// (module_path, signal_id) → slot; the identity key outlives the
    /// signal handle, which is rebound on every re-registration.
    slots: FxHashMap<(String, String), SignalSlot>,
}

#[derive(Debug)]
struct SignalSlot {
    key: SignalKey,
    signal: Signal,
    module_path: String,
}

/// Maps stable signal identities to live reactive values across swaps.
#[derive(Debug, Default)]
pub struct RefreshStore {
    next_key: u64,
    instances: FxHashMap<InstanceId, InstanceSignals>,
    /// Snapshots captured at flush time, waiting for the runtime to
    /// restore them into the re-constructed instances.
    pending: FxHashMap<InstanceId, StateSnapshot>,
    /// Latest exports token per swapped module, recorded by `refresh`.
    swapped: FxHashMap<String, Value>,
}

impl RefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a running instance's signal with a stable identity.
    ///
    /// Re-registering the same `(instance, module_path, signal_id)` rebinds
    /// the signal handle (the new instance's cell) but returns the
    /// previously assigned key; identity is idempotent.
    pub fn register(
        &mut self,
        instance: InstanceId,
        module_path: &str,
        signal_id: &str,
        signal: Signal,
    ) -> SignalKey {
        let entry = self.instances.entry(instance).or_default();
        let slot_key = (module_path.to_string(), signal_id.to_string());

        if let Some(slot) = entry.slots.get_mut(&slot_key) {
            slot.signal = signal;
            return slot.key;
        }

        self.next_key += 1;
        let key = SignalKey(self.next_key);
        entry.slots.insert(
            slot_key,
            SignalSlot {
                key,
                signal,
                module_path: module_path.to_string(),
            },
        );
        key
    }

    /// Snapshot every signal associated with the instance.
    ///
    /// Returns `None` if the instance has no tracked signals.
    pub fn preserve_state(&self, instance: InstanceId) -> Option<StateSnapshot> {
        let entry = self.instances.get(&instance)?;
        if entry.slots.is_empty() {
            return None;
        }

        let values = entry
            .slots
            .values()
            .map(|slot| (slot.key, slot.signal.get()))
            .collect();
        Some(StateSnapshot { values })
    }

    /// Write snapshotted values back into the instance's signals.
    ///
    /// A snapshot entry whose identity no longer exists on the instance is
    /// silently dropped: components may add or remove state across an
    /// edit, that is never an error.
    pub fn restore_state(&self, instance: InstanceId, snapshot: StateSnapshot) {
        let Some(entry) = self.instances.get(&instance) else {
            return;
        };

        for slot in entry.slots.values() {
            if let Some(value) = snapshot.values.get(&slot.key) {
                slot.signal.set(value.clone());
            }
        }
    }

    /// Mark a module as swapped and record the new exports token.
    ///
    /// Bookkeeping only: instances are not mutated here. The caller uses
    /// the recorded exports to construct replacement instances.
    pub fn refresh(&mut self, module_path: &str, new_exports: Value) {
        self.swapped.insert(module_path.to_string(), new_exports);
    }

    /// Latest exports recorded for a swapped module.
    pub fn latest_exports(&self, module_path: &str) -> Option<&Value> {
        self.swapped.get(module_path)
    }

    /// Snapshot every instance holding signals from `module_path` into the
    /// pending map. Called by the engine immediately before an update
    /// message goes out. Returns the number of instances captured.
    pub fn preserve_module(&mut self, module_path: &str) -> usize {
        let affected: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, entry)| {
                entry
                    .slots
                    .values()
                    .any(|slot| slot.module_path == module_path)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut captured = 0;
        for instance in affected {
            if let Some(snapshot) = self.preserve_state(instance) {
                self.pending.insert(instance, snapshot);
                captured += 1;
            }
        }
        captured
    }

    /// Take the pending snapshot for an instance, consuming it.
    pub fn take_pending(&mut self, instance: InstanceId) -> Option<StateSnapshot> {
        self.pending.remove(&instance)
    }

    /// Drop all tracking for an instance (component unmounted).
    pub fn remove_instance(&mut self, instance: InstanceId) {
        self.instances.remove(&instance);
        self.pending.remove(&instance);
    }

    /// Drop a single identity from an instance (signal disposed).
    pub fn unregister_signal(&mut self, instance: InstanceId, module_path: &str, signal_id: &str) {
        if let Some(entry) = self.instances.get_mut(&instance) {
            entry
                .slots
                .remove(&(module_path.to_string(), signal_id.to_string()));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Listener Registry
//!
//! Ordered set of active listeners plus their delivery watermarks. Mutated
//! from arbitrary threads while the poller thread reads snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::debug;

use crate::listener::{EventListener, ListenerId};

#[derive(Default)]
struct RegistryState {
    listeners: Vec<(ListenerId, Arc<EventListener>)>,
    watermarks: HashMap<ListenerId, i64>,
}

/// Thread-safe listener registry
#[derive(Default)]
pub struct ListenerRegistry {
    state: RwLock<RegistryState>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; identical listeners registered twice are distinct
    pub fn register(&self, listener: EventListener) -> ListenerId {
        let id = ListenerId::new();
        debug!("Registering listener {} for {}", id, listener.event_kind());
        self.state.write().listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener and forget its watermark; `false` if it was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut state = self.state.write();
        let before = state.listeners.len();
        state.listeners.retain(|(existing, _)| *existing != id);
        state.watermarks.remove(&id);

        let removed = state.listeners.len() != before;
        if removed {
            debug!("Unregistered listener {}", id);
        }
        removed
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.state.read().listeners.iter().any(|(existing, _)| *existing == id)
    }

    /// Listeners in registration order
    pub fn snapshot(&self) -> Vec<(ListenerId, Arc<EventListener>)> {
        self.state.read().listeners.clone()
    }

    pub fn watermark(&self, id: ListenerId) -> Option<i64> {
        self.state.read().watermarks.get(&id).copied()
    }

    /// Raise the watermark to `value`, never lowering it
    ///
    /// Ignored for listeners that are no longer registered, so a cycle racing
    /// with `unregister` cannot resurrect stale state. Returns the stored value.
    pub fn advance_watermark(&self, id: ListenerId, value: i64) -> Option<i64> {
        let mut state = self.state.write();
        if !state.listeners.iter().any(|(existing, _)| *existing == id) {
            return None;
        }
        let entry = state.watermarks.entry(id).or_insert(value);
        *entry = (*entry).max(value);
        Some(*entry)
    }

    pub fn len(&self) -> usize {
        self.state.read().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

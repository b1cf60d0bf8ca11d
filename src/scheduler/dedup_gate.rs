//! Per-path load state that keeps one fetch in flight per track.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unknown,
    Requested,
    Loaded,
}

/// Test-and-set guard over path load states.
///
/// `try_begin` is the only way into `Requested`, so two visibility signals for
/// the same path can never both win.
#[derive(Default)]
pub struct DedupGate {
    states: Mutex<HashMap<String, LoadState>>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<String, LoadState>> {
        self.states.lock().expect("dedup gate lock poisoned")
    }

    /// Claims `path` for a fetch. Returns false when it is already requested or loaded.
    pub fn try_begin(&self, path: &str) -> bool {
        let mut states = self.lock_states();
        match states.get(path) {
            Some(LoadState::Requested) | Some(LoadState::Loaded) => false,
            Some(LoadState::Unknown) | None => {
                states.insert(path.to_string(), LoadState::Requested);
                true
            }
        }
    }

    /// Moves a requested path to `Loaded`. Ignored unless the path is currently requested.
    pub fn mark_loaded(&self, path: &str) -> bool {
        let mut states = self.lock_states();
        match states.get_mut(path) {
            Some(state @ LoadState::Requested) => {
                *state = LoadState::Loaded;
                true
            }
            _ => false,
        }
    }

    /// Records a path as loaded without a fetch, e.g. when restored from the cache.
    pub fn mark_preloaded(&self, path: &str) {
        self.lock_states()
            .insert(path.to_string(), LoadState::Loaded);
    }

    /// Drops a failed request so the next visibility signal retries it.
    pub fn release(&self, path: &str) -> bool {
        let mut states = self.lock_states();
        if states.get(path) == Some(&LoadState::Requested) {
            states.remove(path);
            return true;
        }
        false
    }

    pub fn forget(&self, path: &str) {
        self.lock_states().remove(path);
    }

    pub fn state(&self, path: &str) -> LoadState {
        self.lock_states()
            .get(path)
            .copied()
            .unwrap_or(LoadState::Unknown)
    }

    pub fn in_flight_count(&self) -> usize {
        self.count(LoadState::Requested)
    }

    pub fn loaded_count(&self) -> usize {
        self.count(LoadState::Loaded)
    }

    fn count(&self, wanted: LoadState) -> usize {
        self.lock_states()
            .values()
            .filter(|state| **state == wanted)
            .count()
    }

    pub fn reset(&self) {
        self.lock_states().clear();
    }
}

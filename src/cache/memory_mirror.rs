//! In-memory mirror of recently read or written cache entries.

use std::collections::HashMap;

use crate::model::CachedTrack;

struct MirrorSlot {
    track: CachedTrack,
    last_access: u64,
}

/// Path-keyed map of cached tracks, optionally capped with LRU eviction.
///
/// Entries are not revalidated against TTL or file size on read.
pub struct MemoryMirror {
    slots: HashMap<String, MirrorSlot>,
    max_entries: Option<usize>,
    access_clock: u64,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(max_entries: Option<usize>) -> Self {
        Self {
            slots: HashMap::new(),
            max_entries: max_entries.map(|limit| limit.max(1)),
            access_clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.access_clock += 1;
        self.access_clock
    }

    pub fn get(&mut self, path: &str) -> Option<CachedTrack> {
        let now = self.tick();
        let slot = self.slots.get_mut(path)?;
        slot.last_access = now;
        Some(slot.track.clone())
    }

    pub fn insert(&mut self, path: &str, track: CachedTrack) {
        let now = self.tick();
        if let Some(slot) = self.slots.get_mut(path) {
            slot.track = track;
            slot.last_access = now;
            return;
        }

        if let Some(limit) = self.max_entries {
            while self.slots.len() >= limit {
                if !self.evict_least_recent() {
                    break;
                }
            }
        }
        self.slots.insert(
            path.to_string(),
            MirrorSlot {
                track,
                last_access: now,
            },
        );
    }

    fn evict_least_recent(&mut self) -> bool {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(path, _)| path.clone());
        match oldest {
            Some(path) => {
                log::trace!("Evicting mirrored cache entry path={}", path);
                self.slots.remove(&path);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.slots.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn contains(&self, path: &str) -> bool {
        self.slots.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for MemoryMirror {
    fn default() -> Self {
        Self::new()
    }
}

//! Ordered track list backing the virtualized view.
//!
//! The model is the only writer of per-track metadata; everything else merges
//! through it by path and observes changes on the broadcast channel.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::debug;
use tokio::sync::broadcast;

use crate::model::{fallback_title_for_path, TrackMetadata, TrackStub};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackListEntry {
    pub stub: TrackStub,
    pub metadata: Option<TrackMetadata>,
    pub album_art: Option<Arc<[u8]>>,
}

impl TrackListEntry {
    pub fn from_stub(stub: TrackStub) -> Self {
        Self {
            stub,
            metadata: None,
            album_art: None,
        }
    }

    /// Metadata title when loaded, otherwise the file name without its extension.
    pub fn display_title(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.title.clone())
            .unwrap_or_else(|| fallback_title_for_path(&self.stub.display_name))
    }
}

/// Change notifications for list observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackListEvent {
    Replaced { track_count: usize },
    MetadataMerged { index: usize, path: String },
    Removed { index: usize, path: String },
}

#[derive(Default)]
struct TrackListState {
    entries: Vec<TrackListEntry>,
    index_by_path: HashMap<String, usize>,
}

impl TrackListState {
    fn rebuild_index(&mut self) {
        self.index_by_path = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.stub.path.clone(), index))
            .collect();
    }
}

pub struct TrackListModel {
    state: RwLock<TrackListState>,
    events: broadcast::Sender<TrackListEvent>,
}

impl TrackListModel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(TrackListState::default()),
            events,
        }
    }

    pub fn with_stubs(stubs: Vec<TrackStub>) -> Self {
        let model = Self::new();
        model.replace_all(stubs);
        model
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackListEvent> {
        self.events.subscribe()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, TrackListState> {
        self.state.read().expect("track list lock poisoned")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, TrackListState> {
        self.state.write().expect("track list lock poisoned")
    }

    /// Replaces the list with metadata-less stubs, keeping the first of any duplicate paths.
    pub fn replace_all(&self, stubs: Vec<TrackStub>) {
        self.replace_with_entries(stubs.into_iter().map(TrackListEntry::from_stub).collect());
    }

    pub fn replace_with_entries(&self, entries: Vec<TrackListEntry>) {
        let track_count = {
            let mut state = self.write_state();
            let mut seen = std::collections::HashSet::new();
            state.entries = entries
                .into_iter()
                .filter(|entry| seen.insert(entry.stub.path.clone()))
                .collect();
            state.rebuild_index();
            state.entries.len()
        };
        debug!("Track list replaced track_count={}", track_count);
        let _ = self.events.send(TrackListEvent::Replaced { track_count });
    }

    /// Merges resolved metadata into the entry for `path`.
    ///
    /// Returns false when the path is no longer in the list.
    pub fn merge_metadata(
        &self,
        path: &str,
        metadata: TrackMetadata,
        album_art: Option<Arc<[u8]>>,
    ) -> bool {
        let index = {
            let mut state = self.write_state();
            let Some(index) = state.index_by_path.get(path).copied() else {
                return false;
            };
            let entry = &mut state.entries[index];
            entry.metadata = Some(metadata);
            entry.album_art = album_art;
            index
        };
        let _ = self.events.send(TrackListEvent::MetadataMerged {
            index,
            path: path.to_string(),
        });
        true
    }

    pub fn remove(&self, path: &str) -> Option<TrackListEntry> {
        let (index, removed) = {
            let mut state = self.write_state();
            let index = state.index_by_path.get(path).copied()?;
            let removed = state.entries.remove(index);
            state.rebuild_index();
            (index, removed)
        };
        let _ = self.events.send(TrackListEvent::Removed {
            index,
            path: path.to_string(),
        });
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, index: usize) -> Option<TrackListEntry> {
        self.read_state().entries.get(index).cloned()
    }

    pub fn entry_by_path(&self, path: &str) -> Option<TrackListEntry> {
        let state = self.read_state();
        let index = state.index_by_path.get(path).copied()?;
        state.entries.get(index).cloned()
    }

    pub fn path_at(&self, index: usize) -> Option<String> {
        self.read_state()
            .entries
            .get(index)
            .map(|entry| entry.stub.path.clone())
    }

    pub fn file_size_of(&self, path: &str) -> Option<u64> {
        let state = self.read_state();
        let index = state.index_by_path.get(path).copied()?;
        state.entries.get(index).map(|entry| entry.stub.file_size)
    }

    pub fn display_title(&self, index: usize) -> Option<String> {
        self.read_state()
            .entries
            .get(index)
            .map(TrackListEntry::display_title)
    }

    pub fn snapshot(&self) -> Vec<TrackListEntry> {
        self.read_state().entries.clone()
    }

    pub fn loaded_count(&self) -> usize {
        self.read_state()
            .entries
            .iter()
            .filter(|entry| entry.metadata.is_some())
            .count()
    }
}

impl Default for TrackListModel {
    fn default() -> Self {
        Self::new()
    }
}

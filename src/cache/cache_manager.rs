//! Read-through/write-through facade over the persistent store and its memory mirror.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use super::memory_mirror::MemoryMirror;
use super::persistent_store::PersistentStore;
use crate::config::CacheConfig;
use crate::model::{CachedFile, CachedTrack, TrackMetadata};

/// Wall-clock source in unix milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Owns the persistent store and the in-memory mirror. Callers never reach
/// the store directly.
pub struct CacheManager {
    store: PersistentStore,
    mirror: Mutex<MemoryMirror>,
    clock: Clock,
    /// Bumped by `clear` so writes that straddle it do not repopulate the mirror.
    generation: AtomicU64,
}

impl CacheManager {
    pub fn new(store: PersistentStore) -> Self {
        Self {
            store,
            mirror: Mutex::new(MemoryMirror::new()),
            clock: Arc::new(now_unix_ms),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_mirror_limit(mut self, max_entries: Option<usize>) -> Self {
        self.mirror = Mutex::new(MemoryMirror::with_limit(max_entries));
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds a manager backed by the configured database file.
    ///
    /// Without a resolvable cache directory the cache lives in memory for this
    /// session only.
    pub fn from_config(config: &CacheConfig) -> Self {
        let store = match config.resolved_database_path() {
            Some(path) => PersistentStore::open(path, config.ttl()),
            None => {
                warn!("No cache directory available; metadata cache will not persist");
                PersistentStore::new_in_memory_with_ttl(config.ttl())
            }
        };
        Self::new(store).with_mirror_limit(config.mirror_max_entries)
    }

    fn lock_mirror(&self) -> std::sync::MutexGuard<'_, MemoryMirror> {
        self.mirror.lock().expect("metadata mirror lock poisoned")
    }

    pub async fn initialize(&self) -> bool {
        self.store.initialize().await
    }

    /// Mirror first, then the store. A store hit is mirrored before returning.
    pub async fn get(&self, path: &str, current_file_size: u64) -> Option<CachedTrack> {
        if let Some(track) = self.lock_mirror().get(path) {
            return Some(track);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let track = self
            .store
            .get(path, current_file_size, (self.clock)())
            .await?;
        self.mirror_if_current(path, &track, generation);
        Some(track)
    }

    /// Normalizes, writes through, and mirrors on a committed write.
    ///
    /// The normalized entry is returned even when the store write fails, so
    /// the caller can still render what the provider produced.
    pub async fn put(
        &self,
        path: &str,
        metadata: TrackMetadata,
        file_size: u64,
        album_art: Option<Vec<u8>>,
    ) -> CachedTrack {
        let metadata = metadata.normalized_for_path(path);
        let generation = self.generation.load(Ordering::Acquire);
        let committed = self
            .store
            .put(
                path,
                &metadata,
                file_size,
                album_art.as_deref(),
                (self.clock)(),
            )
            .await;

        let track = CachedTrack {
            metadata,
            album_art: album_art.map(Arc::from),
        };
        if committed {
            self.mirror_if_current(path, &track, generation);
        } else {
            debug!("Metadata not mirrored after failed write path={}", path);
        }
        track
    }

    fn mirror_if_current(&self, path: &str, track: &CachedTrack, generation: u64) {
        let mut mirror = self.lock_mirror();
        if self.generation.load(Ordering::Acquire) == generation {
            mirror.insert(path, track.clone());
        }
    }

    pub async fn remove(&self, path: &str) {
        self.lock_mirror().remove(path);
        self.store.remove(path).await;
    }

    pub async fn get_all(&self) -> Vec<CachedFile> {
        self.store.get_all().await
    }

    /// Empties both partitions and the mirror.
    pub async fn clear(&self) {
        {
            let mut mirror = self.lock_mirror();
            self.generation.fetch_add(1, Ordering::AcqRel);
            mirror.clear();
        }
        self.store.clear().await;
    }

    pub fn mirrored_len(&self) -> usize {
        self.lock_mirror().len()
    }
}

//! Library session lifecycle: scan, restore, refresh, and track removal.

use std::sync::Arc;

use log::{info, warn};

use crate::cache::CacheManager;
use crate::config::SchedulerConfig;
use crate::library::scanner::LibraryScanner;
use crate::metadata::MetadataProvider;
use crate::model::TrackStub;
use crate::scheduler::VisibilityScheduler;
use crate::track_list::{TrackListEntry, TrackListModel};

/// Wires the scanner, the cache and the scheduler around one track list.
pub struct LibrarySession {
    scanner: Arc<dyn LibraryScanner>,
    cache: Arc<CacheManager>,
    model: Arc<TrackListModel>,
    scheduler: VisibilityScheduler,
}

impl LibrarySession {
    pub fn new(
        scanner: Arc<dyn LibraryScanner>,
        provider: Arc<dyn MetadataProvider>,
        cache: Arc<CacheManager>,
        config: &SchedulerConfig,
    ) -> Self {
        let model = Arc::new(TrackListModel::new());
        let scheduler =
            VisibilityScheduler::new(Arc::clone(&cache), Arc::clone(&model), provider, config);
        Self {
            scanner,
            cache,
            model,
            scheduler,
        }
    }

    pub fn model(&self) -> &Arc<TrackListModel> {
        &self.model
    }

    pub fn scheduler(&self) -> &VisibilityScheduler {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Opens the cache and fills the list with freshly scanned stubs.
    ///
    /// A failed scan keeps the current list and returns the error.
    pub async fn activate(&self) -> Result<usize, String> {
        if !self.cache.initialize().await {
            warn!("Metadata cache unavailable; every visible track will be fetched");
        }
        let stubs = self.scan().await?;
        let track_count = stubs.len();
        self.model.replace_all(stubs);
        info!("Library session activated tracks={}", track_count);
        Ok(track_count)
    }

    async fn scan(&self) -> Result<Vec<TrackStub>, String> {
        self.scanner.scan().await.map_err(|err| {
            warn!("Library scan failed: {}", err);
            err
        })
    }

    /// Fills the list from every cached entry without scanning.
    ///
    /// Restored rows are already loaded, so scrolling over them fetches nothing.
    pub async fn restore_from_cache(&self) -> usize {
        self.cache.initialize().await;
        let cached = self.cache.get_all().await;
        let entries: Vec<TrackListEntry> = cached
            .into_iter()
            .map(|file| {
                let display_name = file
                    .path
                    .rsplit(['/', '\\'])
                    .next()
                    .unwrap_or(&file.path)
                    .to_string();
                TrackListEntry {
                    stub: TrackStub::new(file.path, display_name, file.file_size),
                    metadata: Some(file.metadata),
                    album_art: file.album_art,
                }
            })
            .collect();
        for entry in &entries {
            self.scheduler.mark_preloaded(&entry.stub.path);
        }
        let track_count = entries.len();
        self.model.replace_with_entries(entries);
        info!("Library restored from cache tracks={}", track_count);
        track_count
    }

    /// Drops all cached metadata and load states, then rescans.
    pub async fn refresh(&self) -> Result<usize, String> {
        self.scheduler.reset();
        self.cache.clear().await;
        let stubs = self.scan().await?;
        let track_count = stubs.len();
        self.model.replace_all(stubs);
        info!("Library refreshed tracks={}", track_count);
        Ok(track_count)
    }

    /// Removes a track from the list and its cached metadata.
    pub async fn remove_track(&self, path: &str) -> bool {
        let removed = self.model.remove(path).is_some();
        self.scheduler.forget(path);
        self.cache.remove(path).await;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PersistentStore;
    use crate::model::{FetchedMetadata, TrackMetadata};
    use crate::scheduler::{LoadOutcome, LoadState};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedScanner {
        stubs: Mutex<Result<Vec<TrackStub>, String>>,
    }

    impl FixedScanner {
        fn new(stubs: Vec<TrackStub>) -> Self {
            Self {
                stubs: Mutex::new(Ok(stubs)),
            }
        }

        fn set(&self, result: Result<Vec<TrackStub>, String>) {
            *self.stubs.lock().expect("scanner lock") = result;
        }
    }

    #[async_trait]
    impl LibraryScanner for FixedScanner {
        async fn scan(&self) -> Result<Vec<TrackStub>, String> {
            self.stubs.lock().expect("scanner lock").clone()
        }
    }

    #[derive(Default)]
    struct TitleProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataProvider for TitleProvider {
        async fn fetch_metadata(&self, path: &str) -> Result<FetchedMetadata, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FetchedMetadata {
                metadata: TrackMetadata {
                    title: Some(format!("Tagged {path}")),
                    ..TrackMetadata::default()
                },
                album_art: None,
            })
        }
    }

    fn stub(path: &str) -> TrackStub {
        TrackStub::new(path, path.trim_start_matches('/'), 100)
    }

    fn session(
        scanner: Arc<FixedScanner>,
        provider: Arc<TitleProvider>,
    ) -> LibrarySession {
        LibrarySession::new(
            scanner,
            provider,
            Arc::new(CacheManager::new(PersistentStore::new_in_memory())),
            &SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_activate_loads_scanned_stubs_in_order() {
        let scanner = Arc::new(FixedScanner::new(vec![stub("/b.mp3"), stub("/a.mp3")]));
        let session = session(scanner, Arc::new(TitleProvider::default()));

        assert_eq!(session.activate().await, Ok(2));
        assert_eq!(session.model().path_at(0).as_deref(), Some("/b.mp3"));
        assert_eq!(session.model().path_at(1).as_deref(), Some("/a.mp3"));
    }

    #[tokio::test]
    async fn test_failed_scan_keeps_existing_list() {
        let scanner = Arc::new(FixedScanner::new(vec![stub("/a.mp3")]));
        let session = session(Arc::clone(&scanner), Arc::new(TitleProvider::default()));
        session.activate().await.expect("first scan");

        scanner.set(Err("folder unavailable".to_string()));
        assert!(session.activate().await.is_err());
        assert_eq!(session.model().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_from_cache_marks_rows_loaded() {
        let scanner = Arc::new(FixedScanner::new(vec![stub("/a.mp3"), stub("/b.mp3")]));
        let provider = Arc::new(TitleProvider::default());
        let session = session(scanner, Arc::clone(&provider));
        session.activate().await.expect("scan");
        session.scheduler().load_now("/a.mp3").await;
        session.scheduler().reset();

        assert_eq!(session.restore_from_cache().await, 1);
        let restored = session.model().snapshot();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].stub.display_name, "a.mp3");
        assert_eq!(restored[0].stub.file_size, 100);
        assert_eq!(session.model().display_title(0).as_deref(), Some("Tagged /a.mp3"));
        assert_eq!(session.scheduler().load_state("/a.mp3"), LoadState::Loaded);
        assert_eq!(
            session.scheduler().load_now("/a.mp3").await,
            LoadOutcome::Skipped
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_clears_cache_and_load_states() {
        let scanner = Arc::new(FixedScanner::new(vec![stub("/a.mp3")]));
        let provider = Arc::new(TitleProvider::default());
        let session = session(Arc::clone(&scanner), Arc::clone(&provider));
        session.activate().await.expect("scan");
        session.scheduler().load_now("/a.mp3").await;

        scanner.set(Ok(vec![stub("/a.mp3"), stub("/c.mp3")]));
        assert_eq!(session.refresh().await, Ok(2));

        assert!(session.cache().get_all().await.is_empty());
        assert_eq!(session.scheduler().load_state("/a.mp3"), LoadState::Unknown);
        assert!(session.model().entry(0).expect("entry").metadata.is_none());
        assert_eq!(
            session.scheduler().load_now("/a.mp3").await,
            LoadOutcome::Fetched
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_track_drops_row_and_cache_entry() {
        let scanner = Arc::new(FixedScanner::new(vec![stub("/a.mp3"), stub("/b.mp3")]));
        let session = session(scanner, Arc::new(TitleProvider::default()));
        session.activate().await.expect("scan");
        session.scheduler().load_now("/a.mp3").await;

        assert!(session.remove_track("/a.mp3").await);
        assert!(!session.remove_track("/a.mp3").await);

        assert_eq!(session.model().len(), 1);
        assert!(session.cache().get("/a.mp3", 100).await.is_none());
        assert_eq!(session.scheduler().load_state("/a.mp3"), LoadState::Unknown);
    }
}

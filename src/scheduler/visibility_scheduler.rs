//! Visibility-driven metadata loading.
//!
//! Rows report visibility through a [`VisibilityDetector`]; each signal passes
//! the dedup gate synchronously, then resolves cache-aside on a spawned task:
//! cache hit, otherwise provider fetch followed by a write-through `put`.
//! Results are merged into the [`TrackListModel`] by path.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::task::JoinHandle;

use super::dedup_gate::{DedupGate, LoadState};
use super::visibility::{ItemBounds, Subscription, ViewportIntersection, VisibilityDetector};
use super::virtual_window::{ViewportGeometry, VirtualWindow};
use crate::cache::CacheManager;
use crate::config::{SchedulerConfig, ViewportConfig};
use crate::metadata::MetadataProvider;
use crate::model::FetchedMetadata;
use crate::track_list::TrackListModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    CacheHit,
    Fetched,
    /// Provider error or timeout; the path stays retryable.
    Failed,
    /// Gate refused the path, the track left the model, or a reset superseded the load.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub in_flight: usize,
    pub loaded: usize,
    pub provider_calls: usize,
    pub cache_hits: usize,
    pub failures: usize,
}

struct SchedulerInner {
    cache: Arc<CacheManager>,
    model: Arc<TrackListModel>,
    provider: Arc<dyn MetadataProvider>,
    gate: DedupGate,
    provider_timeout: Option<Duration>,
    epoch: AtomicU64,
    pending: Mutex<Vec<JoinHandle<LoadOutcome>>>,
    provider_calls: AtomicUsize,
    cache_hits: AtomicUsize,
    failures: AtomicUsize,
}

impl SchedulerInner {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    async fn call_provider(&self, path: &str) -> Result<FetchedMetadata, String> {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        match self.provider_timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.provider.fetch_metadata(path)).await {
                    Ok(result) => result,
                    Err(_) => Err(format!(
                        "provider timed out after {} ms",
                        timeout.as_millis()
                    )),
                }
            }
            None => self.provider.fetch_metadata(path).await,
        }
    }

    async fn resolve(self: Arc<Self>, path: String, epoch: u64) -> LoadOutcome {
        let Some(file_size) = self.model.file_size_of(&path) else {
            debug!("Skipping load for track no longer listed path={}", path);
            self.gate.release(&path);
            return LoadOutcome::Skipped;
        };

        if let Some(cached) = self.cache.get(&path, file_size).await {
            if !self.is_current(epoch) {
                return LoadOutcome::Skipped;
            }
            self.model
                .merge_metadata(&path, cached.metadata, cached.album_art);
            self.gate.mark_loaded(&path);
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Metadata cache hit path={}", path);
            return LoadOutcome::CacheHit;
        }

        debug!("Metadata cache miss; fetching path={}", path);
        match self.call_provider(&path).await {
            Ok(fetched) => {
                if !self.is_current(epoch) {
                    return LoadOutcome::Skipped;
                }
                let stored = self
                    .cache
                    .put(&path, fetched.metadata, file_size, fetched.album_art)
                    .await;
                if !self.is_current(epoch) {
                    // A clear may have run before this write committed.
                    debug!("Dropping write superseded by reset path={}", path);
                    self.cache.remove(&path).await;
                    return LoadOutcome::Skipped;
                }
                if !self
                    .model
                    .merge_metadata(&path, stored.metadata, stored.album_art)
                {
                    debug!("Fetched metadata for removed track path={}", path);
                }
                self.gate.mark_loaded(&path);
                LoadOutcome::Fetched
            }
            Err(err) => {
                warn!("Metadata fetch failed path={} error={}", path, err);
                self.failures.fetch_add(1, Ordering::Relaxed);
                if self.is_current(epoch) {
                    self.gate.release(&path);
                }
                LoadOutcome::Failed
            }
        }
    }
}

/// Schedules cache-aside metadata loads for rows that become visible.
///
/// Cloning is cheap; clones share the gate, the pending task list and the stats.
#[derive(Clone)]
pub struct VisibilityScheduler {
    inner: Arc<SchedulerInner>,
}

impl VisibilityScheduler {
    pub fn new(
        cache: Arc<CacheManager>,
        model: Arc<TrackListModel>,
        provider: Arc<dyn MetadataProvider>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                model,
                provider,
                gate: DedupGate::new(),
                provider_timeout: config.provider_timeout(),
                epoch: AtomicU64::new(0),
                pending: Mutex::new(Vec::new()),
                provider_calls: AtomicUsize::new(0),
                cache_hits: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
            }),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<LoadOutcome>>> {
        self.inner
            .pending
            .lock()
            .expect("scheduler pending lock poisoned")
    }

    /// Handles a visibility signal for `path`.
    ///
    /// The gate is claimed before this returns, so a second signal for the same
    /// path is a no-op until the first load fails. Returns whether a load was started.
    pub fn on_visible(&self, path: &str) -> bool {
        if !self.inner.gate.try_begin(path) {
            return false;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!("No async runtime for metadata load path={} error={}", path, err);
                self.inner.gate.release(path);
                return false;
            }
        };

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let task = handle.spawn(Arc::clone(&self.inner).resolve(path.to_string(), epoch));
        let mut pending = self.lock_pending();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
        true
    }

    /// Runs one load inline, subject to the same gate as `on_visible`.
    pub async fn load_now(&self, path: &str) -> LoadOutcome {
        if !self.inner.gate.try_begin(path) {
            return LoadOutcome::Skipped;
        }
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        Arc::clone(&self.inner)
            .resolve(path.to_string(), epoch)
            .await
    }

    /// Waits until every spawned load, including ones started meanwhile, has finished.
    pub async fn settle(&self) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.lock_pending());
            if batch.is_empty() {
                return outcomes;
            }
            for task in batch {
                match task.await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => warn!("Metadata load task failed: {}", err),
                }
            }
        }
    }

    /// Marks a path loaded without fetching, for entries restored from the cache.
    pub fn mark_preloaded(&self, path: &str) {
        self.inner.gate.mark_preloaded(path);
    }

    pub fn forget(&self, path: &str) {
        self.inner.gate.forget(path);
    }

    pub fn load_state(&self, path: &str) -> LoadState {
        self.inner.gate.state(path)
    }

    /// Forgets every load state. Loads already running finish without merging.
    pub fn reset(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.gate.reset();
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            in_flight: self.inner.gate.in_flight_count(),
            loaded: self.inner.gate.loaded_count(),
            provider_calls: self.inner.provider_calls.load(Ordering::Relaxed),
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
        }
    }
}

/// A virtualized list view: keeps the mounted rows registered with a
/// visibility detector that forwards signals to the scheduler.
pub struct ListViewport<D: VisibilityDetector = ViewportIntersection> {
    window: VirtualWindow,
    detector: D,
    model: Arc<TrackListModel>,
    mounted: BTreeMap<usize, Subscription>,
}

impl ListViewport<ViewportIntersection> {
    pub fn new(
        config: &ViewportConfig,
        model: Arc<TrackListModel>,
        scheduler: VisibilityScheduler,
    ) -> Self {
        let detector = ViewportIntersection::new(
            config,
            Box::new(move |path: &str| {
                scheduler.on_visible(path);
            }),
        );
        let window = VirtualWindow::new(ViewportGeometry::from(config), model.len());
        Self::with_detector(window, detector, model)
    }
}

impl<D: VisibilityDetector> ListViewport<D> {
    pub fn with_detector(window: VirtualWindow, detector: D, model: Arc<TrackListModel>) -> Self {
        let mut viewport = Self {
            window,
            detector,
            model,
            mounted: BTreeMap::new(),
        };
        viewport.sync_with_model();
        viewport
    }

    pub fn scroll_to(&mut self, offset_px: u64) {
        self.window.scroll_to(offset_px);
        self.remount();
    }

    pub fn scroll_by(&mut self, delta_px: i64) {
        self.window.scroll_by(delta_px);
        self.remount();
    }

    /// Re-reads the model after it was replaced or shrank and remounts every row.
    pub fn sync_with_model(&mut self) {
        for subscription in std::mem::take(&mut self.mounted).into_values() {
            self.detector.unregister(&subscription);
        }
        self.window.set_item_count(self.model.len());
        self.remount();
    }

    fn remount(&mut self) {
        let range = self.window.mounted_range();
        let leaving: Vec<usize> = self
            .mounted
            .keys()
            .copied()
            .filter(|index| !range.contains(index))
            .collect();
        for index in leaving {
            if let Some(subscription) = self.mounted.remove(&index) {
                self.detector.unregister(&subscription);
            }
        }

        self.detector
            .viewport_scrolled(self.window.scroll_offset_px());

        for index in range {
            if self.mounted.contains_key(&index) {
                continue;
            }
            let Some(path) = self.model.path_at(index) else {
                continue;
            };
            let bounds: ItemBounds = self.window.item_bounds(index);
            let subscription = self
                .detector
                .register(&path, Box::new(move || Some(bounds)));
            self.mounted.insert(index, subscription);
        }
    }

    pub fn visible_range(&self) -> Range<usize> {
        self.window.visible_range()
    }

    pub fn mounted_range(&self) -> Range<usize> {
        self.window.mounted_range()
    }

    pub fn mounted_paths(&self) -> Vec<String> {
        self.mounted
            .values()
            .map(|subscription| subscription.item_id().to_string())
            .collect()
    }

    pub fn window(&self) -> &VirtualWindow {
        &self.window
    }
}

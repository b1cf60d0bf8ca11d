//! Intersection-based visibility detection for mounted list rows.

use std::collections::BTreeMap;

use log::trace;

use crate::config::ViewportConfig;

/// Vertical extent of a row in content coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemBounds {
    pub top_px: u64,
    pub height_px: u32,
}

impl ItemBounds {
    pub fn bottom_px(&self) -> u64 {
        self.top_px + u64::from(self.height_px)
    }
}

/// Current bounds of a registered item; `None` while it has no layout.
pub type BoundsProvider = Box<dyn Fn() -> Option<ItemBounds> + Send>;

/// Invoked with the item id each time an item becomes visible.
pub type VisibleCallback = Box<dyn FnMut(&str) + Send>;

/// Handle returned by `register`; pass it back to `unregister`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
    item_id: String,
}

impl Subscription {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// Notifies a callback when registered items enter the visible area.
pub trait VisibilityDetector {
    /// Starts observing an item. An item already visible fires immediately.
    fn register(&mut self, item_id: &str, bounds: BoundsProvider) -> Subscription;
    fn unregister(&mut self, subscription: &Subscription);
    /// Re-evaluates every observed item against the new scroll offset.
    fn viewport_scrolled(&mut self, scroll_offset_px: u64);
}

struct ObservedItem {
    item_id: String,
    bounds: BoundsProvider,
    intersecting: bool,
}

/// Viewport intersection with a root margin and a minimum intersection ratio.
///
/// The callback fires on each transition from not intersecting to
/// intersecting, never while an item stays inside.
pub struct ViewportIntersection {
    viewport_height_px: u64,
    root_margin_px: u64,
    threshold: f32,
    scroll_offset_px: u64,
    next_id: u64,
    observed: BTreeMap<u64, ObservedItem>,
    on_visible: VisibleCallback,
}

impl ViewportIntersection {
    pub fn new(config: &ViewportConfig, on_visible: VisibleCallback) -> Self {
        Self {
            viewport_height_px: u64::from(config.viewport_height_px),
            root_margin_px: u64::from(config.root_margin_px),
            threshold: config.visibility_threshold,
            scroll_offset_px: 0,
            next_id: 0,
            observed: BTreeMap::new(),
            on_visible,
        }
    }

    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    fn is_intersecting(&self, bounds: Option<ItemBounds>) -> bool {
        let Some(bounds) = bounds else {
            return false;
        };
        if bounds.height_px == 0 {
            return false;
        }
        let area_top = self.scroll_offset_px.saturating_sub(self.root_margin_px);
        let area_bottom = self.scroll_offset_px + self.viewport_height_px + self.root_margin_px;
        let overlap_top = bounds.top_px.max(area_top);
        let overlap_bottom = bounds.bottom_px().min(area_bottom);
        if overlap_bottom <= overlap_top {
            return false;
        }
        let ratio = (overlap_bottom - overlap_top) as f64 / f64::from(bounds.height_px);
        ratio >= f64::from(self.threshold)
    }

    fn evaluate(&mut self, id: u64) {
        let Some(bounds) = self.observed.get(&id).map(|item| (item.bounds)()) else {
            return;
        };
        let now_intersecting = self.is_intersecting(bounds);
        let Some(item) = self.observed.get_mut(&id) else {
            return;
        };
        let became_visible = now_intersecting && !item.intersecting;
        item.intersecting = now_intersecting;
        if became_visible {
            trace!("Item became visible item_id={}", item.item_id);
            (self.on_visible)(&item.item_id);
        }
    }
}

impl VisibilityDetector for ViewportIntersection {
    fn register(&mut self, item_id: &str, bounds: BoundsProvider) -> Subscription {
        self.next_id += 1;
        let id = self.next_id;
        self.observed.insert(
            id,
            ObservedItem {
                item_id: item_id.to_string(),
                bounds,
                intersecting: false,
            },
        );
        self.evaluate(id);
        Subscription {
            id,
            item_id: item_id.to_string(),
        }
    }

    fn unregister(&mut self, subscription: &Subscription) {
        self.observed.remove(&subscription.id);
    }

    fn viewport_scrolled(&mut self, scroll_offset_px: u64) {
        self.scroll_offset_px = scroll_offset_px;
        let ids: Vec<u64> = self.observed.keys().copied().collect();
        for id in ids {
            self.evaluate(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn detector(config: ViewportConfig) -> (ViewportIntersection, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let detector = ViewportIntersection::new(
            &config,
            Box::new(move |item_id: &str| sink.lock().expect("sink").push(item_id.to_string())),
        );
        (detector, seen)
    }

    fn bounds(top_px: u64) -> BoundsProvider {
        Box::new(move || {
            Some(ItemBounds {
                top_px,
                height_px: 44,
            })
        })
    }

    #[test]
    fn test_register_fires_for_item_inside_viewport() {
        let (mut detector, seen) = detector(ViewportConfig::default());
        detector.register("a", bounds(0));
        detector.register("far", bounds(10_000));
        assert_eq!(*seen.lock().expect("seen"), vec!["a".to_string()]);
    }

    #[test]
    fn test_root_margin_extends_visible_area() {
        let (mut detector, seen) = detector(ViewportConfig::default());
        // Starts 60px below the viewport; the 100px margin reaches it.
        detector.register("below", bounds(600));
        // Starts beyond viewport plus margin.
        detector.register("beyond", bounds(640));
        assert_eq!(*seen.lock().expect("seen"), vec!["below".to_string()]);
    }

    #[test]
    fn test_threshold_requires_minimum_overlap() {
        let config = ViewportConfig {
            root_margin_px: 0,
            visibility_threshold: 0.5,
            ..ViewportConfig::default()
        };
        let (mut detector, seen) = detector(config);
        // 20 of 44px inside.
        detector.register("sliver", bounds(520));
        // 30 of 44px inside.
        detector.register("half", bounds(510));
        assert_eq!(*seen.lock().expect("seen"), vec!["half".to_string()]);
    }

    #[test]
    fn test_fires_again_only_after_leaving_and_reentering() {
        let config = ViewportConfig {
            root_margin_px: 0,
            ..ViewportConfig::default()
        };
        let (mut detector, seen) = detector(config);
        detector.register("a", bounds(0));
        detector.viewport_scrolled(10);
        assert_eq!(seen.lock().expect("seen").len(), 1);

        detector.viewport_scrolled(1_000);
        detector.viewport_scrolled(0);
        assert_eq!(seen.lock().expect("seen").len(), 2);
    }

    #[test]
    fn test_unregistered_item_is_not_reported() {
        let config = ViewportConfig {
            root_margin_px: 0,
            ..ViewportConfig::default()
        };
        let (mut detector, seen) = detector(config);
        let subscription = detector.register("late", bounds(2_000));
        detector.unregister(&subscription);
        detector.viewport_scrolled(2_000);

        assert!(seen.lock().expect("seen").is_empty());
        assert_eq!(detector.observed_count(), 0);
        assert_eq!(subscription.item_id(), "late");
    }

    #[test]
    fn test_item_without_layout_is_never_visible() {
        let (mut detector, seen) = detector(ViewportConfig::default());
        detector.register("detached", Box::new(|| None));
        detector.viewport_scrolled(0);
        assert!(seen.lock().expect("seen").is_empty());
    }
}

//! Fixed-row-height windowing: which rows are visible and which stay mounted.

use std::ops::Range;

use crate::config::ViewportConfig;
use crate::scheduler::visibility::ItemBounds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub item_height_px: u32,
    pub viewport_height_px: u32,
    pub overscan_count: usize,
}

impl From<&ViewportConfig> for ViewportGeometry {
    fn from(config: &ViewportConfig) -> Self {
        Self {
            item_height_px: config.item_height_px.max(1),
            viewport_height_px: config.viewport_height_px.max(1),
            overscan_count: config.overscan_count,
        }
    }
}

/// Scroll state of a virtualized list with `item_count` equally tall rows.
#[derive(Debug, Clone)]
pub struct VirtualWindow {
    geometry: ViewportGeometry,
    item_count: usize,
    scroll_offset_px: u64,
}

impl VirtualWindow {
    pub fn new(geometry: ViewportGeometry, item_count: usize) -> Self {
        Self {
            geometry,
            item_count,
            scroll_offset_px: 0,
        }
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn scroll_offset_px(&self) -> u64 {
        self.scroll_offset_px
    }

    fn item_height(&self) -> u64 {
        u64::from(self.geometry.item_height_px)
    }

    pub fn content_height_px(&self) -> u64 {
        self.item_count as u64 * self.item_height()
    }

    pub fn max_scroll_offset_px(&self) -> u64 {
        self.content_height_px()
            .saturating_sub(u64::from(self.geometry.viewport_height_px))
    }

    /// Moves to `offset_px`, clamped to the scrollable range. Returns the applied offset.
    pub fn scroll_to(&mut self, offset_px: u64) -> u64 {
        self.scroll_offset_px = offset_px.min(self.max_scroll_offset_px());
        self.scroll_offset_px
    }

    pub fn scroll_by(&mut self, delta_px: i64) -> u64 {
        let target = if delta_px >= 0 {
            self.scroll_offset_px.saturating_add(delta_px as u64)
        } else {
            self.scroll_offset_px.saturating_sub(delta_px.unsigned_abs())
        };
        self.scroll_to(target)
    }

    /// Replaces the row count and re-clamps the scroll offset.
    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
        let offset = self.scroll_offset_px;
        self.scroll_to(offset);
    }

    /// Rows intersecting the viewport, without overscan.
    pub fn visible_range(&self) -> Range<usize> {
        if self.item_count == 0 {
            return 0..0;
        }
        let height = self.item_height();
        let top = self.scroll_offset_px;
        let bottom = top + u64::from(self.geometry.viewport_height_px);
        let first = (top / height) as usize;
        let last = bottom.div_ceil(height) as usize;
        first.min(self.item_count)..last.min(self.item_count)
    }

    /// Rows the list keeps rendered: the visible range widened by overscan.
    pub fn mounted_range(&self) -> Range<usize> {
        let visible = self.visible_range();
        if visible.is_empty() {
            return visible;
        }
        let start = visible.start.saturating_sub(self.geometry.overscan_count);
        let end = visible
            .end
            .saturating_add(self.geometry.overscan_count)
            .min(self.item_count);
        start..end
    }

    pub fn item_bounds(&self, index: usize) -> ItemBounds {
        ItemBounds {
            top_px: index as u64 * self.item_height(),
            height_px: self.geometry.item_height_px,
        }
    }
}

//! Viewport-driven lazy loading: windowing, visibility detection, dedup, and scheduling.

pub mod dedup_gate;
pub mod virtual_window;
pub mod visibility;
pub mod visibility_scheduler;

pub use dedup_gate::{DedupGate, LoadState};
pub use virtual_window::{ViewportGeometry, VirtualWindow};
pub use visibility::{ItemBounds, Subscription, ViewportIntersection, VisibilityDetector};
pub use visibility_scheduler::{ListViewport, LoadOutcome, SchedulerStats, VisibilityScheduler};

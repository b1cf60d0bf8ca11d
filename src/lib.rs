//! Track-metadata cache and viewport-driven lazy loading for large,
//! virtualized track lists.
//!
//! A [`LibrarySession`] scans folders into a [`TrackListModel`]. A
//! [`ListViewport`] keeps only the mounted rows under observation and hands
//! visibility signals to the [`VisibilityScheduler`], which resolves each
//! track once through the [`CacheManager`] and, on a miss, the
//! [`MetadataProvider`].

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod scheduler;
pub mod track_list;

pub use cache::{CacheManager, PersistentStore};
pub use config::Config;
pub use error::CacheError;
pub use library::{FolderLibraryScanner, LibraryScanner, LibrarySession};
pub use metadata::{MetadataProvider, TagMetadataProvider};
pub use model::{CachedTrack, FetchedMetadata, TrackMetadata, TrackStub};
pub use scheduler::{ListViewport, LoadOutcome, VisibilityScheduler};
pub use track_list::{TrackListEvent, TrackListModel};

//! Two-layer metadata cache: an in-memory mirror in front of a SQLite store.

pub mod cache_manager;
pub mod memory_mirror;
pub mod persistent_store;

pub use cache_manager::{now_unix_ms, CacheManager, Clock};
pub use memory_mirror::MemoryMirror;
pub use persistent_store::{PersistentStore, DEFAULT_TTL, SCHEMA_VERSION};

//! Error type for the cache internals.
//!
//! Public cache operations never surface these to callers: the store and the
//! facade log them and degrade to a miss. They exist so the SQLite plumbing can
//! use `?` and so log lines carry a precise cause.

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Sqlite(rusqlite::Error),
    Serialization(serde_json::Error),
    Io(std::io::Error),
    Task(tokio::task::JoinError),
    /// The database was written by a newer build; downgrades are not supported.
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    /// The store failed to open earlier in this session.
    Unavailable,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Sqlite(err) => write!(f, "sqlite error: {}", err),
            CacheError::Serialization(err) => write!(f, "metadata serialization error: {}", err),
            CacheError::Io(err) => write!(f, "io error: {}", err),
            CacheError::Task(err) => write!(f, "blocking cache task failed: {}", err),
            CacheError::UnsupportedSchemaVersion { found, supported } => write!(
                f,
                "cache schema version {} is newer than supported version {}",
                found, supported
            ),
            CacheError::Unavailable => write!(f, "cache store is unavailable"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Sqlite(err) => Some(err),
            CacheError::Serialization(err) => Some(err),
            CacheError::Io(err) => Some(err),
            CacheError::Task(err) => Some(err),
            CacheError::UnsupportedSchemaVersion { .. } | CacheError::Unavailable => None,
        }
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Sqlite(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err)
    }
}

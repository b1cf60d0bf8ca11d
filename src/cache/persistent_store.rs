//! SQLite-backed durable store with `metadata` and `album_art` partitions.
//!
//! Every public operation swallows its own failures: errors are logged and
//! reported as a miss (reads) or `false` (writes), so a broken database turns
//! the cache into an always-miss cache instead of failing the caller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::OnceCell;

use crate::error::CacheError;
use crate::model::{ArtEntry, CacheEntry, CachedFile, CachedTrack, TrackMetadata};

/// Schema version recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS metadata (
        path TEXT PRIMARY KEY,
        metadata_json TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        timestamp_ms INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS metadata_timestamp ON metadata(timestamp_ms);
    CREATE TABLE IF NOT EXISTS album_art (
        path TEXT PRIMARY KEY REFERENCES metadata(path) ON DELETE CASCADE,
        blob BLOB NOT NULL,
        timestamp_ms INTEGER NOT NULL
    );
";

type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Clone)]
enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    fn describe(&self) -> String {
        match self {
            StoreLocation::File(path) => path.display().to_string(),
            StoreLocation::Memory => ":memory:".to_string(),
        }
    }
}

pub struct PersistentStore {
    location: StoreLocation,
    ttl: Duration,
    connection: OnceCell<Option<SharedConnection>>,
}

impl PersistentStore {
    /// Creates a store backed by `path`. Nothing is opened until first use.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            location: StoreLocation::File(path.as_ref().to_path_buf()),
            ttl,
            connection: OnceCell::new(),
        }
    }

    pub fn new_in_memory() -> Self {
        Self::new_in_memory_with_ttl(DEFAULT_TTL)
    }

    pub fn new_in_memory_with_ttl(ttl: Duration) -> Self {
        Self {
            location: StoreLocation::Memory,
            ttl,
            connection: OnceCell::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Opens the database and upgrades its schema.
    ///
    /// Concurrent callers await the same open. A failed open is not retried;
    /// the store then stays offline for the rest of the session.
    pub async fn initialize(&self) -> bool {
        self.shared_connection().await.is_some()
    }

    async fn shared_connection(&self) -> Option<SharedConnection> {
        self.connection
            .get_or_init(|| async {
                let location = self.location.clone();
                let opened = tokio::task::spawn_blocking(move || open_connection(&location))
                    .await
                    .map_err(CacheError::from)
                    .and_then(|result| result);
                match opened {
                    Ok(connection) => {
                        debug!("Metadata cache opened path={}", self.location.describe());
                        Some(Arc::new(Mutex::new(connection)))
                    }
                    Err(err) => {
                        error!(
                            "Failed to open metadata cache; caching disabled for this session. path={} error={}",
                            self.location.describe(),
                            err
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let connection = self
            .shared_connection()
            .await
            .ok_or(CacheError::Unavailable)?;
        tokio::task::spawn_blocking(move || {
            let mut connection = connection
                .lock()
                .expect("metadata cache connection lock poisoned");
            operation(&mut connection)
        })
        .await?
    }

    /// Returns the cached pair when the size matches and the entry is younger than the TTL.
    ///
    /// Stale rows are left in place; they are overwritten by the next `put`.
    pub async fn get(
        &self,
        path: &str,
        current_file_size: u64,
        now_unix_ms: i64,
    ) -> Option<CachedTrack> {
        let key = path.to_string();
        let stored = match self.run(move |connection| read_entry(connection, &key)).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Failed to read metadata cache path={} error={}", path, err);
                return None;
            }
        };

        let (entry, art) = stored?;
        if !entry.is_valid_for(current_file_size, now_unix_ms, self.ttl) {
            debug!(
                "Metadata cache entry rejected path={} cached_size={} current_size={} age_ms={}",
                path,
                entry.file_size,
                current_file_size,
                now_unix_ms.saturating_sub(entry.timestamp_unix_ms)
            );
            return None;
        }

        Some(CachedTrack {
            metadata: entry.metadata,
            album_art: art.map(|art| Arc::from(art.blob)),
        })
    }

    /// Writes metadata and artwork in one transaction. Returns whether it committed.
    ///
    /// Writing without artwork drops any artwork stored for the path earlier.
    pub async fn put(
        &self,
        path: &str,
        metadata: &TrackMetadata,
        file_size: u64,
        album_art: Option<&[u8]>,
        now_unix_ms: i64,
    ) -> bool {
        let metadata_json = match serde_json::to_string(metadata) {
            Ok(json) => json,
            Err(err) => {
                warn!("Failed to serialize metadata path={} error={}", path, err);
                return false;
            }
        };
        let key = path.to_string();
        let art = album_art.map(|blob| ArtEntry {
            path: key.clone(),
            blob: blob.to_vec(),
            timestamp_unix_ms: now_unix_ms,
        });

        let result = self
            .run(move |connection| {
                write_entry(connection, &key, &metadata_json, file_size, now_unix_ms, art)
            })
            .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to write metadata cache path={} error={}", path, err);
                false
            }
        }
    }

    pub async fn remove(&self, path: &str) {
        let key = path.to_string();
        let result = self
            .run(move |connection| {
                let transaction = connection.transaction()?;
                transaction.execute("DELETE FROM album_art WHERE path = ?1", params![key])?;
                transaction.execute("DELETE FROM metadata WHERE path = ?1", params![key])?;
                transaction.commit()?;
                Ok(())
            })
            .await;
        if let Err(err) = result {
            warn!("Failed to remove metadata cache path={} error={}", path, err);
        }
    }

    /// Every stored entry joined with its artwork, ordered by path.
    ///
    /// No TTL or size validation is applied here.
    pub async fn get_all(&self) -> Vec<CachedFile> {
        match self.run(read_all_entries).await {
            Ok(files) => files,
            Err(err) => {
                warn!("Failed to list metadata cache entries: {}", err);
                Vec::new()
            }
        }
    }

    pub async fn clear(&self) {
        let result = self
            .run(|connection| {
                let transaction = connection.transaction()?;
                let art_rows = transaction.execute("DELETE FROM album_art", [])?;
                let metadata_rows = transaction.execute("DELETE FROM metadata", [])?;
                transaction.commit()?;
                Ok((metadata_rows, art_rows))
            })
            .await;
        match result {
            Ok((metadata_rows, art_rows)) => info!(
                "Metadata cache cleared metadata_rows={} art_rows={}",
                metadata_rows, art_rows
            ),
            Err(err) => warn!("Failed to clear metadata cache: {}", err),
        }
    }

    #[cfg(test)]
    pub(crate) async fn partition_counts(&self) -> (usize, usize) {
        self.run(|connection| {
            let metadata: i64 =
                connection.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
            let art: i64 =
                connection.query_row("SELECT COUNT(*) FROM album_art", [], |row| row.get(0))?;
            Ok((metadata as usize, art as usize))
        })
        .await
        .expect("partition counts should be readable")
    }
}

fn open_connection(location: &StoreLocation) -> Result<Connection, CacheError> {
    let mut connection = match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        }
        StoreLocation::Memory => Connection::open_in_memory()?,
    };
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.busy_timeout(Duration::from_secs(5))?;
    upgrade_schema(&mut connection)?;
    Ok(connection)
}

/// Forward-only upgrade to `SCHEMA_VERSION`; newer databases are refused.
fn upgrade_schema(connection: &mut Connection) -> Result<(), CacheError> {
    let recorded: i64 = connection.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if recorded > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedSchemaVersion {
            found: recorded,
            supported: SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;
    transaction.execute_batch(SCHEMA_SQL)?;
    if recorded < SCHEMA_VERSION {
        transaction.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }
    transaction.commit()?;

    if recorded < SCHEMA_VERSION {
        info!(
            "Metadata cache schema upgraded from_version={} to_version={}",
            recorded, SCHEMA_VERSION
        );
    }
    Ok(())
}

fn to_sql_size(file_size: u64) -> i64 {
    i64::try_from(file_size).unwrap_or(i64::MAX)
}

fn from_sql_size(file_size: i64) -> u64 {
    u64::try_from(file_size).unwrap_or(0)
}

fn read_entry(
    connection: &mut Connection,
    path: &str,
) -> Result<Option<(CacheEntry, Option<ArtEntry>)>, CacheError> {
    let row = connection
        .query_row(
            "SELECT m.metadata_json, m.file_size, m.timestamp_ms, a.blob, a.timestamp_ms
             FROM metadata m LEFT JOIN album_art a ON a.path = m.path
             WHERE m.path = ?1",
            params![path],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((metadata_json, file_size, timestamp_ms, blob, art_timestamp_ms)) = row else {
        return Ok(None);
    };
    let entry = CacheEntry {
        path: path.to_string(),
        metadata: serde_json::from_str(&metadata_json)?,
        file_size: from_sql_size(file_size),
        timestamp_unix_ms: timestamp_ms,
    };
    let art = blob.map(|blob| ArtEntry {
        path: path.to_string(),
        blob,
        timestamp_unix_ms: art_timestamp_ms.unwrap_or(timestamp_ms),
    });
    Ok(Some((entry, art)))
}

fn write_entry(
    connection: &mut Connection,
    path: &str,
    metadata_json: &str,
    file_size: u64,
    now_unix_ms: i64,
    art: Option<ArtEntry>,
) -> Result<(), CacheError> {
    let transaction = connection.transaction()?;
    transaction.execute(
        "INSERT INTO metadata (path, metadata_json, file_size, timestamp_ms)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(path) DO UPDATE SET
            metadata_json = excluded.metadata_json,
            file_size = excluded.file_size,
            timestamp_ms = excluded.timestamp_ms",
        params![path, metadata_json, to_sql_size(file_size), now_unix_ms],
    )?;
    match art {
        Some(art) => {
            transaction.execute(
                "INSERT INTO album_art (path, blob, timestamp_ms)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                    blob = excluded.blob,
                    timestamp_ms = excluded.timestamp_ms",
                params![art.path, art.blob, art.timestamp_unix_ms],
            )?;
        }
        None => {
            transaction.execute("DELETE FROM album_art WHERE path = ?1", params![path])?;
        }
    }
    transaction.commit()?;
    Ok(())
}

fn read_all_entries(connection: &mut Connection) -> Result<Vec<CachedFile>, CacheError> {
    let mut statement = connection.prepare(
        "SELECT m.path, m.metadata_json, m.file_size, a.blob
         FROM metadata m LEFT JOIN album_art a ON a.path = m.path
         ORDER BY m.path ASC",
    )?;
    let rows = statement.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<Vec<u8>>>(3)?,
        ))
    })?;

    let mut files = Vec::new();
    for row in rows {
        let (path, metadata_json, file_size, blob) = row?;
        let metadata = match serde_json::from_str::<TrackMetadata>(&metadata_json) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Skipping unreadable metadata cache row path={} error={}", path, err);
                continue;
            }
        };
        files.push(CachedFile {
            path,
            metadata,
            file_size: from_sql_size(file_size),
            album_art: blob.map(Arc::from),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 1_700_000_000_000;

    fn metadata(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            album: Some("Album".to_string()),
            ..TrackMetadata::default()
        }
    }

    fn art(bytes: &[u8]) -> Option<&[u8]> {
        Some(bytes)
    }

    fn raw_connection(path: &Path) -> Connection {
        Connection::open(path).expect("failed to open raw sqlite file")
    }

    #[tokio::test]
    async fn test_put_then_get_returns_metadata_and_art() {
        let store = PersistentStore::new_in_memory();
        assert!(
            store
                .put("/m/a.mp3", &metadata("A"), 1000, art(&[1, 2, 3]), NOW)
                .await
        );

        let cached = store
            .get("/m/a.mp3", 1000, NOW + DAY_MS)
            .await
            .expect("entry should be valid");
        assert_eq!(cached.metadata, metadata("A"));
        assert_eq!(cached.album_art.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[tokio::test]
    async fn test_get_misses_on_size_mismatch_without_deleting() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("A"), 1000, None, NOW).await;

        assert!(store.get("/m/a.mp3", 1200, NOW).await.is_none());
        assert_eq!(store.partition_counts().await, (1, 0));
        assert!(store.get("/m/a.mp3", 1000, NOW).await.is_some());
    }

    #[tokio::test]
    async fn test_get_misses_once_entry_reaches_ttl() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("A"), 1000, None, NOW).await;

        assert!(store.get("/m/a.mp3", 1000, NOW + 7 * DAY_MS - 1).await.is_some());
        assert!(store.get("/m/a.mp3", 1000, NOW + 7 * DAY_MS).await.is_none());
    }

    #[tokio::test]
    async fn test_get_absent_path_is_miss() {
        let store = PersistentStore::new_in_memory();
        assert!(store.get("/m/none.mp3", 1, NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_entry_and_refreshes_timestamp() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("Old"), 1000, art(&[9]), NOW).await;
        store
            .put("/m/a.mp3", &metadata("New"), 1200, art(&[7]), NOW + 8 * DAY_MS)
            .await;

        let cached = store
            .get("/m/a.mp3", 1200, NOW + 8 * DAY_MS)
            .await
            .expect("rewritten entry should be valid");
        assert_eq!(cached.metadata.title.as_deref(), Some("New"));
        assert_eq!(cached.album_art.as_deref(), Some(&[7u8][..]));
        assert_eq!(store.partition_counts().await, (1, 1));
    }

    #[tokio::test]
    async fn test_put_without_art_drops_previous_art() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("A"), 1000, art(&[1]), NOW).await;
        store.put("/m/a.mp3", &metadata("A"), 1000, None, NOW).await;

        let cached = store.get("/m/a.mp3", 1000, NOW).await.expect("entry");
        assert!(cached.album_art.is_none());
        assert_eq!(store.partition_counts().await, (1, 0));
    }

    #[tokio::test]
    async fn test_remove_deletes_both_partitions() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("A"), 1000, art(&[1]), NOW).await;
        store.put("/m/b.mp3", &metadata("B"), 1000, art(&[2]), NOW).await;

        store.remove("/m/a.mp3").await;
        store.remove("/m/missing.mp3").await;

        assert!(store.get("/m/a.mp3", 1000, NOW).await.is_none());
        assert_eq!(store.partition_counts().await, (1, 1));
    }

    #[tokio::test]
    async fn test_clear_empties_both_partitions() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/a.mp3", &metadata("A"), 1000, art(&[1]), NOW).await;
        store.put("/m/b.mp3", &metadata("B"), 1000, None, NOW).await;

        store.clear().await;

        assert_eq!(store.partition_counts().await, (0, 0));
        assert!(store.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_joins_partitions_in_path_order() {
        let store = PersistentStore::new_in_memory();
        store.put("/m/b.mp3", &metadata("B"), 20, None, NOW).await;
        store.put("/m/a.mp3", &metadata("A"), 10, art(&[4, 2]), NOW).await;

        let files = store.get_all().await;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "/m/a.mp3");
        assert_eq!(files[0].file_size, 10);
        assert_eq!(files[0].album_art.as_deref(), Some(&[4u8, 2][..]));
        assert_eq!(files[1].path, "/m/b.mp3");
        assert!(files[1].album_art.is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_under_concurrent_callers() {
        let store = PersistentStore::new_in_memory();
        let (first, second) = tokio::join!(store.initialize(), store.initialize());
        assert!(first && second);
        assert!(store.initialize().await);

        store.put("/m/a.mp3", &metadata("A"), 1, None, NOW).await;
        assert!(store.initialize().await);
        assert!(store.get("/m/a.mp3", 1, NOW).await.is_some());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("cache").join("metadata.db");

        {
            let store = PersistentStore::open(&db_path, DEFAULT_TTL);
            assert!(store.put("/m/a.mp3", &metadata("A"), 1000, art(&[5]), NOW).await);
        }

        let reopened = PersistentStore::open(&db_path, DEFAULT_TTL);
        let cached = reopened.get("/m/a.mp3", 1000, NOW).await.expect("persisted");
        assert_eq!(cached.album_art.as_deref(), Some(&[5u8][..]));
    }

    #[tokio::test]
    async fn test_failed_art_write_rolls_back_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("metadata.db");
        let store = PersistentStore::open(&db_path, DEFAULT_TTL);
        assert!(store.initialize().await);
        raw_connection(&db_path)
            .execute_batch(
                "CREATE TRIGGER reject_album_art BEFORE INSERT ON album_art
                 BEGIN
                     SELECT RAISE(ABORT, 'album art rejected');
                 END;",
            )
            .expect("create trigger");

        assert!(!store.put("/m/a.mp3", &metadata("A"), 1000, art(&[1, 2]), NOW).await);
        assert_eq!(store.partition_counts().await, (0, 0));
        assert!(store.get("/m/a.mp3", 1000, NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_version_one_database_gains_album_art_partition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("metadata.db");
        {
            let connection = raw_connection(&db_path);
            connection
                .execute_batch(
                    "CREATE TABLE metadata (
                        path TEXT PRIMARY KEY,
                        metadata_json TEXT NOT NULL,
                        file_size INTEGER NOT NULL,
                        timestamp_ms INTEGER NOT NULL
                    );
                    PRAGMA user_version = 1;",
                )
                .expect("create v1 schema");
            connection
                .execute(
                    "INSERT INTO metadata VALUES (?1, ?2, ?3, ?4)",
                    params!["/m/old.mp3", r#"{"title":"Old"}"#, 10, NOW],
                )
                .expect("insert v1 row");
        }

        let store = PersistentStore::open(&db_path, DEFAULT_TTL);
        assert!(store.initialize().await);
        let cached = store.get("/m/old.mp3", 10, NOW).await.expect("v1 row kept");
        assert_eq!(cached.metadata.title.as_deref(), Some("Old"));
        assert!(store.put("/m/new.mp3", &metadata("N"), 1, art(&[1]), NOW).await);
        drop(store);

        let version: i64 = raw_connection(&db_path)
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .expect("read version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_newer_schema_degrades_to_always_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("metadata.db");
        raw_connection(&db_path)
            .execute_batch("PRAGMA user_version = 3;")
            .expect("set future version");

        let store = PersistentStore::open(&db_path, DEFAULT_TTL);
        assert!(!store.initialize().await);
        assert!(!store.put("/m/a.mp3", &metadata("A"), 1, None, NOW).await);
        assert!(store.get("/m/a.mp3", 1, NOW).await.is_none());
        assert!(store.get_all().await.is_empty());
        store.remove("/m/a.mp3").await;
        store.clear().await;
    }
}

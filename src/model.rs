//! Track stubs, metadata payloads, and cache record shapes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// One scanned audio file, before any metadata is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStub {
    /// Unique key for the track across the cache and the list model.
    pub path: String,
    pub display_name: String,
    /// Size in bytes at scan time; the content fingerprint checked by the cache.
    pub file_size: u64,
}

impl TrackStub {
    pub fn new(path: impl Into<String>, display_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            file_size,
        }
    }
}

/// Resolved tag values for a track.
///
/// `title`, `artist` and `album` are the fields rendering depends on; every
/// other provider field is carried through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TrackMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TrackMetadata {
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Fills missing or blank required fields so rendering never sees them unset.
    pub fn normalized_for_path(self, path: &str) -> TrackMetadata {
        TrackMetadata {
            title: non_blank(self.title).or_else(|| Some(fallback_title_for_path(path))),
            artist: non_blank(self.artist).or_else(|| Some(UNKNOWN_ARTIST.to_string())),
            album: non_blank(self.album).or_else(|| Some(UNKNOWN_ALBUM.to_string())),
            extra: self.extra,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// File name without directories or the final extension.
///
/// Both `/` and `\` count as separators so paths recorded on another
/// platform still produce a readable title.
pub fn fallback_title_for_path(path: &str) -> String {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name[..dot].to_string(),
        _ => file_name.to_string(),
    }
}

/// Provider output for one track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedMetadata {
    pub metadata: TrackMetadata,
    pub album_art: Option<Vec<u8>>,
}

/// Row of the `metadata` partition.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub path: String,
    pub metadata: TrackMetadata,
    pub file_size: u64,
    pub timestamp_unix_ms: i64,
}

impl CacheEntry {
    /// Usable only for the same file size and while younger than `ttl`.
    pub fn is_valid_for(&self, current_file_size: u64, now_unix_ms: i64, ttl: Duration) -> bool {
        if self.file_size != current_file_size {
            return false;
        }
        let age_ms = now_unix_ms.saturating_sub(self.timestamp_unix_ms);
        i128::from(age_ms) < ttl.as_millis() as i128
    }
}

/// Row of the `album_art` partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtEntry {
    pub path: String,
    pub blob: Vec<u8>,
    pub timestamp_unix_ms: i64,
}

/// Metadata plus artwork for one path, as mirrored in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTrack {
    pub metadata: TrackMetadata,
    pub album_art: Option<Arc<[u8]>>,
}

/// Bulk export shape joining both partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFile {
    pub path: String,
    pub metadata: TrackMetadata,
    pub file_size: u64,
    pub album_art: Option<Arc<[u8]>>,
}

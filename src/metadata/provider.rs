//! Metadata provider seam and the tag-reading implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use log::debug;

use super::art::prepare_list_art;
use super::tags::read_track_tags;
use crate::model::FetchedMetadata;

/// Resolves metadata and optional artwork for one track path.
///
/// Errors are plain messages; the scheduler logs them and retries on the next
/// visibility signal.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_metadata(&self, path: &str) -> Result<FetchedMetadata, String>;
}

/// Reads embedded tags on the blocking pool and shrinks artwork for list rows.
pub struct TagMetadataProvider {
    list_art_max_edge_px: u32,
}

impl TagMetadataProvider {
    pub fn new(list_art_max_edge_px: u32) -> Self {
        Self {
            list_art_max_edge_px,
        }
    }
}

#[async_trait]
impl MetadataProvider for TagMetadataProvider {
    async fn fetch_metadata(&self, path: &str) -> Result<FetchedMetadata, String> {
        let file_path = PathBuf::from(path);
        let max_edge_px = self.list_art_max_edge_px;
        let fetched = tokio::task::spawn_blocking(move || {
            let readout = read_track_tags(&file_path)?;
            let album_art = readout
                .embedded_art
                .and_then(|bytes| prepare_list_art(&bytes, max_edge_px));
            Ok::<_, String>(FetchedMetadata {
                metadata: readout.metadata,
                album_art,
            })
        })
        .await
        .map_err(|err| format!("tag reader task failed: {}", err))??;

        debug!(
            "Read track tags path={} has_art={}",
            path,
            fetched.album_art.is_some()
        );
        Ok(fetched)
    }
}

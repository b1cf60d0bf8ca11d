//! Library scanning: turns configured folders into track stubs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::model::TrackStub;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 7] =
    ["mp3", "wav", "ogg", "flac", "aac", "m4a", "mp4"];

/// Produces the ordered stub list for a library.
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<TrackStub>, String>;
}

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn stub_for_file(path: &Path, file_size: u64) -> TrackStub {
    let display_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    TrackStub::new(path.to_string_lossy().to_string(), display_name, file_size)
}

/// Walks `folder_path` depth-first and returns stubs for supported files, sorted by path.
pub fn collect_track_stubs_from_folder(folder_path: &Path) -> Vec<TrackStub> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut tracks: Vec<(PathBuf, u64)> = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_audio_file(&path) {
                match entry.metadata() {
                    Ok(metadata) => tracks.push((path, metadata.len())),
                    Err(err) => debug!("Failed to stat {}: {}", path.display(), err),
                }
            }
        }
    }

    tracks.sort_unstable_by(|left, right| left.0.cmp(&right.0));
    tracks
        .into_iter()
        .map(|(path, size)| stub_for_file(&path, size))
        .collect()
}

/// Scans a fixed set of folders, or single files, on the blocking pool.
pub struct FolderLibraryScanner {
    roots: Vec<PathBuf>,
}

impl FolderLibraryScanner {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(config.resolved_folders())
    }

    /// Roots keep their configured order; each folder's stubs are sorted by path.
    fn scan_blocking(roots: &[PathBuf]) -> Vec<TrackStub> {
        let mut stubs = Vec::new();
        let mut seen_paths = HashSet::new();
        let mut push_unique = |stub: TrackStub| {
            if seen_paths.insert(stub.path.clone()) {
                stubs.push(stub);
            }
        };
        for root in roots {
            if root.is_file() {
                if !is_supported_audio_file(root) {
                    continue;
                }
                match std::fs::metadata(root) {
                    Ok(metadata) => push_unique(stub_for_file(root, metadata.len())),
                    Err(err) => debug!("Failed to stat {}: {}", root.display(), err),
                }
                continue;
            }
            if !root.is_dir() {
                warn!("Library folder does not exist: {}", root.display());
                continue;
            }
            collect_track_stubs_from_folder(root)
                .into_iter()
                .for_each(&mut push_unique);
        }
        stubs
    }
}

#[async_trait]
impl LibraryScanner for FolderLibraryScanner {
    async fn scan(&self) -> Result<Vec<TrackStub>, String> {
        if self.roots.is_empty() {
            return Err("no library folders configured".to_string());
        }
        let roots = self.roots.clone();
        let stubs = tokio::task::spawn_blocking(move || Self::scan_blocking(&roots))
            .await
            .map_err(|err| format!("library scan task failed: {}", err))?;
        info!(
            "Library scan finished folders={} tracks={}",
            self.roots.len(),
            stubs.len()
        );
        Ok(stubs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, vec![0u8; bytes]).expect("write file");
    }

    #[test]
    fn test_is_supported_audio_file_ignores_case() {
        assert!(is_supported_audio_file(Path::new("/m/a.FLAC")));
        assert!(is_supported_audio_file(Path::new("/m/a.m4a")));
        assert!(!is_supported_audio_file(Path::new("/m/cover.jpg")));
        assert!(!is_supported_audio_file(Path::new("/m/noext")));
    }

    #[test]
    fn test_collect_track_stubs_walks_nested_folders_with_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(&dir.path().join("b.mp3"), 10);
        write_file(&dir.path().join("nested").join("a.flac"), 20);
        write_file(&dir.path().join("nested").join("cover.png"), 5);

        let stubs = collect_track_stubs_from_folder(dir.path());
        assert_eq!(stubs.len(), 2);
        let by_name: Vec<(&str, u64)> = stubs
            .iter()
            .map(|stub| (stub.display_name.as_str(), stub.file_size))
            .collect();
        assert!(by_name.contains(&("b.mp3", 10)));
        assert!(by_name.contains(&("a.flac", 20)));
        let mut sorted = stubs.clone();
        sorted.sort_by(|left, right| left.path.cmp(&right.path));
        assert_eq!(stubs, sorted);
    }

    #[tokio::test]
    async fn test_scan_merges_roots_without_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let song = dir.path().join("song.ogg");
        write_file(&song, 3);
        write_file(&dir.path().join("other.wav"), 4);

        let scanner = FolderLibraryScanner::new(vec![
            dir.path().to_path_buf(),
            song.clone(),
            dir.path().join("missing"),
        ]);
        let stubs = scanner.scan().await.expect("scan succeeds");
        assert_eq!(stubs.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_keeps_configured_folder_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let zeta = dir.path().join("zeta");
        let alpha = dir.path().join("alpha");
        write_file(&zeta.join("z2.mp3"), 1);
        write_file(&zeta.join("z1.mp3"), 1);
        write_file(&alpha.join("a1.mp3"), 1);

        let scanner = FolderLibraryScanner::new(vec![zeta, alpha.clone(), alpha.join("a1.mp3")]);
        let order: Vec<String> = scanner
            .scan()
            .await
            .expect("scan succeeds")
            .into_iter()
            .map(|stub| stub.display_name)
            .collect();
        assert_eq!(order, vec!["z1.mp3", "z2.mp3", "a1.mp3"]);
    }

    #[tokio::test]
    async fn test_scan_without_roots_is_an_error() {
        let scanner = FolderLibraryScanner::new(Vec::new());
        assert!(scanner.scan().await.is_err());
    }
}

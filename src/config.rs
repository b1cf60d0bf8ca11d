//! Persistent configuration model, defaults, and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

const APP_DIR_NAME: &str = "trackcache";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "metadata_cache.db";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Persistent cache and in-memory mirror settings.
    pub cache: CacheConfig,
    #[serde(default)]
    /// Geometry of the virtualized track list.
    pub viewport: ViewportConfig,
    #[serde(default)]
    /// Fetch scheduling behavior.
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    /// Library folders fed to the scanner.
    pub library: LibraryConfig,
}

/// Persistent cache and in-memory mirror settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Overrides the platform cache location of the SQLite database.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    /// Caps the in-memory mirror with LRU eviction. Unbounded when unset.
    #[serde(default)]
    pub mirror_max_entries: Option<usize>,
    #[serde(default = "default_list_art_max_edge_px")]
    pub list_art_max_edge_px: u32,
}

/// Fixed-row list geometry and intersection tuning.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ViewportConfig {
    #[serde(default = "default_item_height_px")]
    pub item_height_px: u32,
    #[serde(default = "default_viewport_height_px")]
    pub viewport_height_px: u32,
    /// Rows mounted beyond each edge of the visible range.
    #[serde(default = "default_overscan_count")]
    pub overscan_count: usize,
    /// Distance around the viewport that still counts as visible.
    #[serde(default = "default_root_margin_px")]
    pub root_margin_px: u32,
    /// Fraction of a row that must intersect before it counts as visible.
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

/// Fetch scheduling behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SchedulerConfig {
    /// Treats provider calls slower than this as failures. No timeout when unset.
    #[serde(default)]
    pub provider_timeout_ms: Option<u64>,
}

/// Library folders fed to the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    /// Scanned in order. Falls back to the platform audio directory when empty.
    #[serde(default)]
    pub folders: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            ttl_days: default_ttl_days(),
            mirror_max_entries: None,
            list_art_max_edge_px: default_list_art_max_edge_px(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            item_height_px: default_item_height_px(),
            viewport_height_px: default_viewport_height_px(),
            overscan_count: default_overscan_count(),
            root_margin_px: default_root_margin_px(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_days) * 24 * 60 * 60)
    }

    /// Resolves the configured database path, or the platform default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match self.database_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => default_database_path(),
        }
    }
}

impl SchedulerConfig {
    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }
}

impl LibraryConfig {
    /// Configured folders, or the platform audio directory when none are set.
    pub fn resolved_folders(&self) -> Vec<PathBuf> {
        let folders: Vec<PathBuf> = self
            .folders
            .iter()
            .map(|folder| folder.trim())
            .filter(|folder| !folder.is_empty())
            .map(PathBuf::from)
            .collect();
        if !folders.is_empty() {
            return folders;
        }
        dirs::audio_dir().into_iter().collect()
    }
}

fn default_ttl_days() -> u32 {
    7
}

fn default_list_art_max_edge_px() -> u32 {
    320
}

fn default_item_height_px() -> u32 {
    44
}

fn default_viewport_height_px() -> u32 {
    540
}

fn default_overscan_count() -> usize {
    2
}

fn default_root_margin_px() -> u32 {
    100
}

fn default_visibility_threshold() -> f32 {
    0.1
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn default_database_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|path| path.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}

/// Clamps values that would break list geometry or cache validation.
pub fn sanitize_config(config: Config) -> Config {
    let viewport = ViewportConfig {
        item_height_px: config.viewport.item_height_px.max(1),
        viewport_height_px: config.viewport.viewport_height_px.max(1),
        overscan_count: config.viewport.overscan_count.min(64),
        root_margin_px: config.viewport.root_margin_px,
        visibility_threshold: if config.viewport.visibility_threshold.is_finite() {
            config.viewport.visibility_threshold.clamp(0.0, 1.0)
        } else {
            default_visibility_threshold()
        },
    };

    Config {
        cache: CacheConfig {
            ttl_days: config.cache.ttl_days.max(1),
            mirror_max_entries: config.cache.mirror_max_entries.map(|limit| limit.max(1)),
            list_art_max_edge_px: config.cache.list_art_max_edge_px.clamp(16, 4096),
            ..config.cache
        },
        viewport,
        scheduler: SchedulerConfig {
            provider_timeout_ms: config.scheduler.provider_timeout_ms.map(|ms| ms.max(1)),
        },
        library: config.library,
    }
}

/// Loads and sanitizes a config file, falling back to defaults on any failure.
pub fn load_config_file(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

/// Writes a default config file when none exists yet.
pub fn ensure_config_file(path: &Path) {
    if path.exists() {
        return;
    }
    info!(
        "Config file not found. Creating default config. path={}",
        path.display()
    );
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!(
                "Failed to create config directory {}: {}",
                parent.display(),
                err
            );
            return;
        }
    }
    let serialized = match toml::to_string(&Config::default()) {
        Ok(serialized) => serialized,
        Err(err) => {
            log::error!("Failed to serialize default config: {}", err);
            return;
        }
    };
    if let Err(err) = std::fs::write(path, serialized) {
        log::error!("Failed to write config to {}: {}", path.display(), err);
    }
}

use std::sync::Arc;

use log::{info, warn};

use trackcache::config::{self, Config};
use trackcache::{
    CacheManager, FolderLibraryScanner, ListViewport, LibrarySession, TagMetadataProvider,
};

const PAGES_TO_SCROLL: usize = 3;

fn init_logging() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        clog.parse_filters(&filters);
    }
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn load_config() -> Config {
    match config::default_config_path() {
        Some(path) => {
            config::ensure_config_file(&path);
            config::load_config_file(&path)
        }
        None => {
            warn!("No config directory available. Using defaults");
            Config::default()
        }
    }
}

fn log_window(session: &LibrarySession, viewport: &ListViewport) {
    let model = session.model();
    let visible = viewport.visible_range();
    info!(
        "Window rows={}..{} of {} mounted={}",
        visible.start,
        visible.end,
        model.len(),
        viewport.mounted_paths().len()
    );
    for index in visible {
        let Some(entry) = model.entry(index) else {
            continue;
        };
        let artist = entry
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.artist.clone())
            .unwrap_or_default();
        info!(
            "  {:>5} {} {} {}",
            index,
            entry.display_title(),
            artist,
            if entry.album_art.is_some() { "[art]" } else { "" }
        );
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cache = Arc::new(CacheManager::from_config(&config.cache));
    let scanner = Arc::new(FolderLibraryScanner::from_config(&config.library));
    let provider = Arc::new(TagMetadataProvider::new(config.cache.list_art_max_edge_px));
    let session = LibrarySession::new(scanner, provider, cache, &config.scheduler);

    session.activate().await?;
    let mut viewport = ListViewport::new(
        &config.viewport,
        Arc::clone(session.model()),
        session.scheduler().clone(),
    );
    session.scheduler().settle().await;
    log_window(&session, &viewport);

    let page = i64::from(config.viewport.viewport_height_px);
    for _ in 0..PAGES_TO_SCROLL {
        let before = viewport.window().scroll_offset_px();
        viewport.scroll_by(page);
        if viewport.window().scroll_offset_px() == before {
            break;
        }
        session.scheduler().settle().await;
        log_window(&session, &viewport);
    }

    let stats = session.scheduler().stats();
    info!(
        "Done loaded={} provider_calls={} cache_hits={} failures={} mirrored={}",
        stats.loaded,
        stats.provider_calls,
        stats.cache_hits,
        stats.failures,
        session.cache().mirrored_len()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let mut config = load_config();
    let folders: Vec<String> = std::env::args().skip(1).collect();
    if !folders.is_empty() {
        info!("Scanning folders from command line: {}", folders.join(", "));
        config.library.folders = folders;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(run(config))
}

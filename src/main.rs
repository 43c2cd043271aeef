use std::sync::Arc;
use std::time::Duration;

use lyricwave::constants::{APP_NAME, TICK_INTERVAL_MILLIS};
use lyricwave::persistence::{MemorySessionStore, SessionStore, SqliteSessionStore};
use lyricwave::projector::{NowPlayingInfo, NowPlayingProjector, NowPlayingSurface};
use lyricwave::utils::error_handling::create_runtime;
use lyricwave::{HttpTrackCatalog, ManifestRewriter, PlaybackEngine, RodioBackend, TrackCatalog};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_TEAM: &str = "demo";

/// Console surface: prints a now-playing line whenever the frame changes
/// meaningfully (title, play state, or whole-second position).
struct ConsoleSurface {
    last: std::sync::Mutex<(String, bool, u64)>,
}

impl ConsoleSurface {
    fn new() -> Self {
        Self {
            last: std::sync::Mutex::new((String::new(), false, u64::MAX)),
        }
    }
}

impl NowPlayingSurface for ConsoleSurface {
    fn update(&self, info: &NowPlayingInfo) {
        let key = (
            info.title.clone(),
            info.rate > 0.0,
            info.elapsed_seconds as u64,
        );
        if let Ok(mut last) = self.last.lock() {
            if *last == key {
                return;
            }
            *last = key;
        }
        log::info!(
            "[NowPlaying] {} | {} | {:.0}s / {:.0}s",
            if info.rate > 0.0 { "playing" } else { "paused" },
            info.title,
            info.elapsed_seconds,
            info.duration_seconds
        );
    }
}

fn main() {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("[Main] Starting {} v{}", APP_NAME, APP_VERSION);

    let catalog_url =
        std::env::var("LYRICWAVE_CATALOG_URL").unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string());
    let team = std::env::var("LYRICWAVE_TEAM").unwrap_or_else(|_| DEFAULT_TEAM.to_string());
    log::info!("[Main] Catalog {} | team {}", catalog_url, team);

    let catalog = Arc::new(HttpTrackCatalog::new(&catalog_url));
    let store: Arc<dyn SessionStore> = match SqliteSessionStore::open_default() {
        Some(store) => Arc::new(store),
        None => {
            log::warn!("[Main] Falling back to in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
    };

    let rt = match create_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("[Main] Failed to create runtime: {}", e);
            return;
        }
    };
    let tracks = match rt.block_on(catalog.list_tracks(&team)) {
        Ok(tracks) => tracks,
        Err(e) => {
            log::error!("[Main] Failed to load catalog for team {}: {}", team, e);
            return;
        }
    };
    if tracks.is_empty() {
        log::error!("[Main] Team {} has no tracks", team);
        return;
    }
    log::info!("[Main] {} tracks available", tracks.len());

    let (engine, events) = PlaybackEngine::new(
        Box::new(RodioBackend::new()),
        catalog,
        store,
        ManifestRewriter::new(),
    );
    let engine = Arc::new(engine);

    if let Err(e) = engine.set_playlist(&team, tracks, 0) {
        log::error!("[Main] Failed to start playlist: {}", e);
        return;
    }

    let mut projector = NowPlayingProjector::new(
        Arc::clone(&engine),
        events,
        Box::new(ConsoleSurface::new()),
    );

    // Playlist wraps around, so this runs until interrupted.
    loop {
        projector.pump();
        std::thread::sleep(Duration::from_millis(TICK_INTERVAL_MILLIS));
    }
}

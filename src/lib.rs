//! LyricWave playback library.
//!
//! Streams team-scoped catalog tracks through a background playback engine:
//! locator validation and manifest rewriting, a swappable underlying player,
//! wraparound playlist traversal, periodic position observation, now-playing
//! projection, and session persistence for resume across restarts.

pub mod api;
pub mod constants;
pub mod engine;
pub mod manifest;
pub mod models;
pub mod persistence;
pub mod player;
pub mod projector;
pub mod utils;

pub use api::{HttpTrackCatalog, MemoryCatalog, TrackCatalog};
pub use engine::{EngineState, PlaybackEngine, PlaybackSnapshot, PlayerEvent, StopReason};
pub use manifest::{ManifestRewriter, StagedManifest};
pub use models::Track;
pub use persistence::{MemorySessionStore, SessionStore, SqliteSessionStore};
pub use player::{MediaSource, PlayerBackend, PlayerHandle, RodioBackend};
pub use projector::{
    AudioSessionEvent, NowPlayingInfo, NowPlayingProjector, NowPlayingSurface, TransportCommand,
    TransportOutcome,
};
pub use utils::{CatalogError, PlaybackError};

use std::time::Duration;

use crate::models::Track;

/// Engine state machine. `Idle` is initial; `Stopped` keeps its reason so a
/// manual stop, a completed play-through, and a failed load stay
/// distinguishable to consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Manual,
    Completed,
    /// The load failed; the underlying cause is retained for display.
    Error(String),
}

/// Playlist context, present only when navigation was seeded from a catalog
/// listing. Invariant: `index < tracks.len()`.
#[derive(Debug, Clone)]
pub struct PlaylistContext {
    pub scope: String,
    pub tracks: Vec<Track>,
    pub index: usize,
}

/// The single mutable playback record. Created once at engine construction
/// and reset field-by-field on stop; all writes happen on the worker thread
/// (plus the consumer-owned `finished` reset).
#[derive(Debug)]
pub struct PlaybackSession {
    pub state: EngineState,
    pub track: Option<Track>,
    /// The resolved locator actually playing (absolute URL or staged path).
    pub resolved_locator: Option<String>,
    pub elapsed: Duration,
    /// Zero until the underlying player resolves it.
    pub duration: Duration,
    pub playing: bool,
    /// One-shot end-of-media latch; cleared by `take_finished()` or the next load.
    pub finished: bool,
    pub playlist: Option<PlaylistContext>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
            track: None,
            resolved_locator: None,
            elapsed: Duration::ZERO,
            duration: Duration::ZERO,
            playing: false,
            finished: false,
            playlist: None,
        }
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the session for consumers; reading it never blocks the worker
/// for longer than the field copies.
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub state: EngineState,
    pub track: Option<Track>,
    pub resolved_locator: Option<String>,
    pub elapsed: Duration,
    pub duration: Duration,
    pub playing: bool,
    pub finished: bool,
    pub playlist_index: Option<usize>,
}

impl PlaybackSnapshot {
    pub(super) fn of(session: &PlaybackSession) -> Self {
        Self {
            state: session.state.clone(),
            track: session.track.clone(),
            resolved_locator: session.resolved_locator.clone(),
            elapsed: session.elapsed,
            duration: session.duration,
            playing: session.playing,
            finished: session.finished,
            playlist_index: session.playlist.as_ref().map(|p| p.index),
        }
    }
}

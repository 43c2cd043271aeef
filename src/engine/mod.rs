//! Playback engine.
//!
//! `PlaybackEngine` is the public face: cheap validation happens on the
//! caller's thread, everything that touches the player goes through a
//! command channel to a dedicated worker thread. The worker owns the
//! backend, the catalog, and the one live player binding, and drives a
//! periodic tick that publishes position events.

pub mod session;
mod worker;

pub use session::{EngineState, PlaybackSnapshot, StopReason};

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use session::PlaybackSession;

use crate::api::TrackCatalog;
use crate::manifest::ManifestRewriter;
use crate::models::Track;
use crate::persistence::SessionStore;
use crate::player::PlayerBackend;
use crate::utils::error_handling::{create_runtime, safe_lock};
use crate::utils::errors::PlaybackError;

#[derive(Debug)]
pub(crate) enum EngineCommand {
    Play(Track),
    SetPlaylist {
        scope: String,
        tracks: Vec<Track>,
        index: usize,
    },
    Pause,
    Resume {
        track: Track,
        position: Duration,
    },
    Seek {
        seconds: f64,
    },
    Stop,
    Next,
    Previous,
    ReassertRoute,
}

/// Events published by the worker, in order, to a single consumer.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackChanged(Track),
    Position {
        elapsed: Duration,
        duration: Duration,
        playing: bool,
    },
    StateChanged(EngineState),
    Completed,
}

/// Media locators must be absolute http(s) URLs with a non-empty remainder.
pub(crate) fn is_valid_locator(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(rest) if !rest.is_empty())
}

pub struct PlaybackEngine {
    command_tx: Sender<EngineCommand>,
    session: Arc<Mutex<PlaybackSession>>,
    store: Arc<dyn SessionStore>,
}

impl PlaybackEngine {
    /// Starts the worker thread. The returned receiver carries the ordered
    /// event stream; dropping it does not affect playback.
    pub fn new(
        backend: Box<dyn PlayerBackend>,
        catalog: Arc<dyn TrackCatalog>,
        store: Arc<dyn SessionStore>,
        rewriter: ManifestRewriter,
    ) -> (Self, Receiver<PlayerEvent>) {
        let (command_tx, command_rx) = channel();
        let (events_tx, events_rx) = channel();
        let session = Arc::new(Mutex::new(PlaybackSession::new()));

        let worker_session = Arc::clone(&session);
        let worker_store = Arc::clone(&store);
        thread::spawn(move || {
            let rt = match create_runtime() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("[Engine] Failed to create runtime: {}", e);
                    return;
                }
            };
            worker::Worker::new(
                backend,
                catalog,
                worker_store,
                rewriter,
                worker_session,
                events_tx,
                rt,
            )
            .run(command_rx);
        });

        (
            Self {
                command_tx,
                session,
                store,
            },
            events_rx,
        )
    }

    /// Plays a single track outside any playlist context.
    pub fn play(&self, track: Track) -> Result<(), PlaybackError> {
        if !is_valid_locator(&track.media_url) {
            log::warn!(
                "[Engine] Rejecting play of {}: invalid media locator {:?}",
                track.id,
                track.media_url
            );
            return Err(PlaybackError::InvalidLocator(track.media_url));
        }
        self.send(EngineCommand::Play(track));
        Ok(())
    }

    /// Installs a playlist for `scope` and starts at `start_index`.
    pub fn set_playlist(
        &self,
        scope: &str,
        tracks: Vec<Track>,
        start_index: usize,
    ) -> Result<(), PlaybackError> {
        if start_index >= tracks.len() {
            return Err(PlaybackError::PlaylistIndex {
                index: start_index,
                len: tracks.len(),
            });
        }
        self.send(EngineCommand::SetPlaylist {
            scope: scope.to_string(),
            tracks,
            index: start_index,
        });
        Ok(())
    }

    pub fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    /// Resumes from the persisted session: re-plays the saved track and
    /// seeks back to the saved position.
    pub fn resume(&self) -> Result<(), PlaybackError> {
        let (track, position) = self
            .store
            .load()
            .ok_or(PlaybackError::NoResumableSession)?;
        if !is_valid_locator(&track.media_url) {
            return Err(PlaybackError::InvalidLocator(track.media_url));
        }
        self.send(EngineCommand::Resume { track, position });
        Ok(())
    }

    pub fn toggle_play_pause(&self) -> Result<(), PlaybackError> {
        if self.snapshot().playing {
            self.pause();
            Ok(())
        } else {
            self.resume()
        }
    }

    /// Seeks to `seconds`, clamped to the known media bounds.
    pub fn seek(&self, seconds: f64) {
        self.send(EngineCommand::Seek { seconds });
    }

    pub fn stop(&self) {
        self.send(EngineCommand::Stop);
    }

    pub fn play_next(&self) {
        self.send(EngineCommand::Next);
    }

    pub fn play_previous(&self) {
        self.send(EngineCommand::Previous);
    }

    /// Nudges the player after an output route change.
    pub fn reassert_route(&self) {
        self.send(EngineCommand::ReassertRoute);
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        match safe_lock(&self.session, "Engine") {
            Some(session) => PlaybackSnapshot::of(&session),
            None => PlaybackSnapshot::of(&PlaybackSession::new()),
        }
    }

    /// Reads and clears the end-of-media latch.
    pub fn take_finished(&self) -> bool {
        safe_lock(&self.session, "Engine").is_some_and(|mut s| std::mem::take(&mut s.finished))
    }

    fn send(&self, command: EngineCommand) {
        if self.command_tx.send(command).is_err() {
            log::error!("[Engine] Worker thread is gone, dropping command");
        }
    }
}

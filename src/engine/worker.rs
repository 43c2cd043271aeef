//! The engine worker: single owner of the active binding and all session
//! mutation. Commands and the periodic tick are serialized here, so the
//! teardown-then-setup ordering for a new play can never interleave with a
//! position update from the previous binding.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;

use super::session::{EngineState, PlaybackSession, PlaylistContext, StopReason};
use super::{is_valid_locator, EngineCommand, PlayerEvent};
use crate::api::TrackCatalog;
use crate::constants::{
    MANIFEST_SUFFIX, MAX_MEDIA_DURATION_SECS, SESSION_SAVE_EVERY_TICKS, TICK_INTERVAL_MILLIS,
};
use crate::manifest::ManifestRewriter;
use crate::models::Track;
use crate::persistence::SessionStore;
use crate::player::{MediaSource, PlayerBackend, PlayerHandle};
use crate::utils::error_handling::safe_lock;

/// The association between the session and one concrete player instance.
struct Binding {
    handle: Box<dyn PlayerHandle>,
    staged: Option<PathBuf>,
}

enum Step {
    Next,
    Previous,
}

pub(super) struct Worker {
    backend: Box<dyn PlayerBackend>,
    catalog: Arc<dyn TrackCatalog>,
    store: Arc<dyn SessionStore>,
    rewriter: ManifestRewriter,
    session: Arc<Mutex<PlaybackSession>>,
    events_tx: std::sync::mpsc::Sender<PlayerEvent>,
    rt: Runtime,
    binding: Option<Binding>,
    ticks_since_save: u32,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        backend: Box<dyn PlayerBackend>,
        catalog: Arc<dyn TrackCatalog>,
        store: Arc<dyn SessionStore>,
        rewriter: ManifestRewriter,
        session: Arc<Mutex<PlaybackSession>>,
        events_tx: std::sync::mpsc::Sender<PlayerEvent>,
        rt: Runtime,
    ) -> Self {
        Self {
            backend,
            catalog,
            store,
            rewriter,
            session,
            events_tx,
            rt,
            binding: None,
            ticks_since_save: 0,
        }
    }

    pub(super) fn run(mut self, command_rx: Receiver<EngineCommand>) {
        log::debug!("[Engine] Worker started");
        loop {
            loop {
                match command_rx.try_recv() {
                    Ok(command) => self.handle_command(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.teardown();
                        log::debug!("[Engine] Command channel closed, worker exiting");
                        return;
                    }
                }
            }
            self.tick();
            std::thread::sleep(Duration::from_millis(TICK_INTERVAL_MILLIS));
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Play(track) => {
                self.load_track(track, None);
            }
            EngineCommand::SetPlaylist {
                scope,
                tracks,
                index,
            } => {
                let track = tracks[index].clone();
                if let Some(mut s) = safe_lock(&self.session, "Engine") {
                    s.playlist = Some(PlaylistContext {
                        scope,
                        tracks,
                        index,
                    });
                }
                self.load_track(track, None);
            }
            EngineCommand::Pause => self.handle_pause(),
            EngineCommand::Resume { track, position } => {
                log::info!(
                    "[Engine] Resuming saved session: track {} at {:?}",
                    track.id,
                    position
                );
                self.load_track(track, Some(position));
            }
            EngineCommand::Seek { seconds } => self.handle_seek(seconds),
            EngineCommand::Stop => self.handle_stop(),
            EngineCommand::Next => self.handle_step(Step::Next),
            EngineCommand::Previous => self.handle_step(Step::Previous),
            EngineCommand::ReassertRoute => self.handle_reassert(),
        }
    }

    /// Tears down any existing binding, then installs a new one for `track`.
    ///
    /// Returns false only for the invalid-locator no-op; every other failure
    /// transitions to `Stopped(Error)` with the cause retained.
    fn load_track(&mut self, track: Track, start_at: Option<Duration>) -> bool {
        if !is_valid_locator(&track.media_url) {
            log::warn!(
                "[Engine] Invalid media locator for track {}: {:?}",
                track.id,
                track.media_url
            );
            return false;
        }

        // Unconditional: observers and the previous player must be gone
        // before anything about the new track becomes visible.
        self.teardown();
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.finished = false;
            s.track = Some(track.clone());
            s.state = EngineState::Loading;
        }
        self.emit(PlayerEvent::TrackChanged(track.clone()));
        self.emit(PlayerEvent::StateChanged(EngineState::Loading));

        let mut staged_path = None;
        let source = if track.media_url.ends_with(MANIFEST_SUFFIX) {
            match self.rt.block_on(self.rewriter.rewrite(&track.media_url)) {
                Ok(staged) => {
                    staged_path = Some(staged.path.clone());
                    MediaSource::StagedManifest(staged.path)
                }
                Err(e) => {
                    self.fail_load(e.to_string());
                    return true;
                }
            }
        } else {
            MediaSource::Remote(track.media_url.clone())
        };

        match self.backend.open(&source) {
            Ok(mut handle) => {
                handle.play();
                let mut start = Duration::ZERO;
                if let Some(position) = start_at {
                    if let Err(e) = handle.seek(position) {
                        log::warn!("[Engine] Seek to saved position failed: {}", e);
                    } else {
                        start = position;
                    }
                }
                if let Some(mut s) = safe_lock(&self.session, "Engine") {
                    s.resolved_locator = Some(source.describe());
                    s.elapsed = start;
                    s.playing = true;
                    s.state = EngineState::Playing;
                }
                self.emit(PlayerEvent::StateChanged(EngineState::Playing));
                self.binding = Some(Binding {
                    handle,
                    staged: staged_path,
                });
                self.ticks_since_save = 0;
                log::info!("[Engine] Playing '{}' ({})", track.title, track.id);
                true
            }
            Err(e) => {
                if let Some(path) = staged_path {
                    remove_staged(&path);
                }
                self.fail_load(e.to_string());
                true
            }
        }
    }

    fn fail_load(&mut self, cause: String) {
        log::error!("[Engine] Load failed: {}", cause);
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.state = EngineState::Stopped(StopReason::Error(cause.clone()));
        }
        self.emit(PlayerEvent::StateChanged(EngineState::Stopped(
            StopReason::Error(cause),
        )));
    }

    /// Releases the player, removes its staged manifest, and zeroes the
    /// timeline fields. State and track are left to the caller.
    fn teardown(&mut self) {
        if let Some(mut binding) = self.binding.take() {
            binding.handle.stop();
            if let Some(path) = binding.staged {
                remove_staged(&path);
            }
        }
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.elapsed = Duration::ZERO;
            s.duration = Duration::ZERO;
            s.playing = false;
            s.resolved_locator = None;
        }
    }

    fn handle_pause(&mut self) {
        let playing = safe_lock(&self.session, "Engine").is_some_and(|s| s.playing);
        if !playing {
            return;
        }
        let Some(binding) = &mut self.binding else {
            return;
        };
        binding.handle.pause();

        let saved = safe_lock(&self.session, "Engine").map(|mut s| {
            s.playing = false;
            s.state = EngineState::Paused;
            (s.track.clone(), s.elapsed)
        });
        self.emit(PlayerEvent::StateChanged(EngineState::Paused));
        if let Some((Some(track), elapsed)) = saved {
            self.store.save(&track, elapsed);
            log::info!("[Engine] Paused '{}' at {:?}", track.title, elapsed);
        }
    }

    fn handle_seek(&mut self, seconds: f64) {
        let target = {
            let Some(mut s) = safe_lock(&self.session, "Engine") else {
                return;
            };
            if !matches!(s.state, EngineState::Playing | EngineState::Paused) {
                log::debug!("[Engine] Ignoring seek in state {:?}", s.state);
                return;
            }
            // Clamp in the f64 domain; Duration::from_secs_f64 panics on
            // non-finite or overflowing input.
            let limit = if s.duration > Duration::ZERO {
                s.duration.as_secs_f64()
            } else {
                MAX_MEDIA_DURATION_SECS
            };
            let clamped = if seconds.is_finite() {
                seconds.clamp(0.0, limit)
            } else {
                0.0
            };
            let target = Duration::from_secs_f64(clamped);
            // Optimistic: the observer keeps publishing this position even
            // before the player lands on it.
            s.elapsed = target;
            target
        };
        if let Some(binding) = &mut self.binding {
            if let Err(e) = binding.handle.seek(target) {
                log::warn!("[Engine] Seek failed: {}", e);
            }
        }
    }

    fn handle_stop(&mut self) {
        if self.binding.is_some() {
            let saved = safe_lock(&self.session, "Engine").map(|s| (s.track.clone(), s.elapsed));
            if let Some((Some(track), elapsed)) = saved {
                self.store.save(&track, elapsed);
            }
        }
        self.teardown();
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.state = EngineState::Stopped(StopReason::Manual);
        }
        self.emit(PlayerEvent::StateChanged(EngineState::Stopped(
            StopReason::Manual,
        )));
        log::info!("[Engine] Stopped");
    }

    fn handle_reassert(&mut self) {
        let playing = safe_lock(&self.session, "Engine").is_some_and(|s| s.playing);
        if !playing {
            return;
        }
        if let Some(binding) = &mut self.binding {
            binding.handle.play();
            log::info!("[Engine] Re-asserted playback on new output route");
        }
    }

    /// Catalog-backed next/previous. Lookup failures leave state untouched.
    fn handle_step(&mut self, step: Step) {
        let (current, scope) = match safe_lock(&self.session, "Engine") {
            Some(s) => (
                s.track.clone(),
                s.playlist.as_ref().map(|p| p.scope.clone()),
            ),
            None => return,
        };
        let Some(current) = current else {
            log::warn!("[Engine] No current track for playlist traversal");
            return;
        };
        let Some(scope) = scope else {
            log::warn!("[Engine] No playlist scope; cannot query catalog for neighbors");
            return;
        };

        let result = self.rt.block_on(async {
            match step {
                Step::Next => self.catalog.successor(&current.id, &scope).await,
                Step::Previous => self.catalog.predecessor(&current.id, &scope).await,
            }
        });

        match result {
            Ok(next_track) => {
                if self.load_track(next_track.clone(), None) {
                    if let Some(mut s) = safe_lock(&self.session, "Engine") {
                        if let Some(playlist) = s.playlist.as_mut() {
                            match playlist.tracks.iter().position(|t| t.id == next_track.id) {
                                Some(index) => playlist.index = index,
                                None => log::warn!(
                                    "[Engine] Catalog track {} not in local playlist; index unchanged",
                                    next_track.id
                                ),
                            }
                        }
                    }
                }
            }
            Err(e) => {
                log::warn!("[Engine] Neighbor lookup for {} failed: {}", current.id, e);
            }
        }
    }

    /// The periodic position observer. Reads go through the live binding
    /// only, so a torn-down player can never publish into the session.
    fn tick(&mut self) {
        let (position, resolved_duration, ended) = match &self.binding {
            Some(binding) => (
                binding.handle.position(),
                binding.handle.duration(),
                binding.handle.is_finished(),
            ),
            None => return,
        };

        let (event, playing, track, elapsed) = {
            let Some(mut s) = safe_lock(&self.session, "Engine") else {
                return;
            };
            if let Some(d) = resolved_duration {
                if !d.is_zero() && s.duration != d {
                    log::debug!("[Engine] Duration resolved: {:?}", d);
                    s.duration = d;
                }
            }
            if s.playing {
                s.elapsed = if s.duration > Duration::ZERO {
                    position.min(s.duration)
                } else {
                    position
                };
            }
            (
                PlayerEvent::Position {
                    elapsed: s.elapsed,
                    duration: s.duration,
                    playing: s.playing,
                },
                s.playing,
                s.track.clone(),
                s.elapsed,
            )
        };
        self.emit(event);

        if playing {
            self.ticks_since_save += 1;
            if self.ticks_since_save >= SESSION_SAVE_EVERY_TICKS {
                if let Some(track) = &track {
                    self.store.save(track, elapsed);
                }
                self.ticks_since_save = 0;
            }
        }

        if ended && playing {
            self.complete();
        }
    }

    fn complete(&mut self) {
        log::info!("[Engine] End of media reached");
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.finished = true;
        }
        self.emit(PlayerEvent::Completed);

        self.teardown();
        if let Some(mut s) = safe_lock(&self.session, "Engine") {
            s.state = EngineState::Stopped(StopReason::Completed);
        }
        self.emit(PlayerEvent::StateChanged(EngineState::Stopped(
            StopReason::Completed,
        )));

        let has_playlist =
            safe_lock(&self.session, "Engine").is_some_and(|s| s.playlist.is_some());
        if has_playlist {
            self.handle_step(Step::Next);
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // The consumer may be gone; playback keeps going regardless.
        let _ = self.events_tx.send(event);
    }
}

fn remove_staged(path: &PathBuf) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("[Engine] Failed to remove staged manifest {:?}: {}", path, e);
    }
}

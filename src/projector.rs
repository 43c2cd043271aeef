//! Now-playing projection.
//!
//! Mirrors the engine's event stream onto a system now-playing surface and
//! translates remote transport commands and audio session notifications back
//! into engine calls. The projector is the single consumer of the engine's
//! event receiver.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::constants::NOW_PLAYING_ARTIST;
use crate::engine::{EngineState, PlaybackEngine, PlayerEvent};

/// One frame of now-playing metadata, as published to the surface.
#[derive(Debug, Clone)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub elapsed_seconds: f64,
    pub duration_seconds: f64,
    /// 1.0 while playing, 0.0 otherwise.
    pub rate: f32,
    pub artwork: Option<Arc<RgbaImage>>,
}

/// Where now-playing frames land. Real implementations talk to the OS; tests
/// record what they were given.
pub trait NowPlayingSurface: Send {
    fn update(&self, info: &NowPlayingInfo);
}

/// Remote transport commands, as delivered by the system media controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    TogglePlayPause,
    SeekTo(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportOutcome {
    Handled,
    Failed,
}

/// Audio session notifications from the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioSessionEvent {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
    OutputRouteChanged,
}

pub struct NowPlayingProjector {
    engine: Arc<PlaybackEngine>,
    events: Receiver<PlayerEvent>,
    surface: Box<dyn NowPlayingSurface>,
    title: String,
    artwork: Option<Arc<RgbaImage>>,
    elapsed: Duration,
    duration: Duration,
    playing: bool,
}

impl NowPlayingProjector {
    pub fn new(
        engine: Arc<PlaybackEngine>,
        events: Receiver<PlayerEvent>,
        surface: Box<dyn NowPlayingSurface>,
    ) -> Self {
        Self {
            engine,
            events,
            surface,
            title: String::new(),
            artwork: None,
            elapsed: Duration::ZERO,
            duration: Duration::ZERO,
            playing: false,
        }
    }

    /// Installs artwork for the current track, flattened so the surface
    /// never receives transparency.
    pub fn set_artwork(&mut self, artwork: Option<&RgbaImage>) {
        self.artwork = artwork.map(|img| Arc::new(flatten_onto_opaque(img)));
        self.publish();
    }

    /// Drains pending engine events and republishes after each one that
    /// changes what the surface shows. Call this from the app's idle loop.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PlayerEvent::TrackChanged(track) => {
                    self.title = track.title;
                    self.artwork = None;
                    self.elapsed = Duration::ZERO;
                    self.duration = Duration::ZERO;
                    self.publish();
                }
                PlayerEvent::Position {
                    elapsed,
                    duration,
                    playing,
                } => {
                    self.elapsed = elapsed;
                    self.duration = duration;
                    self.playing = playing;
                    self.publish();
                }
                PlayerEvent::StateChanged(state) => {
                    self.playing = state == EngineState::Playing;
                    self.publish();
                }
                PlayerEvent::Completed => {}
            }
        }
    }

    pub fn handle_transport(&mut self, command: TransportCommand) -> TransportOutcome {
        log::debug!("[NowPlaying] Transport command {:?}", command);
        match command {
            TransportCommand::Play => {
                if self.engine.snapshot().playing {
                    return TransportOutcome::Handled;
                }
                match self.engine.resume() {
                    Ok(()) => TransportOutcome::Handled,
                    Err(e) => {
                        log::warn!("[NowPlaying] Play command failed: {}", e);
                        TransportOutcome::Failed
                    }
                }
            }
            TransportCommand::Pause => {
                self.engine.pause();
                TransportOutcome::Handled
            }
            TransportCommand::TogglePlayPause => match self.engine.toggle_play_pause() {
                Ok(()) => TransportOutcome::Handled,
                Err(e) => {
                    log::warn!("[NowPlaying] Toggle command failed: {}", e);
                    TransportOutcome::Failed
                }
            },
            TransportCommand::SeekTo(seconds) => {
                let state = self.engine.snapshot().state;
                if !matches!(state, EngineState::Playing | EngineState::Paused) {
                    log::debug!("[NowPlaying] Ignoring scrub in state {:?}", state);
                    return TransportOutcome::Failed;
                }
                self.engine.seek(seconds);
                TransportOutcome::Handled
            }
        }
    }

    pub fn handle_audio_session(&mut self, event: AudioSessionEvent) {
        match event {
            AudioSessionEvent::InterruptionBegan => {
                if self.engine.snapshot().playing {
                    log::info!("[NowPlaying] Interruption began, pausing");
                    self.engine.pause();
                }
            }
            AudioSessionEvent::InterruptionEnded { should_resume } => {
                if should_resume {
                    if let Err(e) = self.engine.resume() {
                        log::warn!("[NowPlaying] Resume after interruption failed: {}", e);
                    }
                }
            }
            AudioSessionEvent::OutputRouteChanged => {
                self.engine.reassert_route();
            }
        }
    }

    fn publish(&self) {
        let info = NowPlayingInfo {
            title: self.title.clone(),
            artist: NOW_PLAYING_ARTIST.to_string(),
            elapsed_seconds: self.elapsed.as_secs_f64(),
            duration_seconds: self.duration.as_secs_f64(),
            rate: if self.playing { 1.0 } else { 0.0 },
            artwork: self.artwork.clone(),
        };
        self.surface.update(&info);
    }
}

/// Alpha-blends `image` onto a white background. The result is fully opaque.
pub fn flatten_onto_opaque(image: &RgbaImage) -> RgbaImage {
    let mut out = RgbaImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        out.put_pixel(x, y, Rgba([blend(r), blend(g), blend(b), 255]));
    }
    out
}

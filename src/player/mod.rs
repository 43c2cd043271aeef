//! The underlying-player seam.
//!
//! The engine owns exactly one `PlayerHandle` at a time (the "binding") and
//! constructs it through a `PlayerBackend`. Handles never leave the engine
//! worker thread; backends only need to be `Send` so they can move into it.

use std::path::PathBuf;
use std::time::Duration;

use crate::utils::errors::PlaybackError;

pub mod mediaplay;

pub use mediaplay::RodioBackend;

#[cfg(test)]
pub(crate) mod fake;

/// What the engine resolved a track locator into.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// A direct media URL streamed progressively.
    Remote(String),
    /// A locally staged, rewritten manifest.
    StagedManifest(PathBuf),
}

impl MediaSource {
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Remote(url) => url.clone(),
            MediaSource::StagedManifest(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Constructs player handles. One backend serves the whole engine lifetime.
pub trait PlayerBackend: Send {
    fn open(&self, source: &MediaSource) -> Result<Box<dyn PlayerHandle>, PlaybackError>;
}

/// One concrete underlying player bound to one media source.
///
/// `duration()` may return `None` until metadata resolves; the engine polls
/// it from the tick loop, so a handle that has been torn down can never
/// publish a late duration into the session.
pub trait PlayerHandle {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn is_finished(&self) -> bool;
}

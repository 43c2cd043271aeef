//! Scriptable in-process player backend for engine and projector tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{MediaSource, PlayerBackend, PlayerHandle};
use crate::utils::error_handling::safe_lock;
use crate::utils::errors::PlaybackError;

#[derive(Debug, Default)]
pub(crate) struct FakeHandleState {
    pub playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub finished: bool,
    pub play_calls: u32,
    pub stop_calls: u32,
    pub seeks: Vec<Duration>,
}

/// Shared control block: tests reach every handle the backend ever opened,
/// including ones the engine has already torn down.
#[derive(Default)]
pub(crate) struct FakeControl {
    handles: Mutex<Vec<Arc<Mutex<FakeHandleState>>>>,
    opened: Mutex<Vec<MediaSource>>,
    fail_open: AtomicBool,
}

impl FakeControl {
    pub fn opened_count(&self) -> usize {
        safe_lock(&self.opened, "FakeControl").map_or(0, |o| o.len())
    }

    pub fn opened_sources(&self) -> Vec<MediaSource> {
        safe_lock(&self.opened, "FakeControl").map_or_else(Vec::new, |o| o.clone())
    }

    pub fn handle(&self, index: usize) -> Option<Arc<Mutex<FakeHandleState>>> {
        safe_lock(&self.handles, "FakeControl").and_then(|h| h.get(index).cloned())
    }

    pub fn set_duration(&self, index: usize, duration: Duration) {
        if let Some(state) = self.handle(index) {
            if let Some(mut s) = safe_lock(&state, "FakeControl") {
                s.duration = Some(duration);
            }
        }
    }

    pub fn set_position(&self, index: usize, position: Duration) {
        if let Some(state) = self.handle(index) {
            if let Some(mut s) = safe_lock(&state, "FakeControl") {
                s.position = position;
            }
        }
    }

    pub fn set_finished(&self, index: usize) {
        if let Some(state) = self.handle(index) {
            if let Some(mut s) = safe_lock(&state, "FakeControl") {
                s.finished = true;
            }
        }
    }

    pub fn play_calls(&self, index: usize) -> u32 {
        self.handle(index)
            .and_then(|state| safe_lock(&state, "FakeControl").map(|s| s.play_calls))
            .unwrap_or(0)
    }

    pub fn stop_calls(&self, index: usize) -> u32 {
        self.handle(index)
            .and_then(|state| safe_lock(&state, "FakeControl").map(|s| s.stop_calls))
            .unwrap_or(0)
    }

    pub fn seeks(&self, index: usize) -> Vec<Duration> {
        self.handle(index)
            .and_then(|state| safe_lock(&state, "FakeControl").map(|s| s.seeks.clone()))
            .unwrap_or_default()
    }

    pub fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeBackend {
    control: Arc<FakeControl>,
}

impl FakeBackend {
    pub fn new() -> (Self, Arc<FakeControl>) {
        let control = Arc::new(FakeControl::default());
        (
            Self {
                control: Arc::clone(&control),
            },
            control,
        )
    }
}

impl PlayerBackend for FakeBackend {
    fn open(&self, source: &MediaSource) -> Result<Box<dyn PlayerHandle>, PlaybackError> {
        if self.control.fail_open.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::Backend("scripted open failure".into()));
        }
        if let Some(mut opened) = safe_lock(&self.control.opened, "FakeBackend") {
            opened.push(source.clone());
        }
        let state = Arc::new(Mutex::new(FakeHandleState::default()));
        if let Some(mut handles) = safe_lock(&self.control.handles, "FakeBackend") {
            handles.push(Arc::clone(&state));
        }
        Ok(Box::new(FakeHandle { state }))
    }
}

struct FakeHandle {
    state: Arc<Mutex<FakeHandleState>>,
}

impl PlayerHandle for FakeHandle {
    fn play(&mut self) {
        if let Some(mut s) = safe_lock(&self.state, "FakeHandle") {
            s.playing = true;
            s.play_calls += 1;
        }
    }

    fn pause(&mut self) {
        if let Some(mut s) = safe_lock(&self.state, "FakeHandle") {
            s.playing = false;
        }
    }

    fn stop(&mut self) {
        if let Some(mut s) = safe_lock(&self.state, "FakeHandle") {
            s.playing = false;
            s.stop_calls += 1;
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        if let Some(mut s) = safe_lock(&self.state, "FakeHandle") {
            s.position = position;
            s.seeks.push(position);
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        safe_lock(&self.state, "FakeHandle").map_or(Duration::ZERO, |s| s.position)
    }

    fn duration(&self) -> Option<Duration> {
        safe_lock(&self.state, "FakeHandle").and_then(|s| s.duration)
    }

    fn is_finished(&self) -> bool {
        safe_lock(&self.state, "FakeHandle").is_some_and(|s| s.finished)
    }
}

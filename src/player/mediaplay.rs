//! Progressive streaming player on top of rodio.
//!
//! A stream thread fetches media over HTTP (directly, or segment by segment
//! for a staged manifest) and decodes MP3 frames into a channel; a
//! `StreamingSource` drains that channel into the rodio mixer. Position is
//! derived from a start instant plus accumulated pause time, and seeking
//! restarts the stream at an offset the way the engine's single-binding
//! model expects.

use minimp3::{Decoder as Mp3Decoder, Frame};
use rodio::{OutputStream, Sink, Source};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::StreamExt;

use super::{MediaSource, PlayerBackend, PlayerHandle};
use crate::constants::{ESTIMATED_BYTES_PER_SEC, MAX_MEDIA_DURATION_SECS};
use crate::utils::error_handling::{create_runtime, safe_lock};
use crate::utils::errors::PlaybackError;
use crate::utils::http;

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 2;
/// Trim the rolling MP3 buffer above this size, keeping the tail.
const BUFFER_TRIM_THRESHOLD: usize = 5 * 1024 * 1024;
const BUFFER_KEEP_SIZE: usize = 2 * 1024 * 1024;

pub struct RodioBackend;

impl RodioBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerBackend for RodioBackend {
    fn open(&self, source: &MediaSource) -> Result<Box<dyn PlayerHandle>, PlaybackError> {
        AudioPlayer::open(source.clone()).map(|p| Box::new(p) as Box<dyn PlayerHandle>)
    }
}

/// One playing stream. Created and used only on the engine worker thread.
pub struct AudioPlayer {
    sink: Sink,
    _stream: OutputStream,
    stream_handle: rodio::OutputStreamHandle,
    source: MediaSource,
    duration: Arc<Mutex<Option<Duration>>>,
    finished: Arc<Mutex<bool>>,
    start_time: Instant,
    start_position: Duration,
    paused_at: Option<Duration>,
}

impl AudioPlayer {
    fn open(source: MediaSource) -> Result<Self, PlaybackError> {
        log::info!("[AudioPlayer] Opening stream for {}", source.describe());
        let (_stream, stream_handle) =
            OutputStream::try_default().map_err(|e| PlaybackError::Backend(e.to_string()))?;

        let duration = Arc::new(Mutex::new(None));
        let finished = Arc::new(Mutex::new(false));
        let (sample_tx, sample_rx) = channel();
        spawn_stream(
            source.clone(),
            Duration::ZERO,
            sample_tx,
            Arc::clone(&finished),
            Arc::clone(&duration),
        );

        let streaming = StreamingSource::new(sample_rx, SAMPLE_RATE, CHANNELS, Arc::clone(&finished));
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| PlaybackError::Backend(e.to_string()))?;
        sink.append(streaming);
        // Installed paused at zero; the engine issues the first play().
        sink.pause();

        Ok(Self {
            sink,
            _stream,
            stream_handle,
            source,
            duration,
            finished,
            start_time: Instant::now(),
            start_position: Duration::ZERO,
            paused_at: Some(Duration::ZERO),
        })
    }

    fn restart_at(&mut self, position: Duration) -> Result<(), PlaybackError> {
        self.sink.stop();

        let finished = Arc::new(Mutex::new(false));
        let (sample_tx, sample_rx) = channel();
        spawn_stream(
            self.source.clone(),
            position,
            sample_tx,
            Arc::clone(&finished),
            Arc::clone(&self.duration),
        );

        let streaming = StreamingSource::new(sample_rx, SAMPLE_RATE, CHANNELS, Arc::clone(&finished));
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| PlaybackError::Backend(e.to_string()))?;
        sink.append(streaming);

        let was_paused = self.paused_at.is_some();
        if was_paused {
            sink.pause();
            self.paused_at = Some(position);
        } else {
            sink.play();
            self.paused_at = None;
        }

        self.sink = sink;
        self.finished = finished;
        self.start_position = position;
        self.start_time = Instant::now();
        Ok(())
    }
}

impl PlayerHandle for AudioPlayer {
    fn play(&mut self) {
        // Re-issuing play() on an already-running sink must not reset the
        // position clock (route re-assertion relies on this).
        if let Some(paused) = self.paused_at.take() {
            self.start_position = paused;
            self.start_time = Instant::now();
            log::debug!("[AudioPlayer] Starting from {:?}", paused);
        }
        self.sink.play();
    }

    fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(self.position());
            self.sink.pause();
            log::debug!("[AudioPlayer] Paused at {:?}", self.paused_at);
        }
    }

    fn stop(&mut self) {
        log::debug!("[AudioPlayer] Stopping playback");
        // Dropping the sink's source closes the sample channel, which ends
        // the stream thread on its next send.
        self.sink.stop();
        self.paused_at = Some(self.position());
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlaybackError> {
        log::info!("[AudioPlayer] Seeking to {:?} by restarting stream", position);
        self.restart_at(position)
    }

    fn position(&self) -> Duration {
        if let Some(paused) = self.paused_at {
            paused
        } else {
            let mut position = self.start_position.saturating_add(self.start_time.elapsed());
            if let Some(total) = self.duration() {
                position = position.min(total);
            }
            position
        }
    }

    fn duration(&self) -> Option<Duration> {
        safe_lock(&self.duration, "AudioPlayer").and_then(|d| *d)
    }

    fn is_finished(&self) -> bool {
        let stream_done = safe_lock(&self.finished, "AudioPlayer").is_some_and(|f| *f);
        stream_done && self.sink.empty() && self.paused_at.is_none()
    }
}

/// Progressive streaming source that plays MP3 frames as they arrive.
struct StreamingSource {
    sample_rx: Receiver<Vec<i16>>,
    current_samples: Vec<i16>,
    sample_index: usize,
    sample_rate: u32,
    channels: u16,
    finished: Arc<Mutex<bool>>,
    buffering: bool,
    samples_received: usize,
    last_sample_time: Instant,
}

impl StreamingSource {
    fn new(
        sample_rx: Receiver<Vec<i16>>,
        sample_rate: u32,
        channels: u16,
        finished: Arc<Mutex<bool>>,
    ) -> Self {
        Self {
            sample_rx,
            current_samples: Vec::new(),
            sample_index: 0,
            sample_rate,
            channels,
            finished,
            buffering: true,
            samples_received: 0,
            last_sample_time: Instant::now(),
        }
    }
}

impl Iterator for StreamingSource {
    type Item = i16;

    fn next(&mut self) -> Option<Self::Item> {
        if self.sample_index < self.current_samples.len() {
            let sample = self.current_samples[self.sample_index];
            self.sample_index += 1;
            return Some(sample);
        }

        match self.sample_rx.try_recv() {
            Ok(samples) => {
                self.current_samples = samples;
                self.sample_index = 0;
                self.samples_received += self.current_samples.len();
                self.last_sample_time = Instant::now();

                // ~1 second of audio means startup buffering is over.
                if self.buffering && self.samples_received > SAMPLE_RATE as usize {
                    self.buffering = false;
                }

                if !self.current_samples.is_empty() {
                    let sample = self.current_samples[0];
                    self.sample_index = 1;
                    Some(sample)
                } else {
                    None
                }
            }
            Err(_) => {
                let timed_out = self.last_sample_time.elapsed() > Duration::from_secs(5);
                let is_finished =
                    safe_lock(&self.finished, "StreamingSource").is_some_and(|f| *f);

                if is_finished && !self.buffering {
                    None
                } else if timed_out {
                    log::error!("[StreamingSource] Stream timeout detected - ending playback");
                    if let Some(mut f) = safe_lock(&self.finished, "StreamingSource") {
                        *f = true;
                    }
                    None
                } else {
                    // Yield silence while waiting for more data.
                    Some(0)
                }
            }
        }
    }
}

impl Source for StreamingSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

fn spawn_stream(
    source: MediaSource,
    start: Duration,
    sample_tx: Sender<Vec<i16>>,
    finished: Arc<Mutex<bool>>,
    duration_slot: Arc<Mutex<Option<Duration>>>,
) {
    std::thread::spawn(move || {
        let rt = match create_runtime() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("[AudioPlayer] Failed to create stream runtime: {}", e);
                if let Some(mut f) = safe_lock(&finished, "AudioPlayer") {
                    *f = true;
                }
                return;
            }
        };
        rt.block_on(async {
            let result = match &source {
                MediaSource::Remote(url) => {
                    stream_remote(url, start, &sample_tx, &duration_slot).await
                }
                MediaSource::StagedManifest(path) => {
                    stream_manifest(path, start, &sample_tx, &duration_slot).await
                }
            };
            if let Err(e) = result {
                log::error!("[AudioPlayer] Streaming error: {}", e);
            }
        });
        if let Some(mut f) = safe_lock(&finished, "AudioPlayer") {
            *f = true;
        }
    });
}

/// Decodes every complete frame in `buffer` and sends the ones not yet sent.
/// Returns `false` once the receiving sink is gone.
fn decode_new_frames(buffer: &[u8], total_frames_sent: &mut usize, tx: &Sender<Vec<i16>>) -> bool {
    let mut decoder = Mp3Decoder::new(buffer);
    let mut frame_index = 0;
    loop {
        match decoder.next_frame() {
            Ok(Frame { data, .. }) => {
                if frame_index >= *total_frames_sent {
                    if tx.send(data).is_err() {
                        return false;
                    }
                    *total_frames_sent += 1;
                }
                frame_index += 1;
            }
            Err(_) => break,
        }
    }
    true
}

fn trim_buffer(buffer: &mut Vec<u8>, total_frames_sent: &mut usize) {
    if buffer.len() > BUFFER_TRIM_THRESHOLD {
        let trim_amount = buffer.len() - BUFFER_KEEP_SIZE;
        buffer.drain(0..trim_amount);
        *total_frames_sent = 0;
        log::debug!("[AudioPlayer] Trimmed stream buffer to {} KB", buffer.len() / 1024);
    }
}

/// Streams a direct media URL, decoding progressively. A non-zero start is
/// approximated with a byte-offset range request.
async fn stream_remote(
    url: &str,
    start: Duration,
    sample_tx: &Sender<Vec<i16>>,
    duration_slot: &Arc<Mutex<Option<Duration>>>,
) -> Result<(), PlaybackError> {
    let byte_offset = start.as_secs() * ESTIMATED_BYTES_PER_SEC;
    let mut request = http::client().get(url);
    if byte_offset > 0 {
        request = request.header("Range", format!("bytes={}-", byte_offset));
    }
    let response = request
        .send()
        .await
        .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(PlaybackError::Fetch(format!(
            "media request returned status {}",
            response.status()
        )));
    }

    // Bitrate estimate until something better is known.
    if start == Duration::ZERO {
        if let Some(len) = response.content_length() {
            let estimate = Duration::from_secs(len / ESTIMATED_BYTES_PER_SEC);
            if let Some(mut d) = safe_lock(duration_slot, "AudioPlayer") {
                *d = Some(estimate);
            }
        } else {
            log::warn!("[AudioPlayer] No Content-Length header - duration stays unknown");
        }
    }

    let mut mp3_buffer: Vec<u8> = Vec::new();
    let mut total_frames_sent = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| PlaybackError::Fetch(e.to_string()))?;
        mp3_buffer.extend_from_slice(&chunk);
        if !decode_new_frames(&mp3_buffer, &mut total_frames_sent, sample_tx) {
            log::debug!("[AudioPlayer] Playback stopped, ending remote stream");
            return Ok(());
        }
        trim_buffer(&mut mp3_buffer, &mut total_frames_sent);
    }

    decode_new_frames(&mp3_buffer, &mut total_frames_sent, sample_tx);
    log::info!("[AudioPlayer] Remote stream complete");
    Ok(())
}

/// Plays a staged manifest: fetch each absolute segment in order and feed it
/// through the same progressive decoder. Duration is the `#EXTINF` sum, so it
/// resolves as soon as the manifest is read. Seeking skips whole segments.
async fn stream_manifest(
    path: &Path,
    start: Duration,
    sample_tx: &Sender<Vec<i16>>,
    duration_slot: &Arc<Mutex<Option<Duration>>>,
) -> Result<(), PlaybackError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PlaybackError::Write(format!("staged manifest unreadable: {}", e)))?;

    let segments = parse_segments(&content);
    if let Some(mut d) = safe_lock(duration_slot, "AudioPlayer") {
        *d = Some(manifest_duration(&segments));
    }

    let start_secs = start.as_secs_f64();
    let mut cumulative = 0.0;
    let mut mp3_buffer: Vec<u8> = Vec::new();
    let mut total_frames_sent = 0;

    for segment in &segments {
        if cumulative + segment.duration_secs <= start_secs {
            cumulative += segment.duration_secs;
            continue;
        }
        cumulative += segment.duration_secs;

        let response = http::client()
            .get(&segment.url)
            .send()
            .await
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PlaybackError::Fetch(format!(
                "segment {} returned status {}",
                segment.url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Fetch(e.to_string()))?;

        mp3_buffer.extend_from_slice(&bytes);
        if !decode_new_frames(&mp3_buffer, &mut total_frames_sent, sample_tx) {
            log::debug!("[AudioPlayer] Playback stopped, ending manifest stream");
            return Ok(());
        }
        trim_buffer(&mut mp3_buffer, &mut total_frames_sent);
    }

    decode_new_frames(&mp3_buffer, &mut total_frames_sent, sample_tx);
    log::info!("[AudioPlayer] Manifest stream complete ({} segments)", segments.len());
    Ok(())
}

struct Segment {
    duration_secs: f64,
    url: String,
}

fn parse_segments(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut pending_duration = 0.0;
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("#EXTINF:") {
            // Manifest content is untrusted; a non-finite or negative tag
            // value counts as unknown.
            pending_duration = rest
                .split(',')
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d >= 0.0)
                .unwrap_or(0.0);
        } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
            segments.push(Segment {
                duration_secs: pending_duration,
                url: trimmed.to_string(),
            });
            pending_duration = 0.0;
        }
    }
    segments
}

/// Total play time of a segment list, capped so a hostile manifest whose
/// durations sum past the f64 range cannot panic `Duration` construction.
fn manifest_duration(segments: &[Segment]) -> Duration {
    let total: f64 = segments.iter().map(|s| s.duration_secs).sum();
    Duration::from_secs_f64(total.min(MAX_MEDIA_DURATION_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments_with_durations() {
        let manifest = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.6,\nhttps://h/a.ts\n#EXTINF:4.2,\nhttps://h/b.ts\n#EXT-X-ENDLIST\n";
        let segments = parse_segments(manifest);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].url, "https://h/a.ts");
        assert_eq!(segments[0].duration_secs, 9.6);
        assert_eq!(segments[1].duration_secs, 4.2);
    }

    #[test]
    fn segment_without_extinf_gets_zero_duration() {
        let segments = parse_segments("#EXTM3U\nhttps://h/a.ts\n");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].duration_secs, 0.0);
    }

    #[test]
    fn hostile_extinf_values_are_treated_as_unknown() {
        let manifest = "#EXTINF:inf,\nhttps://h/a.ts\n#EXTINF:-5,\nhttps://h/b.ts\n#EXTINF:nan,\nhttps://h/c.ts\n";
        let segments = parse_segments(manifest);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.duration_secs == 0.0));
    }

    #[test]
    fn manifest_duration_is_capped_against_overflow() {
        let manifest = "#EXTINF:1e308,\nhttps://h/a.ts\n#EXTINF:1e308,\nhttps://h/b.ts\n";
        let segments = parse_segments(manifest);
        let total = manifest_duration(&segments);
        assert_eq!(total, Duration::from_secs_f64(MAX_MEDIA_DURATION_SECS));
    }
}

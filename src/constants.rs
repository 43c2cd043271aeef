//! Application constants and configuration values

// === App identity ===
pub const APP_NAME: &str = "LyricWave";

// === Audio Playback ===
/// Worker tick interval; also the now-playing refresh cadence.
pub const TICK_INTERVAL_MILLIS: u64 = 100;
/// Persist (track, position) every this many ticks while playing.
pub const SESSION_SAVE_EVERY_TICKS: u32 = 10;
/// Rough MP3 byte rate used for seek offset estimation (128 kbps).
pub const ESTIMATED_BYTES_PER_SEC: u64 = 16_000;
/// Cap for durations and seek targets derived from external input (one week).
pub const MAX_MEDIA_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;

// === Manifests ===
pub const MANIFEST_SUFFIX: &str = ".m3u8";
pub const SEGMENT_SUFFIX: &str = ".ts";

// === Now Playing ===
/// Fixed artist label shown on the external now-playing surface.
pub const NOW_PLAYING_ARTIST: &str = "LyricWave";

// === Persistence ===
/// Fixed process-wide key for the resumable session row.
pub const SESSION_KEY: &str = "last_session";

// === HTTP ===
pub const HTTP_TIMEOUT_SECS: u64 = 30;

//! Session persistence. The engine saves the current track and position
//! periodically and on pause/stop; `resume()` reads it back after a restart.
//! Storage failures are logged and swallowed, playback never depends on them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection};

use crate::constants::{APP_NAME, MAX_MEDIA_DURATION_SECS, SESSION_KEY};
use crate::models::Track;
use crate::utils::error_handling::safe_lock;

pub trait SessionStore: Send + Sync {
    fn save(&self, track: &Track, position: Duration);
    fn load(&self) -> Option<(Track, Duration)>;
}

/// SQLite-backed store, one row keyed by `SESSION_KEY`.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS playback_session (
                key TEXT PRIMARY KEY,
                track_json TEXT NOT NULL,
                position_secs REAL NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens the store at the platform data directory, creating it on first
    /// run. Returns `None` (logged) when no data directory is available.
    pub fn open_default() -> Option<Self> {
        let dir = match dirs::data_dir() {
            Some(base) => base.join(APP_NAME.to_lowercase()),
            None => {
                log::error!("[Persistence] No platform data directory available");
                return None;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::error!("[Persistence] Failed to create {:?}: {}", dir, e);
            return None;
        }
        let path: PathBuf = dir.join("session.db");
        match Self::open(&path) {
            Ok(store) => {
                log::info!("[Persistence] Session store at {:?}", path);
                Some(store)
            }
            Err(e) => {
                log::error!("[Persistence] Failed to open {:?}: {}", path, e);
                None
            }
        }
    }
}

impl SessionStore for SqliteSessionStore {
    fn save(&self, track: &Track, position: Duration) {
        let track_json = match serde_json::to_string(track) {
            Ok(json) => json,
            Err(e) => {
                log::error!("[Persistence] Failed to serialize track {}: {}", track.id, e);
                return;
            }
        };
        let Some(conn) = safe_lock(&self.conn, "Persistence") else {
            return;
        };
        let result = conn.execute(
            "INSERT OR REPLACE INTO playback_session (key, track_json, position_secs)
             VALUES (?1, ?2, ?3)",
            params![SESSION_KEY, track_json, position.as_secs_f64()],
        );
        if let Err(e) = result {
            log::error!("[Persistence] Failed to save session: {}", e);
        }
    }

    fn load(&self) -> Option<(Track, Duration)> {
        let conn = safe_lock(&self.conn, "Persistence")?;
        let row: Result<(String, f64), _> = conn.query_row(
            "SELECT track_json, position_secs FROM playback_session WHERE key = ?1",
            params![SESSION_KEY],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );
        let (track_json, position_secs) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return None,
            Err(e) => {
                log::error!("[Persistence] Failed to load session: {}", e);
                return None;
            }
        };
        // The stored float is untrusted; a non-finite value would panic
        // Duration construction.
        if !position_secs.is_finite() {
            log::error!(
                "[Persistence] Saved position {} is not usable, discarding session",
                position_secs
            );
            return None;
        }
        let position = Duration::from_secs_f64(position_secs.clamp(0.0, MAX_MEDIA_DURATION_SECS));
        match serde_json::from_str::<Track>(&track_json) {
            Ok(track) => Some((track, position)),
            Err(e) => {
                log::error!("[Persistence] Saved session is unreadable: {}", e);
                None
            }
        }
    }
}

/// In-memory store for tests and for running without a data directory.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<(Track, Duration)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, track: &Track, position: Duration) {
        if let Some(mut slot) = safe_lock(&self.slot, "Persistence") {
            *slot = Some((track.clone(), position));
        }
    }

    fn load(&self) -> Option<(Track, Duration)> {
        safe_lock(&self.slot, "Persistence").and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        Track {
            id: "trk-1".into(),
            title: "First Light".into(),
            media_url: "https://media.example.com/trk-1.mp3".into(),
            lyrics: "la la la".into(),
            artwork_url: None,
            lyrics_offset: 0.5,
            timestamps: vec![0.0, 4.2],
        }
    }

    #[test]
    fn sqlite_round_trips_track_and_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::open(&dir.path().join("session.db")).unwrap();
        assert!(store.load().is_none());

        store.save(&sample_track(), Duration::from_secs_f64(12.75));
        let (track, position) = store.load().unwrap();
        assert_eq!(track, sample_track());
        assert!((position.as_secs_f64() - 12.75).abs() < 1e-9);
    }

    #[test]
    fn sqlite_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::open(&dir.path().join("session.db")).unwrap();

        store.save(&sample_track(), Duration::from_secs(10));
        let mut other = sample_track();
        other.id = "trk-2".into();
        store.save(&other, Duration::from_secs(3));

        let (track, position) = store.load().unwrap();
        assert_eq!(track.id, "trk-2");
        assert_eq!(position, Duration::from_secs(3));
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");
        {
            let store = SqliteSessionStore::open(&path).unwrap();
            store.save(&sample_track(), Duration::from_secs(7));
        }
        let store = SqliteSessionStore::open(&path).unwrap();
        let (track, position) = store.load().unwrap();
        assert_eq!(track.id, "trk-1");
        assert_eq!(position, Duration::from_secs(7));
    }

    #[test]
    fn sqlite_rejects_non_finite_and_caps_huge_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteSessionStore::open(&dir.path().join("session.db")).unwrap();
        let track_json = serde_json::to_string(&sample_track()).unwrap();

        let write = |position: f64| {
            store
                .conn
                .lock()
                .unwrap()
                .execute(
                    "INSERT OR REPLACE INTO playback_session (key, track_json, position_secs)
                     VALUES (?1, ?2, ?3)",
                    params![SESSION_KEY, track_json, position],
                )
                .unwrap();
        };

        write(f64::INFINITY);
        assert!(store.load().is_none());

        write(1e300);
        let (_, position) = store.load().unwrap();
        assert_eq!(position, Duration::from_secs_f64(MAX_MEDIA_DURATION_SECS));

        write(-10.0);
        let (_, position) = store.load().unwrap();
        assert_eq!(position, Duration::ZERO);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySessionStore::new();
        assert!(store.load().is_none());
        store.save(&sample_track(), Duration::from_secs(2));
        let (track, position) = store.load().unwrap();
        assert_eq!(track.id, "trk-1");
        assert_eq!(position, Duration::from_secs(2));
    }
}

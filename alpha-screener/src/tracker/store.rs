//! Tracker state persistence.
//!
//! One writer per run; the state is loaded at the start and saved once at
//! the end.

use alpha_common::error::{Error, Result, ResultExt};
use alpha_common::util::{read_json_opt, write_json_atomic};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::TrackerState;

/// Cross-run tracker persistence.
pub trait TrackerStore: Send + Sync {
    /// Load the state, or an empty state on first run.
    fn load(&self) -> Result<TrackerState>;

    /// Replace the stored state.
    fn save(&self, state: &TrackerState) -> Result<()>;
}

// ============================================================================
// JSON file
// ============================================================================

/// Single JSON document, written with write-temp-then-rename.
#[derive(Debug, Clone)]
pub struct JsonFileTrackerStore {
    path: PathBuf,
}

impl JsonFileTrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrackerStore for JsonFileTrackerStore {
    fn load(&self) -> Result<TrackerState> {
        let state = read_json_opt(&self.path)?;
        if state.is_none() {
            info!(path = %self.path.display(), "Tracker state not found, starting fresh");
        }
        Ok(state.unwrap_or_default())
    }

    fn save(&self, state: &TrackerState) -> Result<()> {
        write_json_atomic(&self.path, state)?;
        debug!(path = %self.path.display(), top3 = ?state.top3, "Tracker state saved");
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

const STATE_KEY: &str = "tracker";

/// Single-row keyed table in SQLite.
pub struct SqliteTrackerStore {
    conn: Mutex<Connection>,
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

impl SqliteTrackerStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context(format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path).map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!(path = %path.display(), "Tracker store opened");
        Ok(store)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("tracker connection lock poisoned".into()))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracker_state (
                key TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(storage_err)
    }
}

impl TrackerStore for SqliteTrackerStore {
    fn load(&self) -> Result<TrackerState> {
        let conn = self.connection()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT state_json FROM tracker_state WHERE key = ?1",
                params![STATE_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(Error::from)
                .context("Failed to decode tracker state"),
            None => Ok(TrackerState::default()),
        }
    }

    fn save(&self, state: &TrackerState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO tracker_state (key, state_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at
            "#,
            params![STATE_KEY, json, Utc::now().to_rfc3339()],
        )
        .map_err(storage_err)?;

        debug!(top3 = ?state.top3, "Tracker state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> TrackerState {
        TrackerState {
            top3: vec!["NVDA".into(), "AMD".into(), "AVGO".into()],
            ..TrackerState::default()
        }
    }

    #[test]
    fn test_json_store_roundtrip_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileTrackerStore::new(dir.path().join("tracker.json"));

        assert_eq!(store.load().unwrap(), TrackerState::default());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap(), sample_state());
    }

    #[test]
    fn test_sqlite_store_upserts_single_row() {
        let store = SqliteTrackerStore::in_memory().unwrap();
        assert_eq!(store.load().unwrap(), TrackerState::default());

        store.save(&sample_state()).unwrap();
        let mut next = sample_state();
        next.top3.reverse();
        store.save(&next).unwrap();

        assert_eq!(store.load().unwrap(), next);
        let rows: i64 = store
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM tracker_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_sqlite_store_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tracker.db");
        {
            let store = SqliteTrackerStore::open(&path).unwrap();
            store.save(&sample_state()).unwrap();
        }
        let reopened = SqliteTrackerStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), sample_state());
    }
}

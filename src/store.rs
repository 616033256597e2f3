use crate::app_dirs::AppDirs;
use crate::game::BEST_TIME_KEY;
use crate::runtime::GameEvent;
use chrono::Local;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed value for key {key}: {value:?}")]
    Malformed { key: String, value: String },
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Minimal key-value surface the game persists through. Values are the
/// textual/JSON encoding of a single scalar per key.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Durable backend: a tiny sqlite table keyed by name.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS best_times (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(SqliteStore { conn })
    }

    pub fn open_default() -> Result<Self, StoreError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("blink_best.db"));
        Self::open(path)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM best_times WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(value) => Ok(Some(value?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO best_times (key, value, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, saved_at = excluded.saved_at
            "#,
            params![key, value, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Fallback backend when sqlite is unavailable: a flat JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn open_default() -> Self {
        let path =
            AppDirs::fallback_store_path().unwrap_or_else(|| PathBuf::from("blink_best.json"));
        Self::new(path)
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(map) = serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                return map;
            }
        }
        BTreeMap::new()
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&map)?)?;
        Ok(())
    }
}

/// Pick a backend once at startup. Durable sqlite when it opens, the JSON
/// fallback otherwise; the choice is invisible to the game.
pub fn open_default(force_fallback: bool) -> Box<dyn KeyValueStore> {
    if !force_fallback {
        if let Ok(store) = SqliteStore::open_default() {
            return Box::new(store);
        }
    }
    Box::new(JsonFileStore::open_default())
}

/// Best-time accessor over any backend. The stored value is the latency in
/// whole milliseconds, round-tripped through JSON.
pub struct BestTimeStore {
    inner: Box<dyn KeyValueStore>,
}

impl BestTimeStore {
    pub fn new(inner: Box<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn load_best(&self) -> Result<Option<u64>, StoreError> {
        match self.inner.get(BEST_TIME_KEY)? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<u64>(&raw) {
                Ok(ms) => Ok(Some(ms)),
                Err(_) => Err(StoreError::Malformed {
                    key: BEST_TIME_KEY.to_string(),
                    value: raw,
                }),
            },
        }
    }

    pub fn save_best(&mut self, ms: u64) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&ms)?;
        self.inner.set(BEST_TIME_KEY, &encoded)
    }
}

/// Fire-and-forget persistence worker. Hydration runs here and is delivered
/// back to the event loop as `GameEvent::BestLoaded`; saves are queued and
/// never block or gate a state transition. A failed read degrades to "no
/// best recorded", a failed write is dropped.
pub struct Persister {
    tx: Sender<u64>,
    handle: JoinHandle<()>,
}

impl Persister {
    pub fn spawn(mut store: BestTimeStore, events: Sender<GameEvent>) -> Self {
        let (tx, rx) = mpsc::channel::<u64>();

        let handle = thread::spawn(move || {
            let loaded = store.load_best().unwrap_or(None);
            let _ = events.send(GameEvent::BestLoaded(loaded));

            while let Ok(ms) = rx.recv() {
                let _ = store.save_best(ms);
            }
        });

        Self { tx, handle }
    }

    pub fn save(&self, ms: u64) {
        let _ = self.tx.send(ms);
    }

    /// Drain queued saves and stop the worker. Called on app teardown.
    pub fn shutdown(self) {
        drop(self.tx);
        let _ = self.handle.join();
    }
}

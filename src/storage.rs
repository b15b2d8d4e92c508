// Key-value persistence backends for record snapshots

use crate::record::Record;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key the member collection is stored under
pub const STORAGE_KEY: &str = "member-records";

/// Snapshot format version written by this crate
pub const SNAPSHOT_VERSION: u32 = 0;

/// Persistence surface the store writes snapshots through
pub trait Storage {
    /// Read the serialized snapshot under `key`, `None` if never written
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the snapshot under `key`
    fn write(&mut self, key: &str, snapshot: &str) -> Result<()>;
}

/// Full serialized collection: `{"state":{"members":[...]},"version":0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SnapshotState,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub members: Vec<Record>,
}

impl Snapshot {
    pub fn new(members: Vec<Record>) -> Self {
        Self {
            state: SnapshotState { members },
            version: SNAPSHOT_VERSION,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize snapshot")
    }

    /// Parse a snapshot, decoding each member on its own
    ///
    /// Only a malformed envelope fails the whole parse. A `null` field value
    /// reads as absent; any other member that is not a record comes back as
    /// its own error.
    pub fn parse_members(json: &str) -> Result<Vec<Result<Record>>> {
        let raw: RawSnapshot = serde_json::from_str(json).context("Failed to parse snapshot")?;
        Ok(raw.state.members.into_iter().map(member_from_value).collect())
    }
}

/// Snapshot envelope with members left undecoded
#[derive(Deserialize)]
struct RawSnapshot {
    state: RawState,
}

#[derive(Deserialize)]
struct RawState {
    members: Vec<serde_json::Value>,
}

fn member_from_value(mut value: serde_json::Value) -> Result<Record> {
    if let Some(object) = value.as_object_mut() {
        object.retain(|_, v| !v.is_null());
    }
    serde_json::from_value(value).context("Invalid member record")
}

/// Process-local storage, lost on exit
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, snapshot: &str) -> Result<()> {
        self.entries.insert(key.to_string(), snapshot.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Some(content))
    }

    fn write(&mut self, key: &str, snapshot: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = self.dir.join(format!(".{}.json.tmp", key));
        let lock_path = self.dir.join(format!(".{}.lock", key));

        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("Failed to open snapshot lock file")?;

        // Writers share the temp file, so hold the lock until the rename
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        let mut file = fs::File::create(&tmp_path).with_context(|| format!("Failed to create {:?}", tmp_path))?;
        file.write_all(snapshot.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to replace {:?}", path))?;

        debug!(path = ?path, bytes = snapshot.len(), "Wrote snapshot file");
        // Lock is released when `lock` is dropped
        Ok(())
    }
}

/// Snapshots kept in a SQLite table
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }
        let db = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating snapshot schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { db })
    }
}

impl Storage for SqliteStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let value = self
            .db
            .query_row("SELECT value FROM snapshots WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write(&mut self, key: &str, snapshot: &str) -> Result<()> {
        validate_key(key)?;
        self.db.execute(
            "INSERT OR REPLACE INTO snapshots (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, snapshot, now_ms()],
        )?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Storage key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Storage key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid storage key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

// Helper function for timestamps
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

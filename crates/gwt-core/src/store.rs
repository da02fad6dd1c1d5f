//! Durable storage for the three JSON records.
//!
//! A store only moves bytes: it knows where a record lives, whether it is
//! there, and whether it parses as JSON. Interpreting the value is left to the
//! record types.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde_json::Value;

use crate::{errors::Error, Result};

/// The records kept in the state directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Record {
    Config,
    VerifiedChats,
    ChatsProjects,
}

impl Record {
    pub fn file_name(self) -> &'static str {
        match self {
            Record::Config => "config.json",
            Record::VerifiedChats => "verified_chats.json",
            Record::ChatsProjects => "chats_projects.json",
        }
    }
}

/// Storage port for the state records.
///
/// `load` returns `Ok(None)` when the record does not exist yet, and
/// `Err(Error::MalformedState { .. })` when it exists but is not valid JSON.
pub trait StateStore: Send + Sync {
    fn load(&self, record: Record) -> Result<Option<Value>>;
    fn save(&self, record: Record, value: &Value) -> Result<()>;

    /// Human-readable location of a record, used in diagnostics.
    fn location(&self, record: Record) -> PathBuf;
}

/// Store backed by one directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, record: Record) -> PathBuf {
        self.dir.join(record.file_name())
    }
}

impl StateStore for FileStore {
    fn load(&self, record: Record) -> Result<Option<Value>> {
        let path = self.path(record);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let value = serde_json::from_slice(&raw)
            .map_err(|source| Error::MalformedState { path, source })?;
        Ok(Some(value))
    }

    fn save(&self, record: Record, value: &Value) -> Result<()> {
        let path = self.path(record);
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes).map_err(|source| Error::Persist { path, source })
    }

    fn location(&self, record: Record) -> PathBuf {
        self.path(record)
    }
}

/// Write-to-temp-then-rename so readers never observe a half-written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    // Make the rename itself durable.
    if let Some(parent) = parent {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

/// In-memory store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Record, Value>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, record: Record, value: Value) -> Self {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record, value);
        self
    }

    pub fn get(&self, record: Record) -> Option<Value> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&record)
            .cloned()
    }

    /// Make every following `save` fail, to exercise persist errors.
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

impl StateStore for MemoryStore {
    fn load(&self, record: Record) -> Result<Option<Value>> {
        Ok(self.get(record))
    }

    fn save(&self, record: Record, value: &Value) -> Result<()> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(Error::Persist {
                path: self.location(record),
                source: io::Error::other("saves disabled"),
            });
        }
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record, value.clone());
        Ok(())
    }

    fn location(&self, record: Record) -> PathBuf {
        PathBuf::from("memory").join(record.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_absent_not_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load(Record::VerifiedChats).unwrap().is_none());
        assert!(store.load(Record::Config).unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_reported_distinctly() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("chats_projects.json"), "{not json").unwrap();
        let store = FileStore::new(dir.path());

        match store.load(Record::ChatsProjects) {
            Err(Error::MalformedState { path, .. }) => {
                assert!(path.ends_with("chats_projects.json"));
            }
            other => panic!("expected MalformedState, got {other:?}"),
        }
    }

    #[test]
    fn save_replaces_content_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.save(Record::VerifiedChats, &json!([1, 2, 3])).unwrap();
        store.save(Record::VerifiedChats, &json!([4])).unwrap();

        assert_eq!(store.load(Record::VerifiedChats).unwrap(), Some(json!([4])));
        assert!(!dir.path().join("verified_chats.json.tmp").exists());
    }

    #[test]
    fn save_creates_the_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("gwt");
        let store = FileStore::new(&nested);

        store.save(Record::ChatsProjects, &json!({})).unwrap();
        assert!(nested.join("chats_projects.json").is_file());
    }

    #[test]
    fn save_into_unwritable_location_is_a_persist_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a dir").unwrap();
        let store = FileStore::new(&blocker);

        let err = store.save(Record::VerifiedChats, &json!([])).unwrap_err();
        assert!(matches!(err, Error::Persist { .. }), "got {err:?}");
        assert!(!err.is_fatal());
    }

    #[test]
    fn memory_store_can_refuse_saves() {
        let store = MemoryStore::new().with(Record::VerifiedChats, json!([7]));
        store.set_fail_saves(true);
        assert!(store.save(Record::VerifiedChats, &json!([8])).is_err());
        assert_eq!(store.get(Record::VerifiedChats), Some(json!([7])));
    }
}

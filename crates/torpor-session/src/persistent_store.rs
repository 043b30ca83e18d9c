//! Persistent store adapter for passivated records.
//!
//! A [`PersistentStore`] holds serialized values keyed by identity key.
//! `write` must be durable before it returns: the passivation policy removes
//! the in-memory copy only after a successful write.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::key::StoreKey;

/// File extension of passivated records.
const RECORD_EXTENSION: &str = "passivated";

/// Durable overflow store for passivated entries.
#[async_trait]
pub trait PersistentStore<K: StoreKey>: Send + Sync {
    /// Durably store `bytes` under `key`, replacing any previous record.
    async fn write(&self, key: &K, bytes: Vec<u8>) -> Result<()>;

    /// Read the record for `key`.
    async fn read(&self, key: &K) -> Result<Option<Vec<u8>>>;

    /// Delete the record for `key`. Returns whether a record existed.
    async fn delete(&self, key: &K) -> Result<bool>;

    /// Whether a record exists for `key`.
    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.read(key).await?.is_some())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem store
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-backed persistent store.
///
/// Layout: `{dir}/{hex(sha256(storage_name))}.passivated`, one file per key.
/// File names have a fixed length whatever the key; the key itself is read
/// back from the record envelope.
///
/// Records are written to a temporary file in the same directory, synced,
/// then renamed over the target, so a duplicate write replaces the record
/// atomically and a crash never leaves a torn file behind.
#[derive(Debug, Clone)]
pub struct FilePersistentStore {
    dir: PathBuf,
}

impl FilePersistentStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::persistent(&dir.display(), e))?;
        debug!(dir = %dir.display(), "Opened persistent store");
        Ok(Self { dir })
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for a storage name.
    pub fn record_path(&self, storage_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", sha256_hex(storage_name)))
    }

    /// Storage names of all stored records, sorted.
    ///
    /// Records whose envelope cannot be read are skipped.
    pub fn names(&self) -> Result<Vec<String>> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| Error::persistent(&self.dir.display(), e))?;
        let mut names = Vec::new();
        for entry in read_dir {
            let path = entry
                .map_err(|e| Error::persistent(&self.dir.display(), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            // Restored or purged since listing
            let Some(bytes) =
                read_file(&path).map_err(|e| Error::persistent(&path.display(), e))?
            else {
                continue;
            };
            match serde_json::from_slice::<RecordKey>(&bytes) {
                Ok(record) if self.record_path(&record.key) == path => names.push(record.key),
                Ok(record) => {
                    warn!(
                        path = %path.display(),
                        key = %record.key,
                        "Record stored under another key's name"
                    );
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Unreadable record skipped"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.names()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read a record by storage name.
    pub fn read_named(&self, storage_name: &str) -> Result<Option<Vec<u8>>> {
        read_file(&self.record_path(storage_name)).map_err(|e| Error::persistent(&storage_name, e))
    }

    /// Delete a record by storage name.
    pub fn delete_named(&self, storage_name: &str) -> Result<bool> {
        delete_file(&self.record_path(storage_name))
            .map_err(|e| Error::persistent(&storage_name, e))
    }
}

/// The only envelope field needed to name a record.
#[derive(Deserialize)]
struct RecordKey {
    key: String,
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn read_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn delete_file(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Run blocking file I/O off the async runtime.
async fn blocking<T, F>(key: String, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| Error::persistent(&key, e)),
        Err(join) => Err(Error::persistent(&key, io::Error::other(join))),
    }
}

#[async_trait]
impl<K: StoreKey> PersistentStore<K> for FilePersistentStore {
    async fn write(&self, key: &K, bytes: Vec<u8>) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.record_path(&key.storage_name());
        let len = bytes.len();
        blocking(key.to_string(), move || write_atomic(&dir, &path, &bytes)).await?;
        trace!(key = %key, bytes = len, "Record written");
        Ok(())
    }

    async fn read(&self, key: &K) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(&key.storage_name());
        blocking(key.to_string(), move || read_file(&path)).await
    }

    async fn delete(&self, key: &K) -> Result<bool> {
        let path = self.record_path(&key.storage_name());
        blocking(key.to_string(), move || delete_file(&path)).await
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        let path = self.record_path(&key.storage_name());
        blocking(key.to_string(), move || Ok(path.is_file())).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent store held in memory. Not durable across process restarts.
#[derive(Debug)]
pub struct MemoryPersistentStore<K: StoreKey> {
    records: Mutex<HashMap<K, Vec<u8>>>,
}

impl<K: StoreKey> Default for MemoryPersistentStore<K> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: StoreKey> MemoryPersistentStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Keys with a stored record.
    pub fn keys(&self) -> Vec<K> {
        self.records.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl<K: StoreKey> PersistentStore<K> for MemoryPersistentStore<K> {
    async fn write(&self, key: &K, bytes: Vec<u8>) -> Result<()> {
        self.records.lock().insert(key.clone(), bytes);
        Ok(())
    }

    async fn read(&self, key: &K) -> Result<Option<Vec<u8>>> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn delete(&self, key: &K) -> Result<bool> {
        Ok(self.records.lock().remove(key).is_some())
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.records.lock().contains_key(key))
    }
}

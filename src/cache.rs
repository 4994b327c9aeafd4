//! TTL response cache for idempotent remote reads.
//!
//! Adapters hit rate-limited REST APIs; repeated reads of the same resource
//! within one TTL window are answered from a local key→bytes store instead.
//!
//! # Expiry
//!
//! Expiry is lazy: an entry older than the TTL is treated as absent on the
//! next [`ResponseCache::get`] and physically removed at that moment. There
//! is no background sweep.
//!
//! # Keys
//!
//! [`CacheKey`] is the SHA-256 of the length-prefixed request parts, so two
//! logically distinct requests cannot collide by concatenation. The logical
//! request is also stored inside each entry and checked on read.
//!
//! # Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`FileStore`] | One JSON file per entry under a cache directory |
//! | [`MemoryStore`] | `RwLock<HashMap>`, process-lifetime only |
//!
//! The cache is best-effort: failed writes are logged and swallowed, and a
//! get/set race between two concurrent callers at worst causes a duplicate
//! fetch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

const ENTRY_EXT: &str = "json";
const TMP_MARKER: &str = ".tmp-";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Source of "now" for expiry decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Content-addressed key for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    logical: String,
    digest: String,
}

impl CacheKey {
    /// Derive a key from the parts of a request (platform, URL, parameters...).
    pub fn new<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        let mut logical = String::new();
        for (i, part) in parts.iter().enumerate() {
            let part = part.as_ref();
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
            if i > 0 {
                logical.push(' ');
            }
            logical.push_str(part);
        }
        Self {
            logical,
            digest: hex::encode(hasher.finalize()),
        }
    }

    /// Hex SHA-256 digest; safe to use as a file name.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Human-readable form of the request this key was derived from.
    pub fn logical(&self) -> &str {
        &self.logical
    }
}

/// A stored value together with its key and the time it was written.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: serde_json::Value,
    stored_at: DateTime<Utc>,
}

/// Persistent key→bytes store backing a [`ResponseCache`].
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    /// Number of entries currently stored, expired or not.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Directory-backed store: one `<digest>.json` file per entry.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        self.files_matching(|path| path.extension().is_some_and(|ext| ext == ENTRY_EXT))
    }

    /// Half-written entries left behind by a `set` that failed before rename.
    fn orphaned_tmp_files(&self) -> Result<Vec<PathBuf>> {
        self.files_matching(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(TMP_MARKER))
        })
    }

    fn files_matching(&self, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && keep(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        // Write-then-rename so concurrent readers never see a torn entry.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!("{key}{TMP_MARKER}{}-{seq}", std::process::id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.entry_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        let mut files = self.entry_files()?;
        files.extend(self.orphaned_tmp_files()?);
        for path in files {
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = %path.display(), error = %e, "failed to remove cache entry");
            }
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entry_files()?.len())
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("cache lock poisoned")
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }
}

/// TTL cache over any [`CacheStore`]. Safe to share across tasks.
pub struct ResponseCache {
    store: Box<dyn CacheStore>,
    ttl: Duration,
    clock: Clock,
}

impl ResponseCache {
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (used by tests to step time forward).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, if present and not expired.
    ///
    /// Expired or unreadable entries are removed from the store.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.store.get(key.digest()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                debug!(key = key.logical(), error = %e, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key = key.logical(), error = %e, "discarding corrupt cache entry");
                self.discard(key);
                return None;
            }
        };

        if entry.key != key.logical() {
            return None;
        }

        if self.is_expired(entry.stored_at) {
            debug!(key = key.logical(), "cache entry expired");
            self.discard(key);
            return None;
        }

        serde_json::from_value(entry.value).ok()
    }

    /// Store `value` under `key`, overwriting any previous entry.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                debug!(key = key.logical(), error = %e, "value not cacheable");
                return;
            }
        };
        let entry = CacheEntry {
            key: key.logical().to_string(),
            value,
            stored_at: (self.clock)(),
        };
        let result = serde_json::to_vec(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| self.store.set(key.digest(), &bytes));
        if let Err(e) = result {
            debug!(key = key.logical(), error = %e, "cache write failed");
        }
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    /// Number of entries in the backing store, including expired ones not yet
    /// touched.
    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        let age = (self.clock)().signed_duration_since(stored_at);
        match age.to_std() {
            Ok(age) => age > self.ttl,
            // Stored in the future (clock skew): treat as fresh.
            Err(_) => false,
        }
    }

    fn discard(&self, key: &CacheKey) {
        if let Err(e) = self.store.remove(key.digest()) {
            debug!(key = key.logical(), error = %e, "failed to remove cache entry");
        }
    }
}

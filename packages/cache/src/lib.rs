#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw payload cache, one entry per source id.
//!
//! Each source owns a directory under the cache root:
//!
//! ```text
//! {root}/{source_id}/payload.bin   raw bytes as fetched
//! {root}/{source_id}/entry.json    source_id, fetched_at, length, SHA-256
//! ```
//!
//! `entry.json` is the commit point. The payload is written to a temporary
//! file and renamed first, then the entry is written the same way. A payload
//! that does not match its entry's length and hash is treated as a miss, so
//! a torn write is never served.
//!
//! Cache failures never fail a fetch: an unreadable entry is a miss, and an
//! entry that cannot be written is reported and the fresh payload returned
//! anyway.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use parking_map_parking_models::report::ReportSink;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seconds an entry stays fresh (7 days).
pub const DEFAULT_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const PAYLOAD_FILE: &str = "payload.bin";
const ENTRY_FILE: &str = "entry.json";

/// Errors from the cache's own storage operations.
///
/// [`CacheStore::get_or_fetch`] never returns these; they are turned into
/// misses or warnings.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `entry.json` is not valid.
    #[error("Cache entry parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload does not match its entry.
    #[error("Corrupted cache entry for '{source_id}': {reason}")]
    Corrupted {
        /// Source whose entry is corrupted.
        source_id: String,
        /// What did not match.
        reason: String,
    },

    /// The source id cannot be used as a directory name.
    #[error("Invalid source id for cache: '{0}'")]
    InvalidSourceId(String),
}

/// Clock used to timestamp and age entries.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Metadata stored next to a cached payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Source the payload belongs to.
    pub source_id: String,
    /// When the payload was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Payload size in bytes.
    pub payload_len: u64,
    /// Hex SHA-256 of the payload.
    pub payload_sha256: String,
}

/// Why a payload came from where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a fresh entry; no fetch happened.
    Hit,
    /// No entry existed.
    Miss,
    /// The entry was at least one TTL old.
    Stale,
    /// The entry could not be read or did not verify.
    Corrupted,
    /// The caller asked to bypass the cache.
    Forced,
}

impl CacheOutcome {
    /// Lowercase name used in run summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Stale => "stale",
            Self::Corrupted => "corrupted",
            Self::Forced => "forced",
        }
    }
}

/// Bytes produced by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Whether the bytes may replace the cache entry. A partial payload is
    /// returned to the caller and any existing entry is left in place.
    pub cacheable: bool,
}

impl Fetched {
    /// A payload that must not be cached.
    #[must_use]
    pub const fn partial(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            cacheable: false,
        }
    }
}

impl From<Vec<u8>> for Fetched {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            cacheable: true,
        }
    }
}

/// A payload returned by [`CacheStore::get_or_fetch`].
#[derive(Debug, Clone)]
pub struct CachedPayload {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// When the bytes were fetched.
    pub fetched_at: DateTime<Utc>,
    /// How the lookup went.
    pub outcome: CacheOutcome,
}

/// Filesystem-backed cache of raw source payloads.
pub struct CacheStore {
    root: PathBuf,
    ttl: TimeDelta,
    clock: Clock,
    sink: Arc<dyn ReportSink>,
    locks: Mutex<BTreeMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheStore {
    /// Creates a cache rooted at `root` with the default 7-day TTL and the
    /// system clock.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            root: root.into(),
            ttl: TimeDelta::seconds(DEFAULT_TTL_SECS),
            clock: Arc::new(Utc::now),
            sink,
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replaces the clock. Used by tests to age entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether an entry is still fresh: strictly younger than the TTL.
    #[must_use]
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        (self.clock)() - entry.fetched_at < self.ttl
    }

    /// Returns the payload for `source_id`, fetching it with `fetch` unless
    /// a fresh entry exists (or `force` is set).
    ///
    /// Calls for the same `source_id` are serialized, so concurrent callers
    /// share one fetch. A freshly fetched payload replaces the entry unless
    /// `fetch` marks it [`Fetched::partial`].
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns. Cache errors are never surfaced.
    pub async fn get_or_fetch<F, Fut, T, E>(
        &self,
        source_id: &str,
        force: bool,
        fetch: F,
    ) -> Result<CachedPayload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Into<Fetched>,
    {
        let lock = self.source_lock(source_id);
        let _guard = lock.lock().await;

        let outcome = if force {
            CacheOutcome::Forced
        } else {
            match self.lookup(source_id).await {
                Ok(Some((entry, bytes))) if self.is_fresh(&entry) => {
                    self.sink.debug(
                        source_id,
                        &format!("Cache hit (fetched {})", entry.fetched_at.to_rfc3339()),
                    );
                    return Ok(CachedPayload {
                        bytes,
                        fetched_at: entry.fetched_at,
                        outcome: CacheOutcome::Hit,
                    });
                }
                Ok(Some(_)) => CacheOutcome::Stale,
                Ok(None) => CacheOutcome::Miss,
                Err(e) => {
                    self.sink
                        .warn(source_id, &format!("Ignoring unreadable cache entry: {e}"));
                    CacheOutcome::Corrupted
                }
            }
        };

        log::debug!("[{source_id}] Cache {outcome:?}, fetching");
        let Fetched { bytes, cacheable } = fetch().await?.into();

        if !cacheable {
            self.sink
                .info(source_id, "Partial payload not written to the cache");
            return Ok(CachedPayload {
                bytes,
                fetched_at: (self.clock)(),
                outcome,
            });
        }

        let fetched_at = match self.store(source_id, &bytes).await {
            Ok(entry) => entry.fetched_at,
            Err(e) => {
                self.sink
                    .warn(source_id, &format!("Failed to write cache entry: {e}"));
                (self.clock)()
            }
        };

        Ok(CachedPayload {
            bytes,
            fetched_at,
            outcome,
        })
    }

    /// Reads and verifies the entry for `source_id`, regardless of age.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry exists but cannot be read or does
    /// not match its payload.
    pub async fn lookup(
        &self,
        source_id: &str,
    ) -> Result<Option<(CacheEntry, Vec<u8>)>, CacheError> {
        let dir = self.entry_dir(source_id)?;

        let entry_text = match tokio::fs::read_to_string(dir.join(ENTRY_FILE)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_str(&entry_text)?;

        let corrupted = |reason: String| CacheError::Corrupted {
            source_id: source_id.to_string(),
            reason,
        };

        if entry.source_id != source_id {
            return Err(corrupted(format!(
                "entry belongs to '{}'",
                entry.source_id
            )));
        }

        let bytes = tokio::fs::read(dir.join(PAYLOAD_FILE)).await?;
        if bytes.len() as u64 != entry.payload_len {
            return Err(corrupted(format!(
                "payload is {} bytes, entry says {}",
                bytes.len(),
                entry.payload_len
            )));
        }
        if sha256_hex(&bytes) != entry.payload_sha256 {
            return Err(corrupted("payload hash mismatch".to_string()));
        }

        Ok(Some((entry, bytes)))
    }

    /// Writes `bytes` as the entry for `source_id`, timestamped now.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory or files cannot be written.
    pub async fn store(&self, source_id: &str, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
        let dir = self.entry_dir(source_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let entry = CacheEntry {
            source_id: source_id.to_string(),
            fetched_at: (self.clock)(),
            payload_len: bytes.len() as u64,
            payload_sha256: sha256_hex(bytes),
        };

        write_atomic(&dir, PAYLOAD_FILE, bytes).await?;
        let entry_json = serde_json::to_vec_pretty(&entry)?;
        write_atomic(&dir, ENTRY_FILE, &entry_json).await?;

        log::debug!(
            "[{source_id}] Cached {} bytes at {}",
            entry.payload_len,
            dir.display()
        );
        Ok(entry)
    }

    /// Removes the entry for `source_id`. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the files exist but cannot be removed.
    pub async fn invalidate(&self, source_id: &str) -> Result<bool, CacheError> {
        let lock = self.source_lock(source_id);
        let _guard = lock.lock().await;

        let dir = self.entry_dir(source_id)?;
        let existed = remove_if_exists(&dir.join(ENTRY_FILE)).await?;
        remove_if_exists(&dir.join(PAYLOAD_FILE)).await?;

        if existed {
            self.sink.info(source_id, "Cache entry invalidated");
        }
        Ok(existed)
    }

    fn entry_dir(&self, source_id: &str) -> Result<PathBuf, CacheError> {
        let valid = !source_id.is_empty()
            && source_id != "."
            && source_id != ".."
            && !source_id.contains(['/', '\\']);
        if !valid {
            return Err(CacheError::InvalidSourceId(source_id.to_string()));
        }
        Ok(self.root.join(source_id))
    }

    fn source_lock(&self, source_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(source_id.to_string()).or_default())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = dir.join(format!(".{name}.tmp"));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, dir.join(name)).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

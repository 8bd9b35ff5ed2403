//! Cache Store Module
//!
//! File-backed cache engine: one JSON file per entry, TTL expiration checked
//! lazily on read, size-bounded eviction on write, and secure deletion on
//! every removal path.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::entry::{entry_path, hash_key, is_entry_file};
use crate::cache::shred::secure_delete;
use crate::cache::{CacheEntry, MetricsCollector, Sanitizer};
use crate::config::{
    DEFAULT_CLEANUP_THRESHOLD, DEFAULT_EXPIRE, DEFAULT_MAX_CACHE_SIZE, DEFAULT_MAX_ENTRY_SIZE,
    DEFAULT_REDUCE_TARGET,
};
use crate::error::{CacheError, Result};

const STAGING_EXTENSION: &str = "tmp";

// == Settings ==
/// Parameters a store is opened with.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Directory owned by the store
    pub cache_dir: PathBuf,
    /// Total live-entry budget in bytes
    pub max_cache_size: u64,
    /// Per-entry cap in bytes
    pub max_entry_size: usize,
    /// TTL in seconds when `set` is called without one
    pub default_ttl: u64,
    /// Fraction of `max_cache_size` that triggers eviction
    pub cleanup_threshold: f64,
    /// Fraction of `max_cache_size` eviction reduces to
    pub reduce_target: f64,
}

impl StoreSettings {
    /// Default limits rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            default_ttl: DEFAULT_EXPIRE,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            reduce_target: DEFAULT_REDUCE_TARGET,
        }
    }

    fn budget(&self, fraction: f64) -> u64 {
        (self.max_cache_size as f64 * fraction.clamp(0.0, 1.0)) as u64
    }
}

// == Reports ==
/// Entries and bytes reclaimed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: u64,
    pub bytes: u64,
}

impl CleanupReport {
    fn add(&mut self, bytes: u64) {
        self.removed += 1;
        self.bytes += bytes;
    }
}

/// Result of scanning the store directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageScan {
    pub entries: u64,
    pub total_bytes: u64,
    pub expired_entries: u64,
    pub corrupt_entries: u64,
    pub oldest_entry_age_secs: Option<u64>,
}

/// An entry file as seen by a directory scan.
#[derive(Debug)]
struct DiskEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

// == Cache Store ==
/// File-backed cache with TTL expiration, quota eviction and secure deletion.
///
/// One store owns one directory. Construct it once at startup and share it
/// through an `Arc`. Mutating operations serialize on a single mutex; reads
/// go straight to disk and only take the mutex when they must remove a
/// stale file.
#[derive(Debug)]
pub struct CacheStore {
    settings: StoreSettings,
    write_lock: Mutex<()>,
    metrics: Arc<MetricsCollector>,
    sanitizer: Sanitizer,
}

impl CacheStore {
    // == Constructor ==
    /// Opens (creating if needed) the store directory and seeds the storage
    /// metrics from whatever entries are already on disk.
    pub fn open(settings: StoreSettings) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new(settings.max_cache_size));
        let store = Self {
            sanitizer: Sanitizer::new(Arc::clone(&metrics)),
            settings,
            write_lock: Mutex::new(()),
            metrics,
        };

        store.ensure_dir()?;
        store.shred_staging_files()?;
        let (total, entries) = store.seed_storage()?;

        info!(
            dir = %store.settings.cache_dir.display(),
            entries,
            bytes = total,
            "Cache store opened"
        );
        Ok(store)
    }

    // == Accessors ==
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn dir(&self) -> &Path {
        &self.settings.cache_dir
    }

    /// File that backs `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        entry_path(&self.settings.cache_dir, key)
    }

    // == Get ==
    /// Returns the stored value for `key`, or `None` on a miss.
    ///
    /// Expired, corrupt and unreadable entries are shredded and count as
    /// misses; no error reaches the caller.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lookup(key).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get) but returns the whole entry, including its
    /// expiry time.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let started = Instant::now();
        let path = self.path_for(key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.metrics.record_miss(started.elapsed());
                return None;
            }
            Err(e) => {
                warn!(key = %short_hash(key), error = %e, "Unreadable cache entry");
                self.evict_stale(&path);
                self.metrics.record_miss(started.elapsed());
                return None;
            }
        };

        match CacheEntry::from_bytes(&bytes) {
            Ok(entry) if !entry.is_expired() => {
                self.metrics.record_hit(started.elapsed());
                debug!(key = %short_hash(key), "Cache hit");
                Some(entry)
            }
            Ok(_) => {
                debug!(key = %short_hash(key), "Cache entry expired");
                self.evict_stale(&path);
                self.metrics.record_miss(started.elapsed());
                None
            }
            Err(e) => {
                warn!(key = %short_hash(key), error = %e, "Corrupt cache entry");
                self.evict_stale(&path);
                self.metrics.record_miss(started.elapsed());
                None
            }
        }
    }

    // == Set ==
    /// Sanitizes and stores `value` under `key` for `ttl` seconds
    /// (`None` uses the default TTL). Returns the bytes written.
    ///
    /// Oversized entries are refused before any lock is taken or any file
    /// is touched. Otherwise expired entries are swept and, if the write
    /// would push usage past the cleanup threshold, the oldest entries are
    /// evicted down to the reduce target first.
    pub fn set(&self, key: &str, value: &Value, ttl: Option<u64>) -> Result<u64> {
        let clean = self
            .sanitizer
            .sanitize(value)
            .map_err(|rejection| CacheError::SanitizationRejected(rejection.to_string()))?;

        let entry = CacheEntry::new(clean, ttl.unwrap_or(self.settings.default_ttl));
        let bytes = entry.to_bytes()?;
        if bytes.len() > self.settings.max_entry_size {
            warn!(
                key = %short_hash(key),
                size = bytes.len(),
                max = self.settings.max_entry_size,
                "Refusing oversized cache entry"
            );
            return Err(CacheError::EntryTooLarge {
                size: bytes.len(),
                max: self.settings.max_entry_size,
            });
        }

        let _guard = self.lock();
        self.clean_expired_locked();

        let path = self.path_for(key);
        let incoming = bytes.len() as u64;
        let replaced = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
        let live = self.live_bytes().saturating_sub(replaced);
        if live + incoming > self.settings.budget(self.settings.cleanup_threshold) {
            self.reduce_size_locked(self.settings.reduce_target);
        }

        // Replace-on-write: shred the previous version first.
        match secure_delete(&path) {
            Ok(Some(old)) => self.metrics.record_removal(old),
            Ok(None) => {}
            Err(e) => return Err(self.io_failure("replace", key, e)),
        }

        if let Err(e) = self.ensure_dir().and_then(|()| self.write_entry_file(&path, &bytes)) {
            return Err(self.io_failure("write", key, CacheError::StoreIo(e)));
        }

        self.metrics.record_write(incoming);
        debug!(key = %short_hash(key), bytes = incoming, "Cache entry stored");
        Ok(incoming)
    }

    // == Delete ==
    /// Shreds the entry for `key`. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        let _guard = self.lock();
        match secure_delete(&self.path_for(key)) {
            Ok(Some(bytes)) => {
                self.metrics.record_removal(bytes);
                debug!(key = %short_hash(key), "Cache entry deleted");
                true
            }
            Ok(None) => false,
            Err(e) => {
                let _ = self.io_failure("delete", key, e);
                false
            }
        }
    }

    // == Clear ==
    /// Shreds every file under the store directory, subdirectories included,
    /// and recreates it empty.
    ///
    /// On failure the storage counters are re-seeded from whatever is left
    /// on disk.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        let dir = &self.settings.cache_dir;

        let mut report = CleanupReport::default();
        let result = match fs::symlink_metadata(dir) {
            Ok(_) => shred_tree(dir, &mut report).and_then(|()| fs::remove_dir(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
        .and_then(|()| self.ensure_dir());

        if report.removed > 0 {
            self.metrics.record_cleanup(report.removed, report.bytes);
        }

        match result {
            Ok(()) => {
                self.metrics.reset_storage(0, 0);
                info!(removed = report.removed, bytes = report.bytes, "Cache cleared");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_privacy_violation();
                warn!(
                    dir = %dir.display(),
                    removed = report.removed,
                    error = %e,
                    "Cache clear failed"
                );
                if self.seed_storage().is_err() {
                    self.metrics.reset_storage(0, 0);
                }
                Err(e.into())
            }
        }
    }

    // == Clean Expired ==
    /// Shreds every entry that is expired or fails to parse.
    pub fn clean_expired(&self) -> CleanupReport {
        let _guard = self.lock();
        self.clean_expired_locked()
    }

    fn clean_expired_locked(&self) -> CleanupReport {
        if let Err(e) = self.shred_staging_files() {
            self.metrics.record_privacy_violation();
            warn!(error = %e, "Failed to sweep staging files");
        }

        let mut report = CleanupReport::default();
        for disk in self.scan().unwrap_or_default() {
            if !is_stale(&disk.path) {
                continue;
            }
            match secure_delete(&disk.path) {
                Ok(Some(bytes)) => report.add(bytes),
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_privacy_violation();
                    warn!(path = %disk.path.display(), error = %e, "Failed to shred expired entry");
                }
            }
        }

        if report.removed > 0 {
            self.metrics.record_cleanup(report.removed, report.bytes);
            info!(removed = report.removed, bytes = report.bytes, "Expired entries cleaned");
        }
        report
    }

    // == Reduce Size ==
    /// Evicts the oldest entries (by modification time) until live usage is
    /// at or below `max_cache_size * target_fraction`.
    pub fn reduce_size(&self, target_fraction: f64) -> CleanupReport {
        let _guard = self.lock();
        self.reduce_size_locked(target_fraction)
    }

    fn reduce_size_locked(&self, target_fraction: f64) -> CleanupReport {
        let target = self.settings.budget(target_fraction);
        let mut entries = self.scan().unwrap_or_default();
        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let mut report = CleanupReport::default();
        for disk in entries {
            if total <= target {
                break;
            }
            match secure_delete(&disk.path) {
                Ok(Some(bytes)) => {
                    report.add(bytes);
                    total = total.saturating_sub(bytes);
                }
                Ok(None) => total = total.saturating_sub(disk.size),
                Err(e) => {
                    self.metrics.record_privacy_violation();
                    warn!(path = %disk.path.display(), error = %e, "Failed to evict entry");
                }
            }
        }

        if report.removed > 0 {
            self.metrics.record_cleanup(report.removed, report.bytes);
            info!(
                removed = report.removed,
                bytes = report.bytes,
                remaining = total,
                target,
                "Cache reduced to target size"
            );
        }
        report
    }

    // == Storage Report ==
    /// Scans the directory without taking the store mutex.
    pub fn storage_report(&self) -> StorageScan {
        let now = SystemTime::now();
        let mut scan = StorageScan::default();
        for disk in self.scan().unwrap_or_default() {
            scan.entries += 1;
            scan.total_bytes += disk.size;

            match fs::read(&disk.path).map(|b| CacheEntry::from_bytes(&b)) {
                Ok(Ok(entry)) if entry.is_expired() => scan.expired_entries += 1,
                Ok(Ok(_)) => {}
                _ => scan.corrupt_entries += 1,
            }

            let age = now.duration_since(disk.modified).unwrap_or_default().as_secs();
            scan.oldest_entry_age_secs = Some(scan.oldest_entry_age_secs.map_or(age, |a| a.max(age)));
        }
        scan
    }

    // == Length ==
    /// Number of entry files currently on disk (live or not yet swept).
    pub fn len(&self) -> usize {
        self.scan().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Internals ==
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes a stale file found by a lock-free read. The file is re-checked
    /// under the mutex so a concurrent fresh write is never shredded.
    fn evict_stale(&self, path: &Path) {
        let _guard = self.lock();
        if !is_stale(path) {
            return;
        }
        match secure_delete(path) {
            Ok(Some(bytes)) => self.metrics.record_cleanup(1, bytes),
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_privacy_violation();
                warn!(path = %path.display(), error = %e, "Failed to shred stale entry");
            }
        }
    }

    /// Shreds staging files left behind by an interrupted write. Only called
    /// with the mutex held (or before the store is shared), so no write is
    /// in flight.
    fn shred_staging_files(&self) -> io::Result<u64> {
        let read_dir = match fs::read_dir(&self.settings.cache_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut shredded = 0;
        for item in read_dir {
            let path = item?.path();
            if !is_staging_file(&path) {
                continue;
            }
            if secure_delete(&path)?.is_some() {
                shredded += 1;
            }
        }
        if shredded > 0 {
            info!(files = shredded, "Shredded orphaned staging files");
        }
        Ok(shredded)
    }

    /// Sets the storage counters from a directory scan.
    fn seed_storage(&self) -> io::Result<(u64, usize)> {
        let existing = self.scan()?;
        let total: u64 = existing.iter().map(|e| e.size).sum();
        self.metrics.reset_storage(total, existing.len() as u64);
        Ok((total, existing.len()))
    }

    fn ensure_dir(&self) -> io::Result<()> {
        let dir = &self.settings.cache_dir;
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Writes to a `0600` staging file and renames it into place so readers
    /// never see a partial entry.
    fn write_entry_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let staging = path.with_extension(STAGING_EXTENSION);
        let result = (|| {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&staging)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&staging, path)
        })();

        if result.is_err() {
            let _ = secure_delete(&staging);
        }
        result
    }

    fn scan(&self) -> io::Result<Vec<DiskEntry>> {
        let read_dir = match fs::read_dir(&self.settings.cache_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item?;
            let path = item.path();
            if !is_entry_file(&path) {
                continue;
            }
            // Files can vanish between listing and stat.
            let Ok(meta) = item.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            entries.push(DiskEntry {
                path,
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }

    fn live_bytes(&self) -> u64 {
        self.scan()
            .map(|entries| entries.iter().map(|e| e.size).sum())
            .unwrap_or(0)
    }

    fn io_failure(&self, op: &str, key: &str, err: impl Into<CacheError>) -> CacheError {
        let err = err.into();
        self.metrics.record_privacy_violation();
        warn!(op, key = %short_hash(key), error = %err, "Cache store I/O failure");
        err
    }
}

fn is_staging_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(STAGING_EXTENSION)
}

/// Shreds every regular file below `dir` and removes the emptied
/// subdirectories. Symlinks are unlinked without touching their targets.
fn shred_tree(dir: &Path, report: &mut CleanupReport) -> io::Result<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let file_type = item.file_type()?;
        if file_type.is_dir() {
            shred_tree(&path, report)?;
            fs::remove_dir(&path)?;
        } else if file_type.is_file() {
            if let Some(bytes) = secure_delete(&path)? {
                report.add(bytes);
            }
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Runs `op` against `store` on the blocking thread pool.
///
/// Every store operation touches the filesystem, so async callers go
/// through here instead of calling the store on a runtime worker.
pub async fn run_blocking<T, F>(store: &Arc<CacheStore>, op: F) -> Result<T>
where
    F: FnOnce(&CacheStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    Ok(tokio::task::spawn_blocking(move || op(&store)).await?)
}

/// True if the file at `path` exists and is expired, corrupt or unreadable.
fn is_stale(path: &Path) -> bool {
    match fs::read(path) {
        Ok(bytes) => CacheEntry::from_bytes(&bytes).map_or(true, |entry| entry.is_expired()),
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

fn short_hash(key: &str) -> String {
    hash_key(key)[..12].to_string()
}

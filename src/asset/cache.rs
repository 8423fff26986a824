//! In-memory content cache for small assets
//!
//! Entries are keyed by canonical path and carry the length and mtime they
//! were read with; a lookup only hits when both still match the file on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use axum::body::Bytes;
use dashmap::DashMap;

/// Cached file contents plus the validators they were read with
#[derive(Clone)]
pub struct CachedAsset {
    pub data: Bytes,
    pub modified: Option<SystemTime>,
}

impl CachedAsset {
    pub fn new(data: Vec<u8>, modified: Option<SystemTime>) -> Self {
        Self {
            data: Bytes::from(data),
            modified,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: usize,
}

pub struct ContentCache {
    entries: DashMap<PathBuf, CachedAsset>,
    total_bytes: AtomicUsize,
    max_total_bytes: usize,
    max_entry_bytes: usize,
}

impl ContentCache {
    pub fn new(max_total_bytes: usize, max_entry_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            total_bytes: AtomicUsize::new(0),
            max_total_bytes,
            max_entry_bytes,
        }
    }

    /// Whether a file of `len` bytes is small enough to be cached
    pub fn accepts(&self, len: u64) -> bool {
        self.max_total_bytes > 0 && len <= self.max_entry_bytes as u64
    }

    /// Fresh entry for `path`, dropping it if the file changed since it was read
    pub fn get(&self, path: &Path, len: u64, modified: Option<SystemTime>) -> Option<CachedAsset> {
        {
            let entry = self.entries.get(path)?;
            if entry.size() as u64 == len && entry.modified == modified {
                return Some(entry.clone());
            }
        }
        self.remove(path);
        None
    }

    /// Insert unless the total budget would be exceeded. Returns whether it was stored.
    pub fn insert(&self, path: PathBuf, asset: CachedAsset) -> bool {
        let size = asset.size();
        if !self.accepts(size as u64) {
            return false;
        }

        let reserved = self
            .total_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(size)
                    .filter(|next| *next <= self.max_total_bytes)
            })
            .is_ok();
        if !reserved {
            tracing::debug!(path = %path.display(), size, "Content cache full, not caching");
            return false;
        }

        if let Some(previous) = self.entries.insert(path, asset) {
            self.release(previous.size());
        }
        true
    }

    pub fn remove(&self, path: &Path) {
        if let Some((_, previous)) = self.entries.remove(path) {
            self.release(previous.size());
        }
    }

    /// Drop every entry, releasing each one's bytes as it goes so inserts
    /// racing with the clear stay accounted for
    pub fn clear(&self) {
        self.entries.retain(|_, asset| {
            self.release(asset.size());
            false
        });
    }

    /// Return `size` bytes to the budget; never wraps below zero
    fn release(&self, size: usize) {
        let _ = self
            .total_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(size))
            });
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            total_size_bytes: self.total_bytes.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn asset(len: usize, modified: SystemTime) -> CachedAsset {
        CachedAsset::new(vec![7u8; len], Some(modified))
    }

    #[test]
    fn test_hit_requires_matching_validators() {
        let cache = ContentCache::new(1024, 512);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let path = PathBuf::from("/root/app.js");

        assert!(cache.insert(path.clone(), asset(100, mtime)));
        assert!(cache.get(&path, 100, Some(mtime)).is_some());

        // Same length, newer mtime: stale and evicted
        let later = mtime + Duration::from_secs(1);
        assert!(cache.get(&path, 100, Some(later)).is_none());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().total_size_bytes, 0);
    }

    #[test]
    fn test_budget_enforced() {
        let cache = ContentCache::new(250, 200);
        let mtime = SystemTime::UNIX_EPOCH;

        assert!(cache.insert(PathBuf::from("a"), asset(200, mtime)));
        assert!(!cache.insert(PathBuf::from("b"), asset(100, mtime)));
        assert!(!cache.insert(PathBuf::from("c"), asset(201, mtime)));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size_bytes, 200);
    }

    #[test]
    fn test_replace_accounts_previous_size() {
        let cache = ContentCache::new(1000, 1000);
        let mtime = SystemTime::UNIX_EPOCH;

        cache.insert(PathBuf::from("a"), asset(300, mtime));
        cache.insert(PathBuf::from("a"), asset(100, mtime));
        assert_eq!(cache.stats().total_size_bytes, 100);

        cache.clear();
        assert_eq!(cache.stats(), CacheStats { entries: 0, total_size_bytes: 0 });
    }

    #[test]
    fn test_zero_budget_disables_cache() {
        let cache = ContentCache::new(0, 1024);
        assert!(!cache.accepts(1));
        assert!(!cache.insert(PathBuf::from("a"), asset(1, SystemTime::UNIX_EPOCH)));
    }

    #[test]
    fn test_release_never_wraps_budget() {
        let cache = ContentCache::new(1024, 512);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let path = PathBuf::from("/root/untracked.js");

        assert!(cache.insert(path.clone(), asset(300, mtime)));
        // Entry present but its bytes no longer counted
        cache.total_bytes.store(0, Ordering::Release);
        cache.remove(&path);
        assert_eq!(cache.stats().total_size_bytes, 0);

        // Budget still usable afterwards
        assert!(cache.insert(PathBuf::from("/root/next.js"), asset(500, mtime)));
        assert_eq!(cache.stats().total_size_bytes, 500);
    }

    #[test]
    fn test_clear_releases_every_entry() {
        let cache = ContentCache::new(1024, 512);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(cache.insert(PathBuf::from("/root/a.js"), asset(200, mtime)));
        assert!(cache.insert(PathBuf::from("/root/b.js"), asset(300, mtime)));

        cache.clear();
        assert_eq!(cache.stats(), CacheStats { entries: 0, total_size_bytes: 0 });
        assert!(cache.insert(PathBuf::from("/root/c.js"), asset(512, mtime)));
    }
}

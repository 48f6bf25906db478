//! Prefix-pattern kind detection with an mtime-invalidated LRU cache.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use lru::LruCache;

use crate::error::{ErrorCode, TrellisError};
use crate::model::Kind;
use crate::resolver;
use crate::security;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry {
    kind: Kind,
    path: PathBuf,
    mtime: SystemTime,
}

/// Result of a validated kind-inference call.
#[derive(Debug, Clone)]
pub struct InferResult {
    pub inferred_kind: Kind,
    pub file_path: PathBuf,
    pub file_mtime: SystemTime,
    /// Whether this result came from a cache hit (for observability/tests).
    pub from_cache: bool,
}

/// Thread-safe LRU cache mapping normalized id -> (kind, path, mtime).
/// Only *validated* lookups are ever cached — an unvalidated call can
/// never poison the cache into skipping validation on a later validated
/// call.
pub struct KindCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl KindCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap())
    }

    /// Infer kind from the id's prefix alone, with no filesystem access
    /// and no cache interaction. Constant-time pattern match against the
    /// precompiled prefix rules.
    pub fn infer_kind(&self, id: &str) -> Result<Kind, TrellisError> {
        security::check_id_security(id)?;
        Kind::from_id_prefix(id).ok_or_else(|| {
            TrellisError::single(ErrorCode::InvalidIDFormat, "id does not match any recognized kind prefix")
        })
    }

    /// Infer kind *and* resolve+validate that the object exists,
    /// consulting (and maintaining) the LRU cache keyed by normalized id.
    pub fn infer_with_validation(
        &self,
        id: &str,
        root: &Path,
        force_subdir: bool,
    ) -> Result<InferResult, TrellisError> {
        let kind = self.infer_kind(id)?;
        let normalized = normalize_id(id);

        if let Some(hit) = self.check_cache_hit(&normalized) {
            return Ok(hit);
        }

        let path = resolver::id_to_path(kind, id, root, force_subdir)?;
        let mtime = std::fs::metadata(&path)?.modified()?;

        let mut guard = self.entries.lock().unwrap();
        guard.put(
            normalized,
            CacheEntry {
                kind,
                path: path.clone(),
                mtime,
            },
        );

        Ok(InferResult {
            inferred_kind: kind,
            file_path: path,
            file_mtime: mtime,
            from_cache: false,
        })
    }

    /// Check for a still-valid cache entry, evicting it if the file's
    /// mtime has moved on since it was cached.
    fn check_cache_hit(&self, normalized: &str) -> Option<InferResult> {
        let mut guard = self.entries.lock().unwrap();
        let entry = guard.get(normalized)?.clone();
        match std::fs::metadata(&entry.path).and_then(|m| m.modified()) {
            Ok(current_mtime) if current_mtime == entry.mtime => Some(InferResult {
                inferred_kind: entry.kind,
                file_path: entry.path,
                file_mtime: entry.mtime,
                from_cache: true,
            }),
            _ => {
                guard.pop(normalized);
                None
            }
        }
    }

    pub fn invalidate(&self, id: &str) {
        let normalized = normalize_id(id);
        self.entries.lock().unwrap().pop(&normalized);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use chrono::Utc;
    use std::num::NonZeroUsize;
    use tempfile::TempDir;

    fn write_project(root: &Path, slug: &str) -> PathBuf {
        let now = Utc::now();
        let path = resolver::resolve_path_for_new(
            Kind::Project,
            &format!("P-{slug}"),
            None,
            Status::Draft,
            root,
            false,
            now,
        )
        .unwrap();
        std::fs::write(&path, "---\n---\n").unwrap();
        path
    }

    #[test]
    fn unvalidated_inference_never_touches_disk() {
        let cache = KindCache::with_default_capacity();
        assert_eq!(cache.infer_kind("P-anything").unwrap(), Kind::Project);
        assert!(cache.is_empty());
    }

    #[test]
    fn validated_inference_caches_and_hits() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "demo");
        let cache = KindCache::with_default_capacity();

        let first = cache
            .infer_with_validation("P-demo", tmp.path(), false)
            .unwrap();
        assert!(!first.from_cache);

        let second = cache
            .infer_with_validation("P-demo", tmp.path(), false)
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn mtime_change_invalidates_cache_entry() {
        let tmp = TempDir::new().unwrap();
        let path = write_project(tmp.path(), "demo");
        let cache = KindCache::with_default_capacity();
        cache.infer_with_validation("P-demo", tmp.path(), false).unwrap();

        // Force the mtime forward.
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, "---\nupdated: true\n---\n").unwrap();

        let result = cache
            .infer_with_validation("P-demo", tmp.path(), false)
            .unwrap();
        assert!(!result.from_cache);
    }

    #[test]
    fn unvalidated_call_cannot_poison_a_later_validated_call() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "demo");
        let cache = KindCache::with_default_capacity();

        // An unvalidated call first — must not populate the cache.
        cache.infer_kind("P-demo").unwrap();
        assert!(cache.is_empty());

        // A validated call afterwards must still do real work (not
        // silently succeed off a fabricated cache entry).
        let result = cache
            .infer_with_validation("P-demo", tmp.path(), false)
            .unwrap();
        assert!(!result.from_cache);
    }

    #[test]
    fn nonexistent_object_fails_validation_and_does_not_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = KindCache::with_default_capacity();
        let err = cache
            .infer_with_validation("P-missing", tmp.path(), false)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ObjectNotFound);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let tmp = TempDir::new().unwrap();
        write_project(tmp.path(), "a");
        write_project(tmp.path(), "b");
        let cache = KindCache::new(NonZeroUsize::new(1).unwrap());

        cache.infer_with_validation("P-a", tmp.path(), false).unwrap();
        cache.infer_with_validation("P-b", tmp.path(), false).unwrap();
        assert_eq!(cache.len(), 1);

        let result = cache.infer_with_validation("P-a", tmp.path(), false).unwrap();
        assert!(!result.from_cache, "P-a should have been evicted by capacity 1");
    }
}

//! The dirmeta cache: a refcounted, lazily-populated map from `DIR_META`
//! digest to its decoded content, avoiding repeated loose-object reads for
//! directory metadata shared across many commits (spec §4.2 "DirMeta
//! cache").

use crate::objects::{Digest, DirMeta};
use std::collections::HashMap;
use std::sync::Mutex;

/// The cache body: present only while at least one caller has requested
/// caching be enabled, matching the teacher's pattern of tearing down
/// auxiliary state rather than leaving it permanently resident.
#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Digest, DirMeta>,
    refcount: u32,
}

/// A mutex-guarded, refcounted cache of decoded `DIR_META` objects.
///
/// Cloning an [`DirMetaCache`] shares the same underlying table; dropping
/// a [`DirMetaCacheGuard`] decrements the refcount and clears the table
/// once it reaches zero, so callers who only touch one commit briefly
/// don't leave stale entries resident indefinitely.
#[derive(Debug, Default, Clone)]
pub struct DirMetaCache(std::sync::Arc<Mutex<Inner>>);

/// An RAII handle keeping the cache populated for as long as it is held.
#[derive(Debug)]
pub struct DirMetaCacheGuard(DirMetaCache);

impl DirMetaCache {
    /// An empty, disabled cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable caching for the lifetime of the returned guard.
    pub fn enable(&self) -> DirMetaCacheGuard {
        self.0.lock().unwrap().refcount += 1;
        DirMetaCacheGuard(self.clone())
    }

    /// True if at least one guard is currently held.
    pub fn is_enabled(&self) -> bool {
        self.0.lock().unwrap().refcount > 0
    }

    /// Look up a cached entry.
    pub fn get(&self, digest: &Digest) -> Option<DirMeta> {
        self.0.lock().unwrap().entries.get(digest).cloned()
    }

    /// Insert an entry if the cache is currently enabled. A no-op
    /// otherwise, so callers can unconditionally call this after a load
    /// without checking [`Self::is_enabled`] themselves.
    pub fn insert(&self, digest: Digest, meta: DirMeta) {
        let mut inner = self.0.lock().unwrap();
        if inner.refcount > 0 {
            inner.entries.insert(digest, meta);
        }
    }
}

impl Drop for DirMetaCacheGuard {
    fn drop(&mut self) {
        let mut inner = self.0 .0.lock().unwrap();
        inner.refcount = inner.refcount.saturating_sub(1);
        if inner.refcount == 0 {
            inner.entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mode: u32) -> DirMeta {
        DirMeta { uid: 0, gid: 0, mode, xattrs: vec![] }
    }

    #[test]
    fn disabled_cache_does_not_retain_inserts() {
        let cache = DirMetaCache::new();
        let digest = Digest::of(b"x");
        cache.insert(digest, meta(0o755));
        assert!(cache.get(&digest).is_none());
    }

    #[test]
    fn enabled_cache_retains_until_guard_dropped() {
        let cache = DirMetaCache::new();
        let digest = Digest::of(b"x");
        let guard = cache.enable();
        cache.insert(digest, meta(0o755));
        assert!(cache.get(&digest).is_some());
        drop(guard);
        assert!(cache.get(&digest).is_none());
    }

    #[test]
    fn nested_guards_keep_cache_alive_until_last_drop() {
        let cache = DirMetaCache::new();
        let digest = Digest::of(b"x");
        let outer = cache.enable();
        let inner = cache.enable();
        cache.insert(digest, meta(0o644));
        drop(inner);
        assert!(cache.get(&digest).is_some());
        drop(outer);
        assert!(cache.get(&digest).is_none());
    }
}

//! Identity → handle hint map fed by engine lifecycle events.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mooring_core::{EngineHandle, InfoHash};

/// Best-effort view of which tasks are live in the engine.
///
/// Entries are hints only; authoritative lookups go through the session.
#[derive(Clone, Default)]
pub(crate) struct HandleCache {
    inner: Arc<RwLock<HashMap<InfoHash, EngineHandle>>>,
}

impl HandleCache {
    pub(crate) fn insert(&self, handle: EngineHandle) {
        self.write().insert(handle.info_hash.clone(), handle);
    }

    pub(crate) fn remove(&self, info_hash: &InfoHash) -> Option<EngineHandle> {
        self.write().remove(info_hash)
    }

    pub(crate) fn contains(&self, info_hash: &InfoHash) -> bool {
        self.read().contains_key(info_hash)
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn identities(&self) -> Vec<InfoHash> {
        self.read().keys().cloned().collect()
    }

    /// Drop entries rejected by `keep`, returning how many were evicted.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&EngineHandle) -> bool) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|_, handle| keep(handle));
        before - guard.len()
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<InfoHash, EngineHandle>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<InfoHash, EngineHandle>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(ch: char, generation: u64) -> EngineHandle {
        EngineHandle {
            info_hash: InfoHash::parse(&ch.to_string().repeat(40)).expect("valid hash"),
            generation,
        }
    }

    #[test]
    fn retain_reports_evictions() {
        let cache = HandleCache::default();
        cache.insert(handle('a', 1));
        cache.insert(handle('b', 2));
        cache.insert(handle('c', 3));

        let evicted = cache.retain(|entry| entry.generation != 2);
        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&handle('b', 2).info_hash));
    }

    #[test]
    fn insert_replaces_stale_generation() {
        let cache = HandleCache::default();
        cache.insert(handle('a', 1));
        cache.insert(handle('a', 5));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.retain(|entry| entry.generation == 5), 0);
        assert!(cache.remove(&handle('a', 0).info_hash).is_some());
        cache.clear();
        assert!(cache.identities().is_empty());
    }
}

//! Cache-aside layer for folder lookups.
//!
//! Entries are read-through (the caller fills them after a miss) and expire
//! after a short TTL, but every write that can touch a key invalidates it
//! explicitly. Expiry is never relied upon for correctness.
//!
//! Every invalidation bumps a generation counter. A reader takes the
//! generation before going to the database and passes it to `put`; a fill
//! that raced with an invalidation is dropped instead of resurrecting a stale
//! record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::storage::models::FolderRecord;
use crate::storage::parent_key;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct FolderCache {
    ttl: Duration,
    generation: AtomicU64,
    by_id: DashMap<String, Entry<FolderRecord>>,
    by_path: DashMap<String, Entry<FolderRecord>>,
    by_parent: DashMap<String, Entry<Vec<FolderRecord>>>,
}

impl FolderCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            by_id: DashMap::new(),
            by_path: DashMap::new(),
            by_parent: DashMap::new(),
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<FolderRecord> {
        fresh(&self.by_id, id, self.ttl)
    }

    pub fn get_by_path(&self, path: &str) -> Option<FolderRecord> {
        fresh(&self.by_path, path, self.ttl)
    }

    pub fn get_by_parent(&self, parent_id: Option<&str>) -> Option<Vec<FolderRecord>> {
        fresh(&self.by_parent, parent_key(parent_id), self.ttl)
    }

    /// Current generation; take it before reading the rows passed to `put`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache a folder under both its id and its path, unless an invalidation
    /// happened since `observed`.
    pub fn put(&self, folder: &FolderRecord, observed: u64) {
        if self.generation() != observed {
            return;
        }
        let now = Instant::now();
        self.by_id.insert(
            folder.id.clone(),
            Entry {
                value: folder.clone(),
                inserted_at: now,
            },
        );
        self.by_path.insert(
            folder.path.clone(),
            Entry {
                value: folder.clone(),
                inserted_at: now,
            },
        );
        // An invalidation may have cleared the maps between the check and
        // the inserts above.
        if self.generation() != observed {
            self.by_id.remove(&folder.id);
            self.by_path.remove(&folder.path);
        }
    }

    pub fn put_children(&self, parent_id: Option<&str>, children: &[FolderRecord], observed: u64) {
        if self.generation() != observed {
            return;
        }
        let key = parent_key(parent_id);
        self.by_parent.insert(
            key.to_string(),
            Entry {
                value: children.to_vec(),
                inserted_at: Instant::now(),
            },
        );
        if self.generation() != observed {
            self.by_parent.remove(key);
        }
    }

    /// Invalidate every key a single-folder write can affect: the folder's
    /// id and path, and its parent's child listing.
    pub fn invalidate_folder(&self, folder: &FolderRecord) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.by_id.remove(&folder.id);
        self.by_path.remove(&folder.path);
        self.by_parent.remove(parent_key(folder.parent_id.as_deref()));
    }

    /// Drop everything. Used after cascades, where every descendant's path
    /// key changes at once.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.by_id.clear();
        self.by_path.clear();
        self.by_parent.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_path.len() + self.by_parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn fresh<T: Clone>(map: &DashMap<String, Entry<T>>, key: &str, ttl: Duration) -> Option<T> {
    {
        // The shard guard must be released before remove().
        let entry = map.get(key)?;
        if entry.inserted_at.elapsed() <= ttl {
            return Some(entry.value.clone());
        }
    }
    map.remove(key);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(name: &str, parent: Option<&str>) -> FolderRecord {
        FolderRecord::new(name, name, parent)
    }

    #[test]
    fn test_put_and_invalidate() {
        let cache = FolderCache::new(Duration::from_secs(60));
        let docs = folder("Docs", None);
        let generation = cache.generation();
        cache.put(&docs, generation);
        cache.put_children(None, std::slice::from_ref(&docs), generation);

        assert_eq!(cache.get_by_id(&docs.id), Some(docs.clone()));
        assert_eq!(cache.get_by_path("Docs"), Some(docs.clone()));
        assert_eq!(cache.get_by_parent(None).map(|v| v.len()), Some(1));

        cache.invalidate_folder(&docs);
        assert!(cache.get_by_id(&docs.id).is_none());
        assert!(cache.get_by_path("Docs").is_none());
        assert!(cache.get_by_parent(None).is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = FolderCache::new(Duration::ZERO);
        let docs = folder("Docs", None);
        cache.put(&docs, cache.generation());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get_by_id(&docs.id).is_none());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = FolderCache::new(Duration::from_secs(60));
        cache.put(&folder("A", None), cache.generation());
        cache.put(&folder("B", None), cache.generation());
        assert!(!cache.is_empty());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fill_after_invalidation_is_dropped() {
        let cache = FolderCache::new(Duration::from_secs(60));
        let stale = folder("Old", None);

        let observed = cache.generation();
        // A rename commits and invalidates while the reader holds the old row.
        cache.invalidate_all();
        cache.put(&stale, observed);
        cache.put_children(None, std::slice::from_ref(&stale), observed);

        assert!(cache.get_by_id(&stale.id).is_none());
        assert!(cache.get_by_path("Old").is_none());
        assert!(cache.get_by_parent(None).is_none());

        cache.put(&stale, cache.generation());
        assert!(cache.get_by_id(&stale.id).is_some());
    }
}

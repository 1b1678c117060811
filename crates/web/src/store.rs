//! In-memory versioned state store
//!
//! Holds every version of every state object along with its lock holder.
//! Version numbers per object start at 1, increase by one per write and are
//! never handed out twice, even once all versions have been deleted.

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use statehub_common::{
    content_digest, Error, LockMetadata, Result, StateObjectKey, StateVersion, WritePrecondition,
};

struct StoredVersion {
    meta: StateVersion,
    content: Bytes,
}

#[derive(Default)]
struct StateRecord {
    versions: BTreeMap<u64, StoredVersion>,
    /// Highest version ever issued for this key
    last_issued: u64,
    lock: Option<LockMetadata>,
}

impl StateRecord {
    fn current_version(&self) -> Option<u64> {
        self.versions.keys().next_back().copied()
    }

    /// Mutations of a record whose lock carries an `ID` must present it.
    fn check_lock(&self, key: &StateObjectKey, lock_id: Option<&str>) -> Result<()> {
        match &self.lock {
            Some(holder) => match holder.lock_id() {
                Some(id) if lock_id != Some(id) => Err(Error::LockConflict {
                    key: key.to_string(),
                    holder: Some(holder.clone()),
                }),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }

    /// Nothing left worth remembering: no versions, none ever issued, no lock
    fn is_vacant(&self) -> bool {
        self.versions.is_empty() && self.last_issued == 0 && self.lock.is_none()
    }
}

/// Versioned state storage shared by all request handlers
#[derive(Default)]
pub struct StateStore {
    objects: RwLock<HashMap<StateObjectKey, StateRecord>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one version, or the highest one when `version` is `None`.
    pub fn read(&self, key: &StateObjectKey, version: Option<u64>) -> Result<(StateVersion, Bytes)> {
        let objects = self.objects.read();
        let not_found = || Error::NotFound {
            key: key.to_string(),
            version,
        };
        let record = objects.get(key).ok_or_else(not_found)?;
        let stored = match version {
            Some(v) => record.versions.get(&v),
            None => record.versions.values().next_back(),
        }
        .ok_or_else(not_found)?;

        Ok((stored.meta.clone(), stored.content.clone()))
    }

    /// Version metadata, most recent first. Unknown keys yield an empty list.
    pub fn list(&self, key: &StateObjectKey) -> Vec<StateVersion> {
        let objects = self.objects.read();
        objects
            .get(key)
            .map(|r| r.versions.values().rev().map(|s| s.meta.clone()).collect())
            .unwrap_or_default()
    }

    /// Append a new version.
    pub fn write(
        &self,
        key: &StateObjectKey,
        content: Bytes,
        precondition: &WritePrecondition,
        created_by: &str,
    ) -> Result<StateVersion> {
        let mut objects = self.objects.write();
        let existing = objects.get(key);

        if let Some(expected) = precondition.expected_version {
            let current = existing.and_then(StateRecord::current_version);
            if current.unwrap_or(0) != expected {
                debug!("write to {} rejected: expected {}, current {:?}", key, expected, current);
                return Err(Error::VersionConflict {
                    key: key.to_string(),
                    expected,
                    current,
                });
            }
        }
        if let Some(record) = existing {
            record.check_lock(key, precondition.lock_id.as_deref())?;
        }

        let record = objects.entry(key.clone()).or_default();
        record.last_issued += 1;
        let meta = StateVersion {
            version: record.last_issued,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            size_bytes: content.len() as u64,
            digest: content_digest(&content),
        };
        record.versions.insert(
            meta.version,
            StoredVersion {
                meta: meta.clone(),
                content,
            },
        );

        info!("{} wrote {} version {}", created_by, key, meta.version);
        Ok(meta)
    }

    /// Delete one version or all of them. Missing versions are not an error;
    /// returns how many versions were removed. A locked object only accepts
    /// deletes that carry the lock's `ID`.
    pub fn delete(
        &self,
        key: &StateObjectKey,
        version: Option<u64>,
        lock_id: Option<&str>,
    ) -> Result<usize> {
        let mut objects = self.objects.write();
        let Some(record) = objects.get_mut(key) else {
            return Ok(0);
        };

        let present = match version {
            Some(v) => record.versions.contains_key(&v),
            None => !record.versions.is_empty(),
        };
        if !present {
            return Ok(0);
        }
        record.check_lock(key, lock_id)?;

        let removed = match version {
            Some(v) => usize::from(record.versions.remove(&v).is_some()),
            None => {
                let n = record.versions.len();
                record.versions.clear();
                n
            }
        };
        info!("deleted {} version(s) of {}", removed, key);
        Ok(removed)
    }

    /// Take the lock. Fails if anyone, including the same holder, holds it.
    pub fn lock(&self, key: &StateObjectKey, metadata: LockMetadata) -> Result<()> {
        let mut objects = self.objects.write();
        if let Some(holder) = objects.get(key).and_then(|r| r.lock.as_ref()) {
            return Err(Error::LockConflict {
                key: key.to_string(),
                holder: Some(holder.clone()),
            });
        }
        info!("{} locked by {}", key, metadata.who().unwrap_or("unknown"));
        objects.entry(key.clone()).or_default().lock = Some(metadata);
        Ok(())
    }

    /// Release the lock if `metadata` identifies its holder. Releasing an
    /// unlocked object succeeds.
    pub fn unlock(&self, key: &StateObjectKey, metadata: &LockMetadata) -> Result<()> {
        let mut objects = self.objects.write();
        let Some(record) = objects.get_mut(key) else {
            return Ok(());
        };
        match &record.lock {
            None => Ok(()),
            Some(holder) if holder.same_holder(metadata) => {
                info!("{} unlocked", key);
                record.lock = None;
                if record.is_vacant() {
                    objects.remove(key);
                }
                Ok(())
            }
            Some(holder) => Err(Error::LockConflict {
                key: key.to_string(),
                holder: Some(holder.clone()),
            }),
        }
    }

    /// Number of state objects with any retained data
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn lock_holder(&self, key: &StateObjectKey) -> Option<LockMetadata> {
        self.objects.read().get(key).and_then(|r| r.lock.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StateObjectKey {
        StateObjectKey::new("proj-1", "main").unwrap()
    }

    fn write(store: &StateStore, body: &str) -> Result<StateVersion> {
        store.write(&key(), Bytes::from(body.to_string()), &WritePrecondition::none(), "alice")
    }

    #[test]
    fn test_versions_increase() {
        let store = StateStore::new();
        assert_eq!(write(&store, "{}").unwrap().version, 1);
        assert_eq!(write(&store, "{}").unwrap().version, 2);

        let listed: Vec<u64> = store.list(&key()).iter().map(|v| v.version).collect();
        assert_eq!(listed, vec![2, 1]);

        let (meta, body) = store.read(&key(), None).unwrap();
        assert_eq!(meta.version, 2);
        assert_eq!(&body[..], b"{}");
        assert_eq!(meta.digest, content_digest(b"{}"));
    }

    #[test]
    fn test_versions_not_reused_after_delete_all() {
        let store = StateStore::new();
        write(&store, "a").unwrap();
        write(&store, "b").unwrap();
        assert_eq!(store.delete(&key(), None, None).unwrap(), 2);
        assert!(store.list(&key()).is_empty());
        assert!(store.read(&key(), None).unwrap_err().is_not_found());
        assert_eq!(write(&store, "c").unwrap().version, 3);
    }

    #[test]
    fn test_expected_version() {
        let store = StateStore::new();
        let first = store
            .write(&key(), Bytes::from_static(b"a"), &WritePrecondition::expect_version(0), "alice")
            .unwrap();
        assert_eq!(first.version, 1);

        let err = store
            .write(&key(), Bytes::from_static(b"b"), &WritePrecondition::expect_version(0), "bob")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionConflict {
                expected: 0,
                current: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let store = StateStore::new();
        assert_eq!(store.delete(&key(), Some(42), None).unwrap(), 0);
        write(&store, "a").unwrap();
        assert_eq!(store.delete(&key(), Some(42), None).unwrap(), 0);
        assert_eq!(store.list(&key()).len(), 1);
    }

    #[test]
    fn test_lock_blocks_foreign_writes() {
        let store = StateStore::new();
        let lock = LockMetadata::new().with("ID", "l-1").with("Who", "alice");
        store.lock(&key(), lock.clone()).unwrap();

        assert!(matches!(write(&store, "x"), Err(Error::LockConflict { .. })));
        store
            .write(
                &key(),
                Bytes::from_static(b"x"),
                &WritePrecondition::none().with_lock_id("l-1"),
                "alice",
            )
            .unwrap();

        let bob = LockMetadata::new().with("ID", "l-2").with("Who", "bob");
        assert!(store.lock(&key(), bob.clone()).is_err());
        assert!(store.unlock(&key(), &bob).is_err());
        store.unlock(&key(), &lock).unwrap();
        assert!(store.lock_holder(&key()).is_none());
        store.lock(&key(), bob).unwrap();
    }

    #[test]
    fn test_lock_blocks_foreign_deletes() {
        let store = StateStore::new();
        write(&store, "a").unwrap();
        write(&store, "b").unwrap();
        let lock = LockMetadata::new().with("ID", "l-1").with("Who", "alice");
        store.lock(&key(), lock.clone()).unwrap();

        assert!(matches!(
            store.delete(&key(), None, None),
            Err(Error::LockConflict { .. })
        ));
        assert!(matches!(
            store.delete(&key(), Some(1), Some("l-2")),
            Err(Error::LockConflict { .. })
        ));
        assert_eq!(store.list(&key()).len(), 2);

        // Nothing to delete stays a no-op even under the lock
        assert_eq!(store.delete(&key(), Some(42), None).unwrap(), 0);

        assert_eq!(store.delete(&key(), Some(1), Some("l-1")).unwrap(), 1);
        store.unlock(&key(), &lock).unwrap();
        assert_eq!(store.delete(&key(), None, None).unwrap(), 1);
    }

    #[test]
    fn test_rejected_operations_leave_no_record() {
        let store = StateStore::new();
        let err = store
            .write(&key(), Bytes::from_static(b"a"), &WritePrecondition::expect_version(3), "alice")
            .unwrap_err();
        assert!(matches!(err, Error::VersionConflict { current: None, .. }));
        assert_eq!(store.delete(&key(), None, None).unwrap(), 0);
        store.unlock(&key(), &LockMetadata::new()).unwrap();
        assert_eq!(store.object_count(), 0);

        let lock = LockMetadata::new().with("Who", "alice");
        store.lock(&key(), lock.clone()).unwrap();
        assert_eq!(store.object_count(), 1);
        store.unlock(&key(), &lock).unwrap();
        assert_eq!(store.object_count(), 0);

        write(&store, "a").unwrap();
        store.delete(&key(), None, None).unwrap();
        assert_eq!(store.object_count(), 1);
    }

    #[test]
    fn test_unlock_when_not_locked() {
        let store = StateStore::new();
        store.unlock(&key(), &LockMetadata::new()).unwrap();
    }
}

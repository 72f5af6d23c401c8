use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{MetascribeError, Result};

pub mod store;

pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};

/// Reservation state of one credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Available,
    InUse,
}

/// One provider API key tracked by the pool
#[derive(Debug, Clone)]
pub struct Credential {
    value: String,
    status: KeyStatus,
}

impl Credential {
    fn new(value: String) -> Self {
        Self {
            value,
            status: KeyStatus::Available,
        }
    }

    /// Raw key value, used to authenticate provider calls
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn status(&self) -> KeyStatus {
        self.status
    }

    /// Display form with all but the last 4 characters obscured.
    /// Keys of 4 characters or fewer are fully obscured.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.value.chars().collect();

        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }

        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), suffix)
    }
}

/// Aggregate pool state for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub total: usize,
    pub in_use: usize,
}

impl PoolStatus {
    pub fn available(&self) -> usize {
        self.total - self.in_use
    }
}

/// Admission-control pool arbitrating concurrent access to a fixed set of
/// rate-limited provider credentials.
///
/// Insertion order is preserved; selection always returns the first available
/// key in that order. Every mutation persists the full key list through the
/// backing [`KeyStore`] before returning; if the write fails the in-memory
/// change is rolled back so memory and storage never diverge.
///
/// Selection and reservation run inside one critical section (`acquire`), so
/// two concurrent jobs can never reserve the same credential. The split
/// `available_key` / `mark_in_use` calls remain for callers that want to
/// inspect before committing.
pub struct KeyPool {
    keys: Mutex<Vec<Credential>>,
    store: Box<dyn KeyStore>,
}

impl KeyPool {
    /// Construct a pool populated from the backing store
    pub fn load(store: Box<dyn KeyStore>) -> Result<Self> {
        let keys = store
            .load()?
            .into_iter()
            .map(Credential::new)
            .collect();

        Ok(Self {
            keys: Mutex::new(keys),
            store,
        })
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Credential>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, keys: &[Credential]) -> Result<()> {
        let raw: Vec<String> = keys.iter().map(|k| k.value.clone()).collect();
        self.store.save(&raw)
    }

    /// Append a key and persist. Returns the new total count.
    pub fn add_key(&self, raw: &str) -> Result<usize> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(MetascribeError::InvalidKey.into());
        }

        let mut keys = self.guard();

        if keys.iter().any(|k| k.value == trimmed) {
            return Err(MetascribeError::DuplicateKey.into());
        }

        keys.push(Credential::new(trimmed.to_string()));

        if let Err(e) = self.persist(&keys) {
            keys.pop();
            return Err(e);
        }

        Ok(keys.len())
    }

    /// Remove the key at `index` and persist. Returns the new total count.
    ///
    /// Refuses to remove a key that is currently reserved; the caller retries
    /// once the owning job releases it.
    pub fn remove_key(&self, index: usize) -> Result<usize> {
        let mut keys = self.guard();

        if index >= keys.len() {
            return Err(MetascribeError::IndexOutOfRange(index).into());
        }

        if keys[index].status == KeyStatus::InUse {
            return Err(MetascribeError::KeyInUse(index).into());
        }

        let removed = keys.remove(index);

        if let Err(e) = self.persist(&keys) {
            keys.insert(index, removed);
            return Err(e);
        }

        Ok(keys.len())
    }

    /// First available key in insertion order, without reserving it
    pub fn available_key(&self) -> Option<Credential> {
        self.guard()
            .iter()
            .find(|k| k.status == KeyStatus::Available)
            .cloned()
    }

    /// Reserve the first available key. Selection and reservation happen in
    /// one critical section.
    pub fn acquire(&self) -> Option<Credential> {
        let mut keys = self.guard();

        let slot = keys.iter_mut().find(|k| k.status == KeyStatus::Available)?;
        slot.status = KeyStatus::InUse;

        Some(slot.clone())
    }

    /// Reserve the first available key whose value is not in `exclude`.
    ///
    /// Returns `None` when every available key is excluded or nothing is
    /// available at all; callers distinguish the two with a follow-up
    /// [`acquire`](Self::acquire).
    pub fn acquire_excluding(&self, exclude: &HashSet<String>) -> Option<Credential> {
        let mut keys = self.guard();

        let slot = keys
            .iter_mut()
            .find(|k| k.status == KeyStatus::Available && !exclude.contains(&k.value))?;
        slot.status = KeyStatus::InUse;

        Some(slot.clone())
    }

    /// Transition the key with `value` to InUse. Idempotent.
    pub fn mark_in_use(&self, value: &str) {
        if let Some(slot) = self.guard().iter_mut().find(|k| k.value == value) {
            slot.status = KeyStatus::InUse;
        }
    }

    /// Transition the key with `value` back to Available. Idempotent.
    pub fn mark_available(&self, value: &str) {
        if let Some(slot) = self.guard().iter_mut().find(|k| k.value == value) {
            slot.status = KeyStatus::Available;
        }
    }

    pub fn status(&self) -> PoolStatus {
        let keys = self.guard();

        PoolStatus {
            total: keys.len(),
            in_use: keys.iter().filter(|k| k.status == KeyStatus::InUse).count(),
        }
    }

    /// Masked display forms in insertion order
    pub fn masked_keys(&self) -> Vec<String> {
        self.guard().iter().map(Credential::masked).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn empty_pool() -> KeyPool {
        KeyPool::load(Box::new(MemoryKeyStore::new())).unwrap()
    }

    fn pool_with(keys: &[&str]) -> KeyPool {
        let store = MemoryKeyStore::with_keys(keys.iter().map(|k| k.to_string()).collect());
        KeyPool::load(Box::new(store)).unwrap()
    }

    /// Store whose saves can be made to fail, for rollback coverage
    struct FlakyStore {
        fail_saves: Arc<AtomicBool>,
    }

    impl KeyStore for FlakyStore {
        fn load(&self) -> crate::Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn save(&self, _keys: &[String]) -> crate::Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                Err(anyhow!("store unavailable"))
            } else {
                Ok(())
            }
        }
    }

    fn assert_invariant(pool: &KeyPool) {
        let status = pool.status();
        assert_eq!(status.available() + status.in_use, status.total);
    }

    #[test]
    fn test_add_key_returns_count() {
        let pool = empty_pool();

        assert_eq!(pool.add_key("sk-first").unwrap(), 1);
        assert_eq!(pool.add_key("sk-second").unwrap(), 2);
        assert_invariant(&pool);
    }

    #[test]
    fn test_add_key_rejects_empty_and_whitespace() {
        let pool = empty_pool();

        assert!(pool.add_key("").is_err());
        assert!(pool.add_key("   ").is_err());
        assert_eq!(pool.status().total, 0);
    }

    #[test]
    fn test_add_key_rejects_duplicate() {
        let pool = empty_pool();
        pool.add_key("sk-same").unwrap();

        let err = pool.add_key("sk-same").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MetascribeError>(),
            Some(MetascribeError::DuplicateKey)
        ));
    }

    #[test]
    fn test_remove_key_out_of_range() {
        let pool = pool_with(&["sk-only"]);

        let err = pool.remove_key(5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MetascribeError>(),
            Some(MetascribeError::IndexOutOfRange(5))
        ));
    }

    #[test]
    fn test_remove_key_refuses_in_use() {
        let pool = pool_with(&["sk-busy"]);
        let credential = pool.acquire().unwrap();

        let err = pool.remove_key(0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MetascribeError>(),
            Some(MetascribeError::KeyInUse(0))
        ));

        pool.mark_available(credential.value());
        assert_eq!(pool.remove_key(0).unwrap(), 0);
    }

    #[test]
    fn test_counts_hold_across_all_transitions() {
        let pool = empty_pool();

        pool.add_key("sk-a").unwrap();
        assert_invariant(&pool);
        pool.add_key("sk-b").unwrap();
        assert_invariant(&pool);

        pool.mark_in_use("sk-a");
        assert_invariant(&pool);
        assert_eq!(pool.status().in_use, 1);

        pool.mark_in_use("sk-a"); // idempotent
        assert_invariant(&pool);
        assert_eq!(pool.status().in_use, 1);

        pool.mark_available("sk-a");
        assert_invariant(&pool);
        assert_eq!(pool.status().in_use, 0);

        pool.remove_key(1).unwrap();
        assert_invariant(&pool);
        assert_eq!(pool.status().total, 1);
    }

    #[test]
    fn test_selection_follows_insertion_order() {
        let pool = pool_with(&["sk-a", "sk-b", "sk-c"]);

        assert_eq!(pool.available_key().unwrap().value(), "sk-a");
        assert_eq!(pool.acquire().unwrap().value(), "sk-a");
        assert_eq!(pool.acquire().unwrap().value(), "sk-b");
        assert_eq!(pool.acquire().unwrap().value(), "sk-c");
        assert!(pool.acquire().is_none());
        assert_invariant(&pool);
    }

    #[test]
    fn test_acquire_excluding_skips_tried_keys() {
        let pool = pool_with(&["sk-a", "sk-b"]);

        let mut tried = HashSet::new();
        tried.insert("sk-a".to_string());

        let credential = pool.acquire_excluding(&tried).unwrap();
        assert_eq!(credential.value(), "sk-b");

        // sk-b is now reserved and sk-a is excluded
        assert!(pool.acquire_excluding(&tried).is_none());
        // but a plain acquire still sees sk-a
        assert_eq!(pool.acquire().unwrap().value(), "sk-a");
    }

    #[test]
    fn test_failed_persist_rolls_back_add() {
        let fail_saves = Arc::new(AtomicBool::new(false));
        let pool = KeyPool::load(Box::new(FlakyStore {
            fail_saves: fail_saves.clone(),
        }))
        .unwrap();

        pool.add_key("sk-kept").unwrap();

        fail_saves.store(true, Ordering::SeqCst);

        assert!(pool.add_key("sk-dropped").is_err());
        assert_eq!(pool.status().total, 1);
        assert_eq!(pool.masked_keys().len(), 1);
    }

    #[test]
    fn test_failed_persist_rolls_back_remove() {
        let fail_saves = Arc::new(AtomicBool::new(false));
        let pool = KeyPool::load(Box::new(FlakyStore {
            fail_saves: fail_saves.clone(),
        }))
        .unwrap();

        pool.add_key("sk-a").unwrap();
        pool.add_key("sk-b").unwrap();

        fail_saves.store(true, Ordering::SeqCst);

        assert!(pool.remove_key(0).is_err());
        assert_eq!(pool.status().total, 2);
        assert_eq!(pool.available_key().unwrap().value(), "sk-a");
    }

    #[test]
    fn test_masking_reveals_at_most_four_chars() {
        let pool = empty_pool();
        pool.add_key("sk-proj-abcdef123456").unwrap();
        pool.add_key("tiny").unwrap();

        let masked = pool.masked_keys();
        assert_eq!(masked[0], "****************3456");
        assert_eq!(masked[1], "****");

        for (masked, raw) in masked.iter().zip(["sk-proj-abcdef123456", "tiny"]) {
            let visible: String = masked.chars().filter(|c| *c != '*').collect();
            assert!(visible.len() <= 4);
            assert!(raw.ends_with(&visible));
        }
    }

    #[test]
    fn test_persisted_keys_survive_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keys.json");

        {
            let pool = KeyPool::load(Box::new(FileKeyStore::new(path.clone()))).unwrap();
            pool.add_key("sk-durable").unwrap();
        }

        let reloaded = KeyPool::load(Box::new(FileKeyStore::new(path))).unwrap();

        assert_eq!(reloaded.status().total, 1);
        assert_eq!(reloaded.available_key().unwrap().value(), "sk-durable");
    }
}

use std::sync::Arc;

/// The immutable source collection behind a view, plus a version stamp.
///
/// Records are shared read-only with the caller. Replacing the collection
/// bumps the version; nothing is ever mutated in place.
#[derive(Debug)]
pub struct RecordStore<T> {
    records: Arc<[T]>,
    version: u64,
}

impl<T> RecordStore<T> {
    /// Create a store at version 0
    pub fn new(records: impl Into<Arc<[T]>>) -> Self {
        RecordStore {
            records: records.into(),
            version: 0,
        }
    }

    /// Swap in a new collection wholesale. Returns the new version.
    pub fn replace(&mut self, records: impl Into<Arc<[T]>>) -> u64 {
        self.records = records.into();
        self.version += 1;
        log::debug!(
            "Record store replaced: {} records, version {}",
            self.records.len(),
            self.version
        );
        self.version
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// A shared handle to the current collection
    pub fn shared(&self) -> Arc<[T]> {
        Arc::clone(&self.records)
    }

    pub fn get(&self, row: usize) -> Option<&T> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        RecordStore {
            records: Arc::clone(&self.records),
            version: self.version,
        }
    }
}

impl<T> From<Vec<T>> for RecordStore<T> {
    fn from(records: Vec<T>) -> Self {
        RecordStore::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_starts_at_version_zero() {
        let store = RecordStore::new(vec![1, 2, 3]);
        assert_eq!(store.version(), 0);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(1), Some(&2));
    }

    #[test]
    fn test_replace_bumps_version() {
        let mut store = RecordStore::new(vec!["a"]);
        assert_eq!(store.replace(vec!["b", "c"]), 1);
        assert_eq!(store.replace(Vec::new()), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_shared_handle_is_not_affected_by_replace() {
        let mut store = RecordStore::new(vec![10, 20]);
        let snapshot = store.shared();
        store.replace(vec![30]);
        assert_eq!(&*snapshot, &[10, 20]);
        assert_eq!(store.records(), &[30]);
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::error::{CacheError, Result};

/// An entity the store can hold: one primary key, one secondary index key.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn primary_key(&self) -> &str;
    fn index_key(&self) -> &str;
}

/// Durable local table of `T` keyed by primary key, with a secondary index
/// on `Record::index_key`.
///
/// Every write is atomic with respect to readers: `get_all` observes either
/// the snapshot before a write or the one after it.
#[async_trait]
pub trait KeyValueStore<T: Record>: Send + Sync {
    /// Open or create the backing storage. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Upsert every record in one transaction. Later duplicates win.
    async fn put_batch(&self, records: Vec<T>) -> Result<()>;

    /// Clear and put in one transaction.
    async fn replace_all(&self, records: Vec<T>) -> Result<()>;

    /// Every stored record, in primary-key order.
    async fn get_all(&self) -> Result<Vec<T>>;

    /// Shared read-only view of the current table. Later writes do not
    /// affect it, and taking one copies no records.
    async fn snapshot(&self) -> Result<Snapshot<T>>;

    /// Records whose index key starts with `prefix`, in index order.
    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Vec<T>>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Remove every record. Hydration uses `replace_all` instead.
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// Table
// ============================================================================

/// In-memory form of the table plus its secondary index.
#[derive(Debug, Clone)]
pub(crate) struct Table<T> {
    records: BTreeMap<String, T>,
    index: BTreeMap<String, BTreeSet<String>>,
}

impl<T: Record> Table<T> {
    pub(crate) fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            index: BTreeMap::new(),
        }
    }

    pub(crate) fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.upsert(record);
        }
        table
    }

    pub(crate) fn upsert(&mut self, record: T) {
        let id = record.primary_key().to_string();
        let index_key = record.index_key().to_string();

        if let Some(previous) = self.records.insert(id.clone(), record) {
            let old_key = previous.index_key();
            if let Some(ids) = self.index.get_mut(old_key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.index.remove(old_key);
                }
            }
        }
        self.index.entry(index_key).or_default().insert(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn values(&self) -> Vec<T> {
        self.records.values().cloned().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub(crate) fn prefix(&self, prefix: &str) -> Vec<T> {
        let records = &self.records;
        self.index
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(move |(_, ids)| ids.iter().filter_map(move |id| records.get(id)))
            .cloned()
            .collect()
    }
}

/// Point-in-time view handed out by `KeyValueStore::snapshot`.
pub struct Snapshot<T> {
    table: Arc<Table<T>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Record> Snapshot<T> {
    pub(crate) fn new(table: Arc<Table<T>>) -> Self {
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Records in primary-key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.table.iter()
    }
}

// ============================================================================
// Snapshot cell
// ============================================================================

/// Holds the current table behind an `Arc` so readers clone a pointer and
/// writers swap in a fully built replacement.
pub(crate) struct SnapshotCell<T> {
    current: RwLock<Option<Arc<Table<T>>>>,
    writer: Mutex<()>,
}

impl<T: Record> SnapshotCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            current: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub(crate) async fn is_open(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub(crate) async fn snapshot(&self) -> Result<Arc<Table<T>>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(CacheError::NotInitialized)
    }

    /// Serializes writers. Hold the guard across build, persist and install.
    pub(crate) async fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    pub(crate) async fn install(&self, table: Table<T>) {
        *self.current.write().await = Some(Arc::new(table));
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Non-persistent `KeyValueStore`, for tests and embedded use.
pub struct MemoryStore<T> {
    cell: SnapshotCell<T>,
}

impl<T: Record> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            cell: SnapshotCell::new(),
        }
    }
}

impl<T: Record> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> KeyValueStore<T> for MemoryStore<T> {
    async fn init(&self) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        if !self.cell.is_open().await {
            self.cell.install(Table::new()).await;
        }
        Ok(())
    }

    async fn put_batch(&self, records: Vec<T>) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        let mut next = (*self.cell.snapshot().await?).clone();
        for record in records {
            next.upsert(record);
        }
        self.cell.install(next).await;
        Ok(())
    }

    async fn replace_all(&self, records: Vec<T>) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        self.cell.snapshot().await?;
        self.cell.install(Table::from_records(records)).await;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self.cell.snapshot().await?.values())
    }

    async fn snapshot(&self) -> Result<Snapshot<T>> {
        Ok(Snapshot::new(self.cell.snapshot().await?))
    }

    async fn find_by_key_prefix(&self, prefix: &str) -> Result<Vec<T>> {
        Ok(self.cell.snapshot().await?.prefix(prefix))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.cell.snapshot().await?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.replace_all(Vec::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GuestSummary;

    fn guest(id: &str, name: &str) -> GuestSummary {
        GuestSummary::new(id, name, None, None)
    }

    #[tokio::test]
    async fn test_operations_before_init_fail() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        assert!(matches!(store.get_all().await, Err(CacheError::NotInitialized)));
        assert!(matches!(
            store.put_batch(vec![guest("1", "Lekana")]).await,
            Err(CacheError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_put_batch_upserts_by_id() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store
            .put_batch(vec![guest("2", "Ravi"), guest("1", "Lekana")])
            .await
            .expect("put");
        store
            .put_batch(vec![guest("1", "Lekana Moyo")])
            .await
            .expect("put");

        let all = store.get_all().await.expect("get_all");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), "1");
        assert_eq!(all[0].name(), "Lekana Moyo");
        assert_eq!(all[1].id(), "2");
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store.put_batch(vec![guest("1", "Lekana")]).await.expect("put");
        store.init().await.expect("second init");
        assert_eq!(store.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn test_replace_all_drops_previous_records() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store
            .put_batch(vec![guest("1", "Lekana"), guest("2", "Ravi")])
            .await
            .expect("put");
        store.replace_all(vec![guest("3", "Neo")]).await.expect("replace");

        let ids: Vec<String> = store
            .get_all()
            .await
            .expect("get_all")
            .iter()
            .map(|g| g.id().to_string())
            .collect();
        assert_eq!(ids, vec!["3"]);
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store.put_batch(vec![guest("1", "Lekana")]).await.expect("put");
        store.clear().await.expect("clear");
        assert!(store.is_empty().await.expect("is_empty"));
    }

    #[tokio::test]
    async fn test_secondary_index_follows_overwrites() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store
            .put_batch(vec![guest("1", "Lekana"), guest("2", "Levi"), guest("3", "Ravi")])
            .await
            .expect("put");

        let le: Vec<String> = store
            .find_by_key_prefix("le")
            .await
            .expect("prefix")
            .iter()
            .map(|g| g.id().to_string())
            .collect();
        assert_eq!(le, vec!["1", "2"]);

        // Renaming moves the record out of the old index slot.
        store.put_batch(vec![guest("1", "Zara")]).await.expect("put");
        let le = store.find_by_key_prefix("le").await.expect("prefix");
        assert_eq!(le.len(), 1);
        assert_eq!(le[0].id(), "2");
        assert_eq!(store.find_by_key_prefix("zar").await.expect("prefix").len(), 1);
    }

    #[tokio::test]
    async fn test_reader_snapshot_survives_concurrent_replace() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store
            .put_batch(vec![guest("1", "Lekana"), guest("2", "Ravi")])
            .await
            .expect("put");

        let before = store.cell.snapshot().await.expect("snapshot");
        store.replace_all(vec![guest("3", "Neo")]).await.expect("replace");

        // A snapshot taken earlier is never torn by a later write.
        assert_eq!(before.len(), 2);
        assert_eq!(store.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn test_snapshot_view_is_stable_and_ordered() {
        let store: MemoryStore<GuestSummary> = MemoryStore::new();
        store.init().await.expect("init");
        store
            .put_batch(vec![guest("2", "Ravi"), guest("1", "Lekana")])
            .await
            .expect("put");

        let view = store.snapshot().await.expect("snapshot");
        store.clear().await.expect("clear");

        let ids: Vec<&str> = view.iter().map(|g| g.id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(!view.is_empty());
        assert!(store.snapshot().await.expect("snapshot").is_empty());
    }
}

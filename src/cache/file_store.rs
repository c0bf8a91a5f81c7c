use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::store::{KeyValueStore, Record, Snapshot, SnapshotCell, Table};
use crate::error::{CacheError, Result};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoreFileOut<'a, T> {
    schema_version: u32,
    written_at: DateTime<Utc>,
    records: Vec<&'a T>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
struct StoreFileIn<T> {
    schema_version: u32,
    #[serde(default)]
    records: Vec<T>,
}

/// Write `data` to `tmp_path`, flush it to disk, then rename it over `path`.
///
/// After a crash `path` holds either the old contents or the new ones.
pub(crate) async fn write_atomic(path: &Path, tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    {
        let mut file = fs::File::create(tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    fs::rename(tmp_path, path).await?;
    Ok(())
}

/// JSON-file-backed `KeyValueStore`.
///
/// The whole table lives in one file. Writes go to a sibling temp file that
/// is renamed over the original, so a crash mid-write leaves the previous
/// table intact, and the in-memory snapshot is only swapped after the rename.
pub struct FileStore<T> {
    path: PathBuf,
    tmp_path: PathBuf,
    cell: SnapshotCell<T>,
}

impl<T: Record> FileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tmp_path = path.with_extension("json.tmp");
        Self {
            path,
            tmp_path,
            cell: SnapshotCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Table<T>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(path = ?self.path, "No guest store file, creating schema v{}", SCHEMA_VERSION);
            let table = Table::new();
            self.persist(&table).await.map_err(|e| {
                CacheError::StoreUnavailable(format!("cannot create {}: {}", self.path.display(), e))
            })?;
            return Ok(table);
        }

        let contents = fs::read(&self.path).await.map_err(|e| {
            CacheError::StoreUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let parsed: StoreFileIn<T> = match serde_json::from_slice(&contents) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Guest store is unreadable; starting empty");
                if let Err(remove_err) = fs::remove_file(&self.path).await {
                    warn!(path = ?self.path, error = %remove_err, "Failed to remove corrupted guest store");
                }
                return Ok(Table::new());
            }
        };

        if parsed.schema_version > SCHEMA_VERSION {
            return Err(CacheError::StoreUnavailable(format!(
                "{} has schema v{}, this build understands up to v{}",
                self.path.display(),
                parsed.schema_version,
                SCHEMA_VERSION
            )));
        }

        let table = Table::from_records(parsed.records);
        if parsed.schema_version < SCHEMA_VERSION {
            // Records re-derive their index keys on load; rewriting stamps the new version.
            info!(from = parsed.schema_version, to = SCHEMA_VERSION, "Migrating guest store");
            self.persist(&table)
                .await
                .map_err(|e| CacheError::StoreUnavailable(format!("migration failed: {}", e)))?;
        }
        Ok(table)
    }

    async fn persist(&self, table: &Table<T>) -> std::io::Result<()> {
        let file = StoreFileOut {
            schema_version: SCHEMA_VERSION,
            written_at: Utc::now(),
            records: table.iter().collect(),
        };
        let data = serde_json::to_vec(&file)?;
        write_atomic(&self.path, &self.tmp_path, &data).await
    }

    async fn commit(&self, next: Table<T>) -> Result<()> {
        self.persist(&next)
            .await
            .map_err(|e| CacheError::StoreWrite(format!("{}: {}", self.path.display(), e)))?;
        self.cell.install(next).await;
        Ok(())
    }
}

#[async_trait]
impl<T: Record> KeyValueStore<T> for FileStore<T> {
    async fn init(&self) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        if self.cell.is_open().await {
            return Ok(());
        }
        let table = self.load().await?;
        info!(path = ?self.path, records = table.len(), "Guest store opened");
        self.cell.install(table).await;
        Ok(())
    }

    async fn put_batch(&self, records: Vec<T>) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        let mut next = (*self.cell.snapshot().await?).clone();
        for record in records {
            next.upsert(record);
        }
        self.commit(next).await
    }

    async fn replace_all(&self, records: Vec<T>) -> Result<()> {
        let _guard = self.cell.lock_writer().await;
        self.cell.snapshot().await?;
        self.commit(Table::from_records(records)).await
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

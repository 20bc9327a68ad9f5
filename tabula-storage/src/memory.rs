use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{
    row::Row,
    schema::{AnsiQuoting, IdentifierQuoting, QuotedIdent, TableRef},
    transaction::{TransactionIdGenerator, TransactionState, TransactionStatus},
    upload::NewUpload,
    CellValue, ColumnType, Error, Result, Statement, TransactionId, Upload, UploadId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::reader::read_csv;
use crate::store::{StorageConnection, StorageTransaction, TableSnapshot};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct TableKey {
    schema: String,
    name: String,
}

impl TableKey {
    fn of(table: &TableRef) -> Self {
        Self {
            schema: table.schema.raw().to_string(),
            name: table.name.raw().to_string(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Table(TableKey),
    Upload(UploadId),
    UploadName(String),
}

#[derive(Debug, Clone)]
struct StoredTable {
    columns: Vec<(String, ColumnType)>,
    rows: Vec<Row>,
}

struct StoreInner {
    quoting: AnsiQuoting,
    tables: RwLock<HashMap<TableKey, StoredTable>>,
    uploads: RwLock<BTreeMap<UploadId, Upload>>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    txn_ids: TransactionIdGenerator,
    next_upload_id: AtomicU64,
    lock_timeout: Duration,
}

/// Transactional in-process storage engine.
///
/// Writers take exclusive per-table (and per-catalog-row) locks held until
/// commit or rollback, so transactions touching different tables never
/// wait on each other while two replacing the same table serialize.
/// Changes are staged inside the transaction and published in one step on
/// commit.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                quoting: AnsiQuoting::default(),
                tables: RwLock::new(HashMap::new()),
                uploads: RwLock::new(BTreeMap::new()),
                locks: DashMap::new(),
                txn_ids: TransactionIdGenerator::new(),
                next_upload_id: AtomicU64::new(1),
                lock_timeout,
            }),
        }
    }

    /// Committed tables as `schema.name`, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.tables.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierQuoting for InMemoryStore {
    fn quote_identifier(&self, name: &str) -> Result<QuotedIdent> {
        self.inner.quoting.quote_identifier(name)
    }
}

#[async_trait]
impl StorageConnection for InMemoryStore {
    fn quoting(&self) -> &dyn IdentifierQuoting {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StorageTransaction>> {
        let id = self.inner.txn_ids.next_id();
        debug!("BEGIN {}", id);
        Ok(Box::new(MemoryTransaction {
            state: TransactionState::new(id),
            inner: self.inner.clone(),
            guards: HashMap::new(),
            tables: HashMap::new(),
            uploads: HashMap::new(),
        }))
    }

    async fn read_table(&self, table: &TableRef, limit: Option<usize>) -> Result<TableSnapshot> {
        let tables = self.inner.tables.read();
        let stored = tables
            .get(&TableKey::of(table))
            .ok_or_else(|| Error::Storage(format!("relation {} does not exist", table)))?;
        let take = limit.unwrap_or(usize::MAX);
        Ok(TableSnapshot {
            columns: stored.columns.clone(),
            rows: stored.rows.iter().take(take).cloned().collect(),
        })
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        Ok(self.inner.tables.read().contains_key(&TableKey::of(table)))
    }

    async fn get_upload(&self, id: UploadId) -> Result<Upload> {
        self.inner
            .uploads
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::UploadNotFound(id.0))
    }

    async fn list_uploads(&self) -> Result<Vec<Upload>> {
        let mut uploads: Vec<Upload> = self.inner.uploads.read().values().cloned().collect();
        uploads.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(uploads)
    }
}

struct MemoryTransaction {
    state: TransactionState,
    inner: Arc<StoreInner>,
    guards: HashMap<LockKey, OwnedMutexGuard<()>>,
    /// Staged table changes; `None` marks a dropped table.
    tables: HashMap<TableKey, Option<StoredTable>>,
    /// Staged catalog changes; `None` marks a deleted row.
    uploads: HashMap<UploadId, Option<Upload>>,
}

impl MemoryTransaction {
    async fn lock(&mut self, key: LockKey) -> Result<()> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }
        let mutex = self
            .inner
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let waited = tokio::time::timeout(self.inner.lock_timeout, mutex.lock_owned()).await;
        let guard = match waited {
            Ok(guard) => guard,
            Err(_) => {
                self.inner
                    .locks
                    .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
                return Err(Error::Storage(format!("could not obtain lock on {:?}", key)));
            }
        };
        self.guards.insert(key, guard);
        Ok(())
    }

    fn current_table(&self, key: &TableKey) -> Option<StoredTable> {
        match self.tables.get(key) {
            Some(staged) => staged.clone(),
            None => self.inner.tables.read().get(key).cloned(),
        }
    }

    fn table_exists(&self, key: &TableKey) -> bool {
        match self.tables.get(key) {
            Some(staged) => staged.is_some(),
            None => self.inner.tables.read().contains_key(key),
        }
    }

    fn staged_table_mut(&mut self, key: &TableKey) -> Option<&mut StoredTable> {
        if !self.tables.contains_key(key) {
            let committed = self.inner.tables.read().get(key).cloned();
            self.tables.insert(key.clone(), committed);
        }
        self.tables.get_mut(key).and_then(|t| t.as_mut())
    }

    fn current_upload(&self, id: UploadId) -> Option<Upload> {
        match self.uploads.get(&id) {
            Some(staged) => staged.clone(),
            None => self.inner.uploads.read().get(&id).cloned(),
        }
    }

    fn upload_name_in_use(&self, table_name: &str, except: Option<UploadId>) -> bool {
        let in_staged = self
            .uploads
            .values()
            .flatten()
            .any(|u| u.table_name == table_name && Some(u.id) != except);
        let in_committed = self.inner.uploads.read().values().any(|u| {
            u.table_name == table_name && Some(u.id) != except && !self.uploads.contains_key(&u.id)
        });
        in_staged || in_committed
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    fn id(&self) -> TransactionId {
        self.state.id
    }

    async fn execute(&mut self, statement: &Statement) -> Result<()> {
        self.state.ensure_active()?;
        debug!("{}: {}", self.state.id, statement);

        match statement {
            Statement::CreateTable(create) => {
                let key = TableKey::of(&create.table);
                self.lock(LockKey::Table(key.clone())).await?;
                if self.table_exists(&key) {
                    return Err(Error::Storage(format!(
                        "relation {} already exists",
                        create.table
                    )));
                }
                let columns = create
                    .columns
                    .iter()
                    .map(|c| (c.name.raw().to_string(), c.column_type))
                    .collect();
                self.tables.insert(
                    key,
                    Some(StoredTable {
                        columns,
                        rows: Vec::new(),
                    }),
                );
            }
            Statement::DropTableIfExists(table) => {
                let key = TableKey::of(table);
                self.lock(LockKey::Table(key.clone())).await?;
                if self.table_exists(&key) {
                    self.tables.insert(key, None);
                } else {
                    debug!("table {} does not exist, skipping", table);
                }
            }
            Statement::RenameTable { from, to } => {
                let from_key = TableKey::of(from);
                let to_key = TableKey {
                    schema: from_key.schema.clone(),
                    name: to.raw().to_string(),
                };
                self.lock(LockKey::Table(from_key.clone())).await?;
                self.lock(LockKey::Table(to_key.clone())).await?;

                let source = self
                    .current_table(&from_key)
                    .ok_or_else(|| Error::Storage(format!("relation {} does not exist", from)))?;
                if self.table_exists(&to_key) {
                    return Err(Error::Storage(format!("relation {} already exists", to_key)));
                }
                self.tables.insert(from_key, None);
                self.tables.insert(to_key, Some(source));
            }
        }
        Ok(())
    }

    async fn copy_in(&mut self, table: &TableRef, csv: Bytes) -> Result<u64> {
        self.state.ensure_active()?;
        let key = TableKey::of(table);
        self.lock(LockKey::Table(key.clone())).await?;

        let doc = read_csv(&csv).map_err(|e| Error::Storage(format!("COPY {}: {}", table, e)))?;
        let stored = self
            .staged_table_mut(&key)
            .ok_or_else(|| Error::Storage(format!("relation {} does not exist", table)))?;

        if doc.headers.len() != stored.columns.len() {
            return Err(Error::Storage(format!(
                "COPY {}: header has {} columns, table has {}",
                table,
                doc.headers.len(),
                stored.columns.len()
            )));
        }

        let mut rows = Vec::with_capacity(doc.records.len());
        for (line, record) in doc.records.iter().enumerate() {
            let mut values = Vec::with_capacity(record.len());
            for (raw, (column, column_type)) in record.iter().zip(stored.columns.iter()) {
                let value: Option<CellValue> = CellValue::coerce(raw, *column_type).map_err(|e| {
                    Error::Storage(format!(
                        "COPY {}, line {}, column {}: {}",
                        table,
                        line + 2,
                        column,
                        e
                    ))
                })?;
                values.push(value);
            }
            rows.push(Row::new(values));
        }

        let loaded = rows.len() as u64;
        stored.rows.extend(rows);
        debug!("{}: COPY {} loaded {} rows", self.state.id, table, loaded);
        Ok(loaded)
    }

    /// Reads the row for update: its lock is held until commit or rollback.
    async fn get_upload(&mut self, id: UploadId) -> Result<Upload> {
        self.state.ensure_active()?;
        self.lock(LockKey::Upload(id)).await?;
        self.current_upload(id).ok_or(Error::UploadNotFound(id.0))
    }

    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload> {
        self.state.ensure_active()?;
        self.lock(LockKey::UploadName(upload.table_name.clone())).await?;
        if self.upload_name_in_use(&upload.table_name, None) {
            return Err(Error::TableTaken(upload.table_name));
        }

        let id = UploadId(self.inner.next_upload_id.fetch_add(1, Ordering::Relaxed));
        self.lock(LockKey::Upload(id)).await?;
        let now = Utc::now();
        let upload = Upload {
            id,
            table_name: upload.table_name,
            columns: upload.columns,
            creator: upload.creator,
            created_at: now,
            updated_at: now,
        };
        self.uploads.insert(id, Some(upload.clone()));
        Ok(upload)
    }

    async fn update_upload(&mut self, mut upload: Upload) -> Result<Upload> {
        self.state.ensure_active()?;
        self.lock(LockKey::Upload(upload.id)).await?;
        let existing = self
            .current_upload(upload.id)
            .ok_or(Error::UploadNotFound(upload.id.0))?;

        if existing.table_name != upload.table_name {
            self.lock(LockKey::UploadName(upload.table_name.clone())).await?;
            if self.upload_name_in_use(&upload.table_name, Some(upload.id)) {
                return Err(Error::TableTaken(upload.table_name));
            }
        }

        upload.created_at = existing.created_at;
        upload.updated_at = Utc::now();
        self.uploads.insert(upload.id, Some(upload.clone()));
        Ok(upload)
    }

    async fn delete_upload(&mut self, id: UploadId) -> Result<()> {
        self.state.ensure_active()?;
        self.lock(LockKey::Upload(id)).await?;
        if self.current_upload(id).is_none() {
            return Err(Error::UploadNotFound(id.0));
        }
        self.uploads.insert(id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        this.state.commit()?;

        {
            // Both maps change under one pair of guards, tables first
            let mut tables = this.inner.tables.write();
            let mut uploads = this.inner.uploads.write();
            for (key, staged) in this.tables.drain() {
                match staged {
                    Some(table) => {
                        tables.insert(key, table);
                    }
                    None => {
                        tables.remove(&key);
                    }
                }
            }
            for (id, staged) in this.uploads.drain() {
                match staged {
                    Some(upload) => {
                        uploads.insert(id, upload);
                    }
                    None => {
                        uploads.remove(&id);
                    }
                }
            }
        }

        info!("COMMIT {}", this.state.id);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        this.state.rollback();
        info!("ROLLBACK {}", this.state.id);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state.status() == TransactionStatus::Active {
            debug!("{} dropped without commit, rolling back", self.state.id);
        }
        for (key, guard) in self.guards.drain() {
            drop(guard);
            // Forget the mutex unless another transaction holds or awaits it
            self.inner
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

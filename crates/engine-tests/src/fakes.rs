//! In-memory stand-ins for the store, blob, library and scheduler capabilities.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use connectors::{
    blob::{BlobStore, StoredObject, error::BlobError, public_url},
    sql::base::{
        adapter::{DatabaseKind, SqlAdapter},
        dialect::{Dialect, MySql},
        error::DbError,
    },
};
use engine_core::{
    error::SchedulerError,
    jobs::{JobScheduler, ScheduledJob},
};
use engine_processing::{error::MediaError, media::library::MediaLibrary};
use model::{
    core::value::{FieldValue, Value},
    media::{MediaId, MediaItem, RemoteObject},
    records::row::RowData,
    schema::ColumnInfo,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

struct MemTable {
    columns: Vec<ColumnInfo>,
    primary_key: Option<String>,
    rows: Vec<BTreeMap<String, Value>>,
}

impl MemTable {
    fn matches(&self, row: &BTreeMap<String, Value>, columns: &[String], pattern: &str) -> bool {
        columns.iter().any(|column| {
            row.get(column)
                .and_then(Value::as_str)
                .is_some_and(|text| text.contains(pattern))
        })
    }
}

/// Relational store kept in memory. Implements the row-level operations
/// directly instead of interpreting SQL.
#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<BTreeMap<String, MemTable>>,
    broken: Mutex<BTreeSet<String>>,
    updates: Mutex<Vec<(String, Value)>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: &[(&str, &str)], primary_key: Option<&str>) {
        let table = MemTable {
            columns: columns
                .iter()
                .map(|(name, ty)| ColumnInfo::new(*name, *ty))
                .collect(),
            primary_key: primary_key.map(str::to_string),
            rows: Vec::new(),
        };
        self.tables.lock().unwrap().insert(name.to_string(), table);
    }

    pub fn insert(&self, table: &str, values: &[(&str, Value)]) {
        let row = values
            .iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect();
        self.tables
            .lock()
            .unwrap()
            .get_mut(table)
            .expect("table exists")
            .rows
            .push(row);
    }

    /// Makes introspection of `table` fail.
    pub fn break_table(&self, table: &str) {
        self.broken.lock().unwrap().insert(table.to_string());
    }

    pub fn cell(&self, table: &str, key_column: &str, key: &Value, column: &str) -> Value {
        let tables = self.tables.lock().unwrap();
        tables[table]
            .rows
            .iter()
            .find(|row| row.get(key_column) == Some(key))
            .and_then(|row| row.get(column).cloned())
            .unwrap_or(Value::Null)
    }

    /// Keys passed to `update_row` for `table`, in call order.
    pub fn updated_keys(&self, table: &str) -> Vec<Value> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn check(&self, table: &str) -> Result<(), DbError> {
        if self.broken.lock().unwrap().contains(table) {
            return Err(DbError::Unknown(format!("cannot describe {table}")));
        }
        if !self.tables.lock().unwrap().contains_key(table) {
            return Err(DbError::Unknown(format!("no such table {table}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SqlAdapter for MemoryDb {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn dialect(&self) -> &dyn Dialect {
        &MySql
    }

    async fn exec(&self, _query: &str) -> Result<(), DbError> {
        Ok(())
    }

    async fn exec_params(&self, query: &str, _params: Vec<Value>) -> Result<u64, DbError> {
        Err(DbError::Unsupported(query.to_string()))
    }

    async fn query_rows(&self, sql: &str, _params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        Err(DbError::Unsupported(sql.to_string()))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DbError> {
        self.check(table)?;
        Ok(self.tables.lock().unwrap()[table].columns.clone())
    }

    async fn primary_key(&self, table: &str) -> Result<Option<String>, DbError> {
        self.check(table)?;
        Ok(self.tables.lock().unwrap()[table].primary_key.clone())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn count_matching(
        &self,
        table: &str,
        columns: &[String],
        patterns: &[String],
    ) -> Result<u64, DbError> {
        self.check(table)?;
        let tables = self.tables.lock().unwrap();
        let t = &tables[table];
        let count = t
            .rows
            .iter()
            .filter(|row| patterns.iter().any(|p| t.matches(row, columns, p)))
            .count();
        Ok(count as u64)
    }

    async fn matching_keys(
        &self,
        table: &str,
        key_column: &str,
        columns: &[String],
        pattern: &str,
    ) -> Result<Vec<Value>, DbError> {
        self.check(table)?;
        let tables = self.tables.lock().unwrap();
        let t = &tables[table];
        Ok(t.rows
            .iter()
            .filter(|row| t.matches(row, columns, pattern))
            .map(|row| row.get(key_column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    async fn fetch_row(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<RowData>, DbError> {
        self.check(table)?;
        let tables = self.tables.lock().unwrap();
        let t = &tables[table];
        Ok(t.rows
            .iter()
            .find(|row| row.get(key_column) == Some(key))
            .map(|row| {
                let fields = t
                    .columns
                    .iter()
                    .map(|c| FieldValue::new(c.name.clone(), row.get(&c.name).cloned()))
                    .collect();
                RowData::new(table, fields)
            }))
    }

    async fn update_row(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        changes: &[(String, Value)],
    ) -> Result<u64, DbError> {
        self.check(table)?;
        self.updates
            .lock()
            .unwrap()
            .push((table.to_string(), key.clone()));
        let mut tables = self.tables.lock().unwrap();
        let t = tables.get_mut(table).expect("checked");
        match t.rows.iter_mut().find(|row| row.get(key_column) == Some(key)) {
            Some(row) => {
                for (column, value) in changes {
                    row.insert(column.clone(), value.clone());
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn replace_in_column(
        &self,
        table: &str,
        column: &str,
        old: &str,
        new: &str,
    ) -> Result<u64, DbError> {
        self.check(table)?;
        let mut tables = self.tables.lock().unwrap();
        let t = tables.get_mut(table).expect("checked");
        let mut affected = 0;
        for row in &mut t.rows {
            if let Some(Value::String(text)) = row.get_mut(column) {
                if text.contains(old) {
                    *text = text.replace(old, new);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }
}

/// Blob store recording every stored object.
pub struct MemoryBlobStore {
    bucket: String,
    public_base: String,
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    unavailable: Mutex<HashMap<String, usize>>,
    rejected: Mutex<BTreeSet<String>>,
    attempts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new(bucket: &str, public_base: &str) -> Self {
        MemoryBlobStore {
            bucket: bucket.to_string(),
            public_base: public_base.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            unavailable: Mutex::new(HashMap::new()),
            rejected: Mutex::new(BTreeSet::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// The next `times` uploads of `key` answer as unavailable.
    pub fn unavailable_for(&self, key: &str, times: usize) {
        self.unavailable
            .lock()
            .unwrap()
            .insert(key.to_string(), times);
    }

    /// Uploads of `key` are always refused.
    pub fn reject(&self, key: &str) {
        self.rejected.lock().unwrap().insert(key.to_string());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(_, ct)| ct.clone())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, BlobError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.rejected.lock().unwrap().contains(key) {
            return Err(BlobError::UploadFailed(format!("{key} refused")));
        }
        if let Some(left) = self.unavailable.lock().unwrap().get_mut(key) {
            if *left > 0 {
                *left -= 1;
                return Err(BlobError::Unavailable("try again".into()));
            }
        }

        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (content, content_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            url: public_url(&self.public_base, key),
        })
    }
}

/// Media library backed by a map.
#[derive(Default)]
pub struct MemoryLibrary {
    items: Mutex<BTreeMap<MediaId, MediaItem>>,
    missing: Mutex<BTreeSet<MediaId>>,
    unmarkable: Mutex<BTreeSet<MediaId>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: MediaItem) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    /// Lists `id` but answers `None` when it is fetched.
    pub fn add_missing(&self, id: MediaId) {
        self.missing.lock().unwrap().insert(id);
    }

    /// Makes `mark_offloaded` fail for `id`.
    pub fn fail_marking(&self, id: MediaId) {
        self.unmarkable.lock().unwrap().insert(id);
    }

    pub fn item(&self, id: MediaId) -> Option<MediaItem> {
        self.items.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl MediaLibrary for MemoryLibrary {
    async fn list_ids(&self) -> Result<Vec<MediaId>, MediaError> {
        let mut ids: BTreeSet<MediaId> = self.items.lock().unwrap().keys().copied().collect();
        ids.extend(self.missing.lock().unwrap().iter().copied());
        Ok(ids.into_iter().collect())
    }

    async fn fetch(&self, id: MediaId) -> Result<Option<MediaItem>, MediaError> {
        Ok(self.items.lock().unwrap().get(&id).cloned())
    }

    async fn mark_offloaded(&self, id: MediaId, remote: &RemoteObject) -> Result<(), MediaError> {
        if self.unmarkable.lock().unwrap().contains(&id) {
            return Err(MediaError::Malformed {
                id,
                reason: "metadata locked".into(),
            });
        }
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.meta.remote = Some(remote.clone());
        }
        Ok(())
    }
}

/// Scheduler that only records what it is asked to run.
#[derive(Default)]
pub struct RecordingScheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
    refuse_call: Option<usize>,
    calls: AtomicUsize,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses the `n`th scheduling call (zero based).
    pub fn refusing(n: usize) -> Self {
        RecordingScheduler {
            refuse_call: Some(n),
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        not_before: DateTime<Utc>,
        group: &str,
    ) -> Result<(), SchedulerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_call == Some(call) {
            return Err(SchedulerError::Rejected("queue full".into()));
        }
        self.jobs.lock().unwrap().push(ScheduledJob {
            job_name: job_name.to_string(),
            payload,
            not_before,
            group: group.to_string(),
        });
        Ok(())
    }
}

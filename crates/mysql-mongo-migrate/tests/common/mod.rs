//! In-memory source and target used by the engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mysql_mongo_migrate::{
    Chunk, Config, MigrateError, Pools, Result, SourceReader, TargetWriter, Value,
};

/// Tracks how many operations run at once across both fakes.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A source whose tables are generated from row counts.
///
/// Tables with an `id` column hold rows `1..=rows`; tables registered with
/// [`MemorySource::with_bare_table`] have no columns, which keeps
/// multi-million row tables cheap.
#[derive(Default)]
pub struct MemorySource {
    tables: BTreeMap<String, (u64, bool)>,
    primary_keys: HashMap<String, Vec<String>>,
    failing_reads: HashSet<String>,
    failing_list: bool,
    delay: Option<Duration>,
    pub reads: Mutex<Vec<(String, u64, usize, Vec<String>)>>,
    pub counts: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
    pub in_flight: Arc<InFlight>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, rows: u64) -> Self {
        self.tables.insert(name.to_string(), (rows, true));
        self
    }

    pub fn with_bare_table(mut self, name: &str, rows: u64) -> Self {
        self.tables.insert(name.to_string(), (rows, false));
        self
    }

    pub fn with_primary_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.primary_keys.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn failing_reads(mut self, table: &str) -> Self {
        self.failing_reads.insert(table.to_string());
        self
    }

    /// Fail table listing, as when the catalog query is refused.
    pub fn failing_list(mut self) -> Self {
        self.failing_list = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Offsets read for one table, in call order.
    pub fn offsets(&self, table: &str) -> Vec<u64> {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, ..)| t == table)
            .map(|(_, offset, ..)| *offset)
            .collect()
    }

    fn table(&self, name: &str) -> Result<(u64, bool)> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| MigrateError::source_query(name, "Table doesn't exist"))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        if self.failing_list {
            return Err(MigrateError::source_query("shop", "Access denied for INFORMATION_SCHEMA"));
        }
        Ok(self.tables.keys().cloned().collect())
    }

    async fn read_chunk(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        order_by: &[String],
    ) -> Result<Chunk> {
        self.reads
            .lock()
            .unwrap()
            .push((table.to_string(), offset, limit, order_by.to_vec()));

        self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();

        if self.failing_reads.contains(table) {
            return Err(MigrateError::source_query(table, "Lost connection to MySQL server"));
        }

        let (rows, has_id) = self.table(table)?;
        if offset >= rows {
            return Ok(Chunk::empty(offset));
        }

        let n = (rows - offset).min(limit as u64);
        let (columns, data) = if has_id {
            (
                vec!["id".to_string()],
                (offset..offset + n)
                    .map(|i| vec![Value::I64(i as i64 + 1)])
                    .collect(),
            )
        } else {
            (Vec::new(), (0..n).map(|_| Vec::new()).collect())
        };

        Ok(Chunk::new(offset, Arc::new(columns), data))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        self.counts.lock().unwrap().push(table.to_string());
        Ok(self.table(table)?.0 as i64)
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.primary_keys.get(table).cloned().unwrap_or_default())
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A target that keeps only document counts per collection.
#[derive(Default)]
pub struct MemoryTarget {
    pub collections: Mutex<HashMap<String, u64>>,
    failing_writes: HashSet<String>,
    failing_ensure: bool,
    failing_creates: bool,
    silently_dropped: HashMap<String, u64>,
    delay: Option<Duration>,
    pub inserts: Mutex<Vec<(String, usize)>>,
    pub created: Mutex<Vec<String>>,
    pub dropped: Mutex<Vec<String>>,
    pub ensured: AtomicUsize,
    pub closed: AtomicUsize,
    pub in_flight: Arc<InFlight>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a collection, as if left over from an earlier run.
    pub fn with_documents(self, collection: &str, docs: u64) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(collection.to_string(), docs);
        self
    }

    pub fn failing_writes(mut self, collection: &str) -> Self {
        self.failing_writes.insert(collection.to_string());
        self
    }

    /// Reject database creation.
    pub fn failing_ensure(mut self) -> Self {
        self.failing_ensure = true;
        self
    }

    /// Reject every collection creation.
    pub fn failing_creates(mut self) -> Self {
        self.failing_creates = true;
        self
    }

    /// Acknowledge every insert in full but store `docs` fewer documents.
    pub fn silently_dropping(mut self, collection: &str, docs: u64) -> Self {
        self.silently_dropped.insert(collection.to_string(), docs);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_in_flight(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn documents(&self, collection: &str) -> Option<u64> {
        self.collections.lock().unwrap().get(collection).copied()
    }

    pub fn insert_sizes(&self, collection: &str) -> Vec<usize> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, n)| *n)
            .collect()
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn ensure_database(&self) -> Result<()> {
        self.ensured.fetch_add(1, Ordering::SeqCst);
        if self.failing_ensure {
            return Err(MigrateError::connection("not authorized on shop", "ensuring database"));
        }
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.created.lock().unwrap().push(collection.to_string());
        if self.failing_creates {
            return Err(MigrateError::dest_insert(
                collection,
                "not authorized to execute command create",
            ));
        }
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_insert(0);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.dropped.lock().unwrap().push(collection.to_string());
        self.collections.lock().unwrap().remove(collection);
        Ok(())
    }

    async fn insert_chunk(&self, collection: &str, chunk: Chunk) -> Result<u64> {
        assert!(!chunk.is_empty(), "empty chunk sent to target");
        assert!(
            self.collections.lock().unwrap().contains_key(collection),
            "insert into {} before it was created",
            collection
        );

        self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();

        if self.failing_writes.contains(collection) {
            return Err(MigrateError::dest_insert(collection, "E11000 duplicate key error"));
        }

        let n = chunk.len() as u64;
        self.inserts
            .lock()
            .unwrap()
            .push((collection.to_string(), chunk.len()));

        let stored = n.saturating_sub(self.silently_dropped.get(collection).copied().unwrap_or(0));
        *self
            .collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_insert(0) += stored;

        Ok(n)
    }

    async fn count_documents(&self, collection: &str) -> Result<i64> {
        Ok(self.documents(collection).unwrap_or(0) as i64)
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bulk-mode configuration with the given chunk size and concurrency.
pub fn bulk_config(chunk_size: usize, concurrency_limit: usize) -> Config {
    let mut config = Config::from_yaml(
        r#"
source:
  database: shop
target:
  database: shop
migration:
  silent: true
"#,
    )
    .unwrap();
    config.migration.chunk_size = chunk_size;
    config.migration.concurrency_limit = concurrency_limit;
    config
}

/// Single-table configuration copying `source` into `dest`.
pub fn single_table_config(source: &str, dest: &str, chunk_size: usize) -> Config {
    let mut config = bulk_config(chunk_size, 1);
    config.source.table = Some(source.to_string());
    config.target.table = Some(dest.to_string());
    config
}

pub fn pools(source: &Arc<MemorySource>, target: &Arc<MemoryTarget>) -> Pools {
    Pools::new(source.clone(), target.clone())
}

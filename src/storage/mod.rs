use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{ReviewDocument, StoreMetadata};
use crate::error::{PipelineError, Result};

pub mod query;

pub use query::{AggregateFn, AggregateValue, Comparator, FilterCondition, QueryEngine};

/// Master table every review document is dual-written into.
pub const MASTER_TABLE: &str = "reviews";
/// Reserved table holding the single store metadata record.
pub const METADATA_TABLE: &str = "metadata";

/// Storage abstraction over named, ordered document tables.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_table(&self, name: &str) -> Result<()>;
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Appends a document to a single table.
    async fn insert(&self, table: &str, document: ReviewDocument) -> Result<()>;

    /// Dual-writes a document into its category table and the master
    /// `reviews` table. Both writes happen or neither does.
    async fn insert_review(&self, category_table: &str, document: ReviewDocument) -> Result<()>;

    /// All documents of a table in insertion order.
    async fn get_all(&self, table: &str) -> Result<Vec<ReviewDocument>>;

    /// Documents matching every condition, in insertion order.
    async fn query(
        &self,
        table: &str,
        conditions: &[FilterCondition],
    ) -> Result<Vec<ReviewDocument>>;

    async fn count(&self, table: &str) -> Result<usize>;

    async fn put_metadata(&self, metadata: StoreMetadata) -> Result<()>;
    async fn get_metadata(&self) -> Result<Option<StoreMetadata>>;

    /// Serializes the full in-memory state into one JSON snapshot on disk.
    async fn persist(&self) -> Result<()>;

    /// Replaces the in-memory state from the on-disk snapshot.
    async fn load(&self) -> Result<()>;
}

/// In-memory document store with whole-file JSON persistence.
///
/// Tables are rebuilt from scratch on every pipeline run; documents are
/// append-only and never mutated. The snapshot write goes to a temporary
/// path first and is renamed over the previous snapshot, so a crash
/// mid-write never corrupts the prior state.
pub struct DocumentStore {
    tables: Mutex<BTreeMap<String, Vec<ReviewDocument>>>,
    metadata: Mutex<Option<StoreMetadata>>,
    path: PathBuf,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut tables = BTreeMap::new();
        // The master table always exists so dual-writes cannot race table
        // creation.
        tables.insert(MASTER_TABLE.to_string(), Vec::new());
        Self {
            tables: Mutex::new(tables),
            metadata: Mutex::new(None),
            path: path.into(),
        }
    }

    /// Opens a store and immediately loads the existing snapshot.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        store.load().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot_to_json(&self) -> Result<String> {
        let tables = self.tables.lock().unwrap();
        let metadata = self.metadata.lock().unwrap();

        let mut root = serde_json::Map::new();
        for (name, documents) in tables.iter() {
            root.insert(name.clone(), serde_json::to_value(documents)?);
        }
        let metadata_records: Vec<&StoreMetadata> = metadata.iter().collect();
        root.insert(
            METADATA_TABLE.to_string(),
            serde_json::to_value(metadata_records)?,
        );

        Ok(serde_json::to_string_pretty(&Value::Object(root))?)
    }

    /// Parses and validates the table-of-tables-of-documents snapshot shape.
    fn parse_snapshot(
        content: &str,
    ) -> Result<(BTreeMap<String, Vec<ReviewDocument>>, Option<StoreMetadata>)> {
        let root: Value = serde_json::from_str(content)
            .map_err(|e| PipelineError::CorruptStore(format!("snapshot is not valid JSON: {}", e)))?;
        let root = root.as_object().ok_or_else(|| {
            PipelineError::CorruptStore("snapshot top level is not a table mapping".to_string())
        })?;

        let mut tables = BTreeMap::new();
        let mut metadata = None;

        for (name, value) in root {
            let rows = value.as_array().ok_or_else(|| {
                PipelineError::CorruptStore(format!("table '{}' is not an array", name))
            })?;

            if name == METADATA_TABLE {
                metadata = rows
                    .first()
                    .map(|row| {
                        serde_json::from_value::<StoreMetadata>(row.clone()).map_err(|e| {
                            PipelineError::CorruptStore(format!("metadata record invalid: {}", e))
                        })
                    })
                    .transpose()?;
                continue;
            }

            let mut documents = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                let document: ReviewDocument =
                    serde_json::from_value(row.clone()).map_err(|e| {
                        PipelineError::CorruptStore(format!(
                            "table '{}' record {} invalid: {}",
                            name, index, e
                        ))
                    })?;
                documents.push(document);
            }
            tables.insert(name.clone(), documents);
        }

        if !tables.contains_key(MASTER_TABLE) {
            return Err(PipelineError::CorruptStore(format!(
                "snapshot is missing the '{}' table",
                MASTER_TABLE
            )));
        }

        Ok((tables, metadata))
    }
}

#[async_trait]
impl Storage for DocumentStore {
    async fn create_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(name) {
            return Err(PipelineError::store(
                name,
                "create_table",
                "table already exists",
            ));
        }
        tables.insert(name.to_string(), Vec::new());
        debug!(table = name, "Created table");
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.keys().cloned().collect())
    }

    async fn insert(&self, table: &str, document: ReviewDocument) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| PipelineError::store(table, "insert", "table does not exist"))?;
        rows.push(document);
        Ok(())
    }

    async fn insert_review(&self, category_table: &str, document: ReviewDocument) -> Result<()> {
        if category_table == MASTER_TABLE {
            return Err(PipelineError::store(
                category_table,
                "insert_review",
                "category table must not be the master table",
            ));
        }

        let mut tables = self.tables.lock().unwrap();
        // Verify both targets before touching either so a missing table can
        // never leave a half-written document pair behind.
        if !tables.contains_key(category_table) {
            return Err(PipelineError::store(
                category_table,
                "insert_review",
                "category table does not exist",
            ));
        }
        if !tables.contains_key(MASTER_TABLE) {
            return Err(PipelineError::store(
                MASTER_TABLE,
                "insert_review",
                "master table does not exist",
            ));
        }

        if let Some(rows) = tables.get_mut(category_table) {
            rows.push(document.clone());
        }
        if let Some(rows) = tables.get_mut(MASTER_TABLE) {
            rows.push(document);
        }
        Ok(())
    }

    async fn get_all(&self, table: &str) -> Result<Vec<ReviewDocument>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| PipelineError::store(table, "get_all", "table does not exist"))?;
        Ok(rows.clone())
    }

    async fn query(
        &self,
        table: &str,
        conditions: &[FilterCondition],
    ) -> Result<Vec<ReviewDocument>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| PipelineError::store(table, "query", "table does not exist"))?;
        Ok(rows
            .iter()
            .filter(|doc| conditions.iter().all(|c| c.matches(doc)))
            .cloned()
            .collect())
    }

    async fn count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| PipelineError::store(table, "count", "table does not exist"))?;
        Ok(rows.len())
    }

    async fn put_metadata(&self, metadata: StoreMetadata) -> Result<()> {
        let mut current = self.metadata.lock().unwrap();
        *current = Some(metadata);
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Option<StoreMetadata>> {
        Ok(self.metadata.lock().unwrap().clone())
    }

    async fn persist(&self) -> Result<()> {
        let json = self.snapshot_to_json()?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::store("store", "persist", format!("create dir failed: {}", e))
            })?;
        }

        // Write-then-rename keeps the previous snapshot intact on a crash
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| {
            PipelineError::store(
                "store",
                "persist",
                format!("write to '{}' failed: {}", tmp_path.display(), e),
            )
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            PipelineError::store(
                "store",
                "persist",
                format!("rename over '{}' failed: {}", self.path.display(), e),
            )
        })?;

        info!(path = %self.path.display(), "Persisted document store snapshot");
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::store(
                "store",
                "load",
                format!("read of '{}' failed: {}", self.path.display(), e),
            )
        })?;
        let (tables, metadata) = Self::parse_snapshot(&content)?;

        let record_count = tables.get(MASTER_TABLE).map(Vec::len).unwrap_or(0);
        *self.tables.lock().unwrap() = tables;
        *self.metadata.lock().unwrap() = metadata;

        info!(
            path = %self.path.display(),
            record_count,
            "Loaded document store snapshot"
        );
        Ok(())
    }
}

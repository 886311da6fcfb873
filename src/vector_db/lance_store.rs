//! LanceDB document store (embedded, no server required)
//!
//! One row per indexed file. Timestamps are stored as epoch milliseconds.

use crate::error::VectorDbError;
use crate::paths;
use crate::types::{IndexedDocument, ScoredDocument, from_millis, to_millis};
use crate::vector_db::{VectorStore, distance_to_score};
use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const TABLE_NAME: &str = "documents";

/// Initial over-fetch multiple for prefix-filtered search
const PREFIX_OVERFETCH: usize = 2;
/// Growth factor when a filtered search comes back short
const PREFIX_WIDEN: usize = 4;
/// Maximum number of paths per `IN (...)` delete predicate
const DELETE_CHUNK: usize = 256;

pub struct LanceStore {
    connection: Connection,
    db_path: String,
    /// Cached table dimensionality; `None` until known
    dimension: RwLock<Option<usize>>,
}

impl LanceStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        tracing::info!("Connecting to LanceDB at: {}", db_path);

        let connection = lancedb::connect(db_path)
            .execute()
            .await
            .map_err(|e| VectorDbError::OpenFailed(e.to_string()))?;

        Ok(Self {
            connection,
            db_path: db_path.to_string(),
            dimension: RwLock::new(None),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("id", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Int64, false),
            Field::new("file_modified_at", DataType::Int64, false),
            Field::new("file_size", DataType::UInt64, false),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn get_table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|_| VectorDbError::NotInitialized.into())
    }

    async fn create_table(&self, dimension: usize) -> Result<()> {
        let schema = Self::create_schema(dimension);
        let empty_batch = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![empty_batch].into_iter().map(Ok), schema);

        self.connection
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .map_err(|e| VectorDbError::InitializationFailed(e.to_string()))?;

        self.set_cached_dimension(Some(dimension));
        tracing::info!("Created table '{}' with dimension {}", TABLE_NAME, dimension);
        Ok(())
    }

    fn cached_dimension(&self) -> Option<usize> {
        self.dimension.read().ok().and_then(|d| *d)
    }

    fn set_cached_dimension(&self, dimension: Option<usize>) {
        if let Ok(mut guard) = self.dimension.write() {
            *guard = dimension;
        }
    }

    /// Reject vectors that do not belong to the table's space
    async fn check_dimension(&self, doc: &IndexedDocument) -> Result<()> {
        let expected = match self.cached_dimension() {
            Some(d) => d,
            None => self.dimension().await?.ok_or(VectorDbError::NotInitialized)?,
        };
        if doc.embedding.len() != expected {
            return Err(VectorDbError::DimensionMismatch {
                expected,
                actual: doc.embedding.len(),
            }
            .into());
        }
        Ok(())
    }

    fn create_record_batch(doc: &IndexedDocument, schema: Arc<Schema>) -> Result<RecordBatch> {
        let dimension = doc.embedding.len();
        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            std::iter::once(Some(doc.embedding.iter().copied().map(Some))),
            dimension as i32,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(vector_array),
                Arc::new(StringArray::from(vec![doc.id.as_str()])),
                Arc::new(StringArray::from(vec![doc.path.as_str()])),
                Arc::new(StringArray::from(vec![doc.content.as_str()])),
                Arc::new(Int64Array::from(vec![to_millis(doc.indexed_at)])),
                Arc::new(Int64Array::from(vec![to_millis(doc.file_modified_at)])),
                Arc::new(UInt64Array::from(vec![doc.file_size])),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .with_context(|| format!("Missing {} column", name))?
            .as_any()
            .downcast_ref::<StringArray>()
            .with_context(|| format!("Invalid {} type", name))
    }

    fn i64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
        batch
            .column_by_name(name)
            .with_context(|| format!("Missing {} column", name))?
            .as_any()
            .downcast_ref::<Int64Array>()
            .with_context(|| format!("Invalid {} type", name))
    }

    fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<IndexedDocument>> {
        let vectors = batch
            .column_by_name("vector")
            .context("Missing vector column")?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .context("Invalid vector type")?;
        let ids = Self::string_column(batch, "id")?;
        let paths = Self::string_column(batch, "path")?;
        let contents = Self::string_column(batch, "content")?;
        let indexed_at = Self::i64_column(batch, "indexed_at")?;
        let modified_at = Self::i64_column(batch, "file_modified_at")?;
        let sizes = batch
            .column_by_name("file_size")
            .context("Missing file_size column")?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .context("Invalid file_size type")?;

        let mut docs = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let vector = vectors.value(i);
            let values = vector
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("Invalid vector item type")?;

            docs.push(IndexedDocument {
                id: ids.value(i).to_string(),
                path: paths.value(i).to_string(),
                content: contents.value(i).to_string(),
                embedding: values.values().to_vec(),
                indexed_at: from_millis(indexed_at.value(i)),
                file_modified_at: from_millis(modified_at.value(i)),
                file_size: sizes.value(i),
            });
        }
        Ok(docs)
    }

    /// Every stored path; prefix matching happens in Rust so paths containing
    /// SQL wildcard characters are handled literally
    async fn all_paths(&self) -> Result<Vec<String>> {
        let table = self.get_table().await?;
        let mut stream = table
            .query()
            .select(Select::Columns(vec!["path".to_string()]))
            .execute()
            .await
            .context("Failed to query paths")?;

        let mut paths = Vec::new();
        while let Some(batch) = stream.try_next().await.context("Failed to read paths")? {
            let column = Self::string_column(&batch, "path")?;
            paths.extend((0..column.len()).map(|i| column.value(i).to_string()));
        }
        Ok(paths)
    }

    async fn nearest(&self, vector: &[f32], fetch: usize) -> Result<Vec<ScoredDocument>> {
        let table = self.get_table().await?;
        let stream = table
            .vector_search(vector.to_vec())
            .context("Failed to create vector search")?
            .distance_type(lancedb::DistanceType::L2)
            .limit(fetch)
            .execute()
            .await
            .map_err(|e| VectorDbError::QueryFailed(e.to_string()))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to collect search results")?;

        let mut hits = Vec::new();
        for batch in &batches {
            let distances = batch
                .column_by_name("_distance")
                .context("Missing _distance column")?
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("Invalid _distance type")?;

            for (i, document) in Self::batch_to_documents(batch)?.into_iter().enumerate() {
                // Lance reports squared L2
                let distance = distances.value(i).max(0.0).sqrt();
                hits.push(ScoredDocument {
                    document,
                    score: distance_to_score(distance),
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}

fn path_filter(path: &str) -> String {
    format!("path = '{}'", escape(path))
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait::async_trait]
impl VectorStore for LanceStore {
    async fn initialize(&self, dimension: usize) -> Result<()> {
        tracing::info!(
            "Initializing LanceDB with dimension {} at {}",
            dimension,
            self.db_path
        );

        if self.table_exists().await? {
            let existing = self.dimension().await?;
            if let Some(existing) = existing
                && existing != dimension
            {
                return Err(VectorDbError::DimensionMismatch {
                    expected: existing,
                    actual: dimension,
                }
                .into());
            }
            tracing::debug!("Table '{}' already exists", TABLE_NAME);
            return Ok(());
        }

        self.create_table(dimension).await
    }

    async fn reset(&self, dimension: usize) -> Result<()> {
        if self.table_exists().await? {
            self.connection
                .drop_table(TABLE_NAME, &[])
                .await
                .context("Failed to drop table")?;
            tracing::warn!("Dropped all documents from '{}'", TABLE_NAME);
        }
        self.set_cached_dimension(None);
        self.create_table(dimension).await
    }

    async fn dimension(&self) -> Result<Option<usize>> {
        if let Some(d) = self.cached_dimension() {
            return Ok(Some(d));
        }
        if !self.table_exists().await? {
            return Ok(None);
        }

        let schema = self
            .get_table()
            .await?
            .schema()
            .await
            .context("Failed to read table schema")?;
        let dimension = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, n) => Some(*n as usize),
                _ => None,
            });

        self.set_cached_dimension(dimension);
        Ok(dimension)
    }

    async fn insert(&self, doc: &IndexedDocument) -> Result<()> {
        self.check_dimension(doc).await?;
        let schema = Self::create_schema(doc.embedding.len());
        let batch = Self::create_record_batch(doc, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        self.get_table()
            .await?
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| VectorDbError::WriteFailed(e.to_string()))?;

        tracing::debug!("Inserted document: {}", doc.path);
        Ok(())
    }

    async fn update(&self, doc: &IndexedDocument) -> Result<()> {
        self.check_dimension(doc).await?;
        let schema = Self::create_schema(doc.embedding.len());
        let batch = Self::create_record_batch(doc, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![batch].into_iter().map(Ok), schema);

        // Merge on path: the old row stays visible until the new one commits
        let table = self.get_table().await?;
        let mut merge = table.merge_insert(&["path"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| VectorDbError::WriteFailed(e.to_string()))?;

        tracing::debug!("Updated document: {}", doc.path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let table = self.get_table().await?;
        let filter = path_filter(path);

        let existing = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows")?;
        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&filter)
            .await
            .map_err(|e| VectorDbError::DeleteFailed(e.to_string()))?;

        tracing::debug!("Deleted document: {}", path);
        Ok(true)
    }

    async fn delete_by_prefix(&self, root: &str) -> Result<usize> {
        let doomed: Vec<String> = self
            .all_paths()
            .await?
            .into_iter()
            .filter(|p| paths::is_under(p, root))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let table = self.get_table().await?;
        for chunk in doomed.chunks(DELETE_CHUNK) {
            let list = chunk
                .iter()
                .map(|p| format!("'{}'", escape(p)))
                .collect::<Vec<_>>()
                .join(", ");
            table
                .delete(&format!("path IN ({})", list))
                .await
                .map_err(|e| VectorDbError::DeleteFailed(e.to_string()))?;
        }

        tracing::info!("Deleted {} documents under {}", doomed.len(), root);
        Ok(doomed.len())
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<IndexedDocument>> {
        let table = self.get_table().await?;
        let mut stream = table
            .query()
            .only_if(path_filter(path))
            .limit(1)
            .execute()
            .await
            .map_err(|e| VectorDbError::QueryFailed(e.to_string()))?;

        while let Some(batch) = stream.try_next().await.context("Failed to read document")? {
            if let Some(doc) = Self::batch_to_documents(&batch)?.into_iter().next() {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    async fn find_all(&self) -> Result<Vec<IndexedDocument>> {
        let table = self.get_table().await?;
        let mut stream = table
            .query()
            .execute()
            .await
            .map_err(|e| VectorDbError::QueryFailed(e.to_string()))?;

        let mut docs = Vec::new();
        while let Some(batch) = stream.try_next().await.context("Failed to read documents")? {
            docs.extend(Self::batch_to_documents(&batch)?);
        }
        Ok(docs)
    }

    async fn indexed_timestamps(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let table = self.get_table().await?;
        let mut stream = table
            .query()
            .select(Select::Columns(vec![
                "path".to_string(),
                "file_modified_at".to_string(),
            ]))
            .execute()
            .await
            .map_err(|e| VectorDbError::QueryFailed(e.to_string()))?;

        let mut timestamps = HashMap::new();
        while let Some(batch) = stream.try_next().await.context("Failed to read timestamps")? {
            let paths = Self::string_column(&batch, "path")?;
            let modified = Self::i64_column(&batch, "file_modified_at")?;
            for i in 0..batch.num_rows() {
                timestamps.insert(paths.value(i).to_string(), from_millis(modified.value(i)));
            }
        }
        Ok(timestamps)
    }

    async fn find_similar(
        &self,
        vector: &[f32],
        k: usize,
        prefix: Option<&str>,
    ) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let total = self.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let Some(prefix) = prefix else {
            let mut hits = self.nearest(vector, k.min(total)).await?;
            hits.truncate(k);
            return Ok(hits);
        };

        // Widen the candidate pool until k matches are found or the corpus is exhausted
        let mut fetch = k.saturating_mul(PREFIX_OVERFETCH).min(total);
        loop {
            let raw = self.nearest(vector, fetch).await?;
            let exhausted = raw.len() < fetch || fetch >= total;
            let mut filtered: Vec<ScoredDocument> = raw
                .into_iter()
                .filter(|hit| paths::is_under(&hit.document.path, prefix))
                .collect();

            if filtered.len() >= k || exhausted {
                filtered.truncate(k);
                return Ok(filtered);
            }

            tracing::debug!(
                "Prefix search for {} found {}/{} in {} candidates, widening",
                prefix,
                filtered.len(),
                k,
                fetch
            );
            fetch = fetch.saturating_mul(PREFIX_WIDEN).min(total);
        }
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let count = self
            .get_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    async fn count_by_prefix(&self, root: &str) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        Ok(self
            .all_paths()
            .await?
            .iter()
            .filter(|p| paths::is_under(p, root))
            .count())
    }

    async fn clear(&self) -> Result<()> {
        match self.dimension().await? {
            Some(dimension) => self.reset(dimension).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests;

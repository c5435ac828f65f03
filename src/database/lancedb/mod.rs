// LanceDB vector database module
// Embedded on-disk implementation of the vector index

#[cfg(test)]
mod tests;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::vector::{SearchHit, VectorIndex, VectorPoint, check_dimensions};
use crate::{RagError, Result};

pub const DEFAULT_TABLE_NAME: &str = "chunks";

/// Vector index stored in a LanceDB directory
pub struct LanceIndex {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl std::fmt::Debug for LanceIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceIndex")
            .field("table_name", &self.table_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl LanceIndex {
    /// Connect to (or create) the database directory at `path`.
    ///
    /// The collection itself is created by [`VectorIndex::ensure_collection`].
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self> {
        Self::open_table(path, DEFAULT_TABLE_NAME, dimension).await
    }

    #[inline]
    pub async fn open_table<P: AsRef<Path>>(
        path: P,
        table_name: &str,
        dimension: usize,
    ) -> Result<Self> {
        let db_path = path.as_ref();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    /// Create schema with the specified vector dimension
    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("document_id", DataType::Int64, false),
        ]))
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    /// Open the collection, or `None` when it does not exist
    async fn existing_table(&self) -> Result<Option<Table>> {
        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(RagError::Database(format!("Failed to open table: {}", e))),
        }
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self, table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database("Could not find vector column or determine dimension".to_string())
            })
    }

    /// Create a RecordBatch from points
    fn create_record_batch(&self, points: &[VectorPoint]) -> Result<RecordBatch> {
        let len = points.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);
        let mut texts = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);

        for point in points {
            ids.push(point.id.as_str());
            flat_values.extend_from_slice(&point.vector);
            texts.push(point.payload.text.as_str());
            sources.push(point.payload.source.as_str());
            document_ids.push(point.payload.document_id);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(sources)),
            Arc::new(Int64Array::from(document_ids)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
        let ids = string_column(batch, "id")?;
        let texts = string_column(batch, "text")?;
        let sources = string_column(batch, "source")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let hits = (0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

                // cosine distance is 1 - similarity
                SearchHit {
                    text: texts.value(row).to_string(),
                    score: 1.0 - distance,
                    source: sources.value(row).to_string(),
                    point_id: ids.value(row).to_string(),
                }
            })
            .collect();
        Ok(hits)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

#[async_trait]
impl VectorIndex for LanceIndex {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<()> {
        if let Some(table) = self.existing_table().await? {
            let existing = self.detect_existing_vector_dimension(&table).await?;
            if existing != self.dimension {
                return Err(RagError::Config(format!(
                    "Collection '{}' stores {}-dimensional vectors but the embedder produces {}; \
                     purge the index or change the embedding model",
                    self.table_name, existing, self.dimension
                )));
            }
            debug!("Collection {} already exists", self.table_name);
            return Ok(());
        }

        info!(
            "Creating collection {} with {} dimensions",
            self.table_name, self.dimension
        );
        match self
            .connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
        {
            Ok(_) | Err(lancedb::Error::TableAlreadyExists { .. }) => Ok(()),
            Err(e) => Err(RagError::Database(format!("Failed to create table: {}", e))),
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            debug!("No points to store");
            return Ok(());
        }
        check_dimensions(&points, self.dimension)?;

        debug!("Storing batch of {} points", points.len());

        let table = match self.existing_table().await? {
            Some(table) => table,
            None => {
                self.ensure_collection().await?;
                self.existing_table().await?.ok_or_else(|| {
                    RagError::Database(format!("Table {} vanished after creation", self.table_name))
                })?
            }
        };

        let record_batch = self.create_record_batch(&points)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert points: {}", e)))?;

        debug!("Stored {} points", points.len());
        Ok(())
    }

    async fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        allowed_document_ids: &BTreeSet<i64>,
    ) -> Result<Vec<SearchHit>> {
        let Some(table) = self.existing_table().await? else {
            warn!("Collection {} is absent, returning no hits", self.table_name);
            return Ok(Vec::new());
        };

        debug!(
            "Searching {} documents with limit: {}",
            allowed_document_ids.len(),
            top_k
        );

        let filter = format!(
            "document_id IN ({})",
            allowed_document_ids.iter().join(", ")
        );

        let mut results = table
            .vector_search(query)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<()> {
        debug!("Deleting points for document: {}", document_id);

        let Some(table) = self.existing_table().await? else {
            return Ok(());
        };

        table
            .delete(&format!("document_id = {}", document_id))
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to delete document points: {}", e))
            })?;

        info!("Deleted points for document: {}", document_id);
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping collection {}", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let Some(table) = self.existing_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }
}

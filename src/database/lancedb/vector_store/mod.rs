#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info};

use super::{ChunkMetadata, ChunkRecord};
use crate::RagError;

/// Vector store using LanceDB, one table per session collection
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance reported by the store
    pub distance: f32,
    /// `1 - distance`; higher is better
    pub similarity_score: f32,
}

impl VectorStore {
    /// Connect to the LanceDB directory at `db_path`, creating it if needed.
    #[inline]
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self, RagError> {
        let db_path: PathBuf = db_path.as_ref().to_path_buf();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            RagError::StoreOperationFailed(format!(
                "Failed to create vector database directory: {}",
                e
            ))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            RagError::StoreOperationFailed(format!("Failed to connect to LanceDB: {}", e))
        })?;

        info!("Vector store initialized successfully");
        Ok(Self { connection })
    }

    /// List the names of all collections in the store.
    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::StoreOperationFailed(format!("Failed to list tables: {}", e)))
    }

    #[inline]
    pub async fn collection_exists(&self, name: &str) -> Result<bool, RagError> {
        Ok(self.list_collections().await?.iter().any(|n| n == name))
    }

    /// Create a collection with the given vector dimension if it does not
    /// exist. Create racing create is idempotent: the loser observes the
    /// winner's table.
    #[inline]
    pub async fn create_collection_if_absent(
        &self,
        name: &str,
        vector_dimension: usize,
    ) -> Result<(), RagError> {
        if self.collection_exists(name).await? {
            debug!("Collection {} already exists", name);
            return Ok(());
        }

        let schema = collection_schema(vector_dimension);
        match self
            .connection
            .create_empty_table(name, schema)
            .execute()
            .await
        {
            Ok(_) => {
                info!(
                    "Created collection {} with {} dimensions",
                    name, vector_dimension
                );
                Ok(())
            }
            Err(e) => {
                // A concurrent creator may have won the race.
                if self.collection_exists(name).await? {
                    debug!("Collection {} created concurrently", name);
                    Ok(())
                } else {
                    Err(RagError::StoreOperationFailed(format!(
                        "Failed to create collection {}: {}",
                        name, e
                    )))
                }
            }
        }
    }

    /// Upsert chunk records into a collection, keyed by chunk id.
    /// Re-storing an existing id overwrites the stored row. Creates the
    /// collection lazily from the first record's dimension.
    #[inline]
    pub async fn upsert_chunks(
        &self,
        name: &str,
        records: &[ChunkRecord],
    ) -> Result<(), RagError> {
        let Some(first) = records.first() else {
            debug!("No chunks to store in {}", name);
            return Ok(());
        };

        self.create_collection_if_absent(name, first.vector.len())
            .await?;

        let record_batch = create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let table = self.open_collection(name).await?;

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge.execute(Box::new(reader)).await.map_err(|e| {
            RagError::StoreOperationFailed(format!(
                "Failed to upsert chunks into {}: {}",
                name, e
            ))
        })?;

        info!("Stored {} chunks in collection {}", records.len(), name);
        Ok(())
    }

    /// Nearest-neighbor search over one collection, ranked ascending by
    /// cosine distance.
    #[inline]
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, RagError> {
        debug!("Searching {} with limit {}", name, limit);

        let table = self.open_collection(name).await?;

        let query = table
            .vector_search(query_vector)
            .map_err(|e| {
                RagError::StoreOperationFailed(format!("Failed to create vector search: {}", e))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        let mut results = query.execute().await.map_err(|e| {
            RagError::StoreOperationFailed(format!("Failed to execute search: {}", e))
        })?;

        let mut search_results = Vec::new();
        while let Some(batch) = results.try_next().await.map_err(|e| {
            RagError::StoreOperationFailed(format!("Failed to read result stream: {}", e))
        })? {
            search_results.extend(parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", search_results.len());
        Ok(search_results)
    }

    /// Number of chunks stored in a collection.
    #[inline]
    pub async fn count(&self, name: &str) -> Result<u64, RagError> {
        let table = self.open_collection(name).await?;

        let count = table.count_rows(None).await.map_err(|e| {
            RagError::StoreOperationFailed(format!("Failed to count rows in {}: {}", name, e))
        })?;

        Ok(count as u64)
    }

    /// Drop a collection. Missing collections are treated as already
    /// dropped.
    #[inline]
    pub async fn drop_collection(&self, name: &str) -> Result<(), RagError> {
        if !self.collection_exists(name).await? {
            debug!("Collection {} does not exist, nothing to drop", name);
            return Ok(());
        }

        self.connection.drop_table(name).await.map_err(|e| {
            RagError::StoreOperationFailed(format!("Failed to drop collection {}: {}", name, e))
        })?;

        info!("Dropped collection {}", name);
        Ok(())
    }

    async fn open_collection(&self, name: &str) -> Result<lancedb::Table, RagError> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| {
                RagError::StoreOperationFailed(format!(
                    "Failed to open collection {}: {}",
                    name, e
                ))
            })
    }
}

fn collection_schema(vector_dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dimension as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("session_id", DataType::Utf8, false),
        Field::new("source_url", DataType::Utf8, false),
        Field::new("document_title", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("token_count", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[ChunkRecord]) -> Result<RecordBatch, RagError> {
    let len = records.len();
    let vector_dimension = records.first().map_or(0, |r| r.vector.len());

    let mut ids = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut session_ids = Vec::with_capacity(len);
    let mut source_urls = Vec::with_capacity(len);
    let mut document_titles = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut token_counts = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dimension);

    for record in records {
        if record.vector.len() != vector_dimension {
            return Err(RagError::StoreOperationFailed(format!(
                "Embedding dimension mismatch within batch: {} vs {}",
                record.vector.len(),
                vector_dimension
            )));
        }

        ids.push(record.id.as_str());
        contents.push(record.content.as_str());
        session_ids.push(record.metadata.session_id.as_str());
        source_urls.push(record.metadata.source_url.as_str());
        document_titles.push(record.metadata.document_title.as_str());
        chunk_indices.push(record.metadata.chunk_index);
        token_counts.push(record.metadata.token_count);
        created_ats.push(record.metadata.created_at.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        vector_dimension as i32,
        Arc::new(values_array),
        None,
    )
    .map_err(|e| RagError::StoreOperationFailed(format!("Failed to create vector array: {}", e)))?;

    let schema = collection_schema(vector_dimension);
    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(session_ids)),
        Arc::new(StringArray::from(source_urls)),
        Arc::new(StringArray::from(document_titles)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(UInt32Array::from(token_counts)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::StoreOperationFailed(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreOperationFailed(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StoreOperationFailed(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StoreOperationFailed(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::StoreOperationFailed(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>, RagError> {
    let contents = string_column(batch, "content")?;
    let session_ids = string_column(batch, "session_id")?;
    let source_urls = string_column(batch, "source_url")?;
    let document_titles = string_column(batch, "document_title")?;
    let created_ats = string_column(batch, "created_at")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let token_counts = u32_column(batch, "token_count")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut search_results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata = ChunkMetadata {
            session_id: session_ids.value(row).to_string(),
            source_url: source_urls.value(row).to_string(),
            document_title: document_titles.value(row).to_string(),
            chunk_index: chunk_indices.value(row),
            token_count: token_counts.value(row),
            created_at: created_ats.value(row).to_string(),
        };

        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        search_results.push(SearchResult {
            content: contents.value(row).to_string(),
            metadata,
            distance,
            similarity_score: 1.0 - distance,
        });
    }

    Ok(search_results)
}

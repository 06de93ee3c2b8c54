// LanceDB vector database module
// One table per session collection; upsert-by-id and cosine similarity search

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{SearchResult, VectorStore};

/// A chunk plus its embedding, ready to upsert into a session collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier within the collection; re-storing an id overwrites
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// The chunk text
    pub content: String,
    /// Metadata stored alongside the chunk
    pub metadata: ChunkMetadata,
}

/// Metadata attached to a stored chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Session this chunk belongs to
    pub session_id: String,
    /// URL of the source document
    pub source_url: String,
    /// Title of the source document (may be empty)
    pub document_title: String,
    /// Ordinal position of this chunk within the document
    pub chunk_index: u32,
    /// Token count of the chunk text
    pub token_count: u32,
    /// RFC 3339 timestamp when this chunk was created
    pub created_at: String,
}

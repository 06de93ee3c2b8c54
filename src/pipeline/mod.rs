// Ingestion and retrieval pipelines
// Composes the tokenizer, chunker, embedding client, and session index
// manager into the two document-level operations

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::RagError;
use crate::chunking::{self, ChunkingConfig};
use crate::config::Config;
use crate::database::lancedb::{ChunkMetadata, ChunkRecord, SearchResult, VectorStore};
use crate::database::sqlite::Database;
use crate::embeddings::OllamaClient;
use crate::sessions::{CleanupSummary, SessionIndexManager, SessionInfo};
use crate::tokenizer::TokenCounter;

const MAX_RESULTS_LIMIT: usize = 20;

/// Document ingestion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub content: String,
    pub session_id: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub title: String,
}

/// Retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub session_id: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub similarity_threshold: f32,
}

fn default_max_results() -> usize {
    5
}

/// Per-document chunking and embedding statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source_url: String,
    pub title: String,
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub average_chunk_size: usize,
}

/// Result of one successful ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub session_id: String,
    pub collection_name: String,
    pub document: DocumentSummary,
    pub embedding_dimensions: usize,
}

/// One retrieved chunk. Ranks are assigned before threshold filtering,
/// so a filtered response can contain gaps in the rank sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    pub content: String,
    pub similarity_score: f32,
    pub metadata: ChunkMetadata,
}

/// Result of one retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOutcome {
    pub query: String,
    pub session_id: String,
    pub results: Vec<RankedResult>,
    pub total_results: usize,
    pub total_chunks_searched: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reachability of each backing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatuses {
    pub api: String,
    pub vector_store: String,
    pub embedding_model: String,
    pub tokenizer: String,
}

/// Effective chunking and embedding settings, echoed for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfigEcho {
    pub embedding_model: String,
    pub chunk_target_tokens: usize,
    pub chunk_min_tokens: usize,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub session_cleanup_hours: u64,
}

/// Health probe outcome. Reports degraded dependencies instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub services: ServiceStatuses,
    pub rag_config: RagConfigEcho,
}

/// The assembled service: every HTTP operation is a method here.
#[derive(Clone)]
pub struct RagService {
    config: Config,
    ollama: OllamaClient,
    sessions: SessionIndexManager,
    token_counter: TokenCounter,
}

impl RagService {
    /// Assemble the service from validated configuration, opening the
    /// registry database and vector store under the configured data
    /// directory.
    #[inline]
    pub async fn new(config: Config) -> Result<Self, RagError> {
        std::fs::create_dir_all(config.get_base_dir())?;

        let database = Database::new(config.database_path())
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;
        let vector_store = VectorStore::connect(config.vector_database_path()).await?;
        let ollama = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Config(e.to_string()))?;

        let sessions = SessionIndexManager::new(
            database,
            vector_store,
            config.ollama.embedding_dimension as usize,
            config.session,
        );

        info!("RAG service initialized (model: {})", ollama.model());

        Ok(Self {
            config,
            ollama,
            sessions,
            token_counter: TokenCounter::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn chunking_config(&self) -> &ChunkingConfig {
        &self.config.chunking
    }

    /// Chunk, embed, and store one document into the session's collection.
    /// Embedding failure leaves the collection untouched.
    #[inline]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError> {
        if request.content.trim().is_empty() {
            return Err(RagError::InvalidInput("Content cannot be empty".to_string()));
        }
        if request.session_id.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Session ID cannot be empty".to_string(),
            ));
        }

        let chunks = chunking::chunk_text(
            &request.content,
            &self.config.chunking,
            &self.token_counter,
        );
        if chunks.is_empty() {
            return Err(RagError::NoChunksProduced);
        }
        debug!(
            "Document from {} produced {} chunks",
            request.source_url,
            chunks.len()
        );

        let embeddings = self.embed_batch(chunks.clone()).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        let embedding_dimensions = embeddings.first().map_or(0, Vec::len);

        let created_at = chrono::Utc::now().to_rfc3339();
        let mut total_tokens = 0usize;
        let mut records = Vec::with_capacity(chunks.len());

        for (index, (chunk, vector)) in chunks.into_iter().zip(embeddings).enumerate() {
            let token_count = self.token_counter.count(&chunk);
            total_tokens += token_count;

            let suffix = Uuid::new_v4().simple().to_string();
            records.push(ChunkRecord {
                id: format!("{}_{}_{}", request.source_url, index, &suffix[..8]),
                vector,
                content: chunk,
                metadata: ChunkMetadata {
                    session_id: request.session_id.clone(),
                    source_url: request.source_url.clone(),
                    document_title: request.title.clone(),
                    chunk_index: index as u32,
                    token_count: token_count as u32,
                    created_at: created_at.clone(),
                },
            });
        }

        let total_chunks = records.len();
        let storage = self.sessions.store(&request.session_id, &records).await?;

        info!(
            "Ingested document from {} into {} ({} chunks, {} tokens)",
            request.source_url, storage.collection_name, total_chunks, total_tokens
        );

        Ok(IngestOutcome {
            session_id: request.session_id,
            collection_name: storage.collection_name,
            document: DocumentSummary {
                source_url: request.source_url,
                title: request.title,
                total_chunks,
                total_tokens,
                average_chunk_size: total_tokens / total_chunks.max(1),
            },
            embedding_dimensions,
        })
    }

    /// Embed the query and return the session's most similar chunks,
    /// ranked by similarity and filtered by the caller's threshold.
    #[inline]
    pub async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveOutcome, RagError> {
        if request.query.trim().is_empty() {
            return Err(RagError::InvalidInput("Query cannot be empty".to_string()));
        }
        if request.session_id.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "Session ID cannot be empty".to_string(),
            ));
        }
        if request.max_results == 0 || request.max_results > MAX_RESULTS_LIMIT {
            return Err(RagError::InvalidInput(format!(
                "max_results must be between 1 and {}",
                MAX_RESULTS_LIMIT
            )));
        }
        if !(0.0..=1.0).contains(&request.similarity_threshold) {
            return Err(RagError::InvalidInput(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        let query_embedding = self.embed_one(request.query.clone()).await?;

        let outcome = self
            .sessions
            .search(&request.session_id, &query_embedding, request.max_results)
            .await?;

        if !outcome.collection_exists {
            return Ok(RetrieveOutcome {
                query: request.query,
                session_id: request.session_id,
                results: Vec::new(),
                total_results: 0,
                total_chunks_searched: 0,
                message: Some("No documents found for this session".to_string()),
            });
        }

        let results = rank_and_filter(outcome.results, request.similarity_threshold);

        let total_results = results.len();
        debug!(
            "Retrieved {} results for session {} ({} chunks searched)",
            total_results, request.session_id, outcome.total_chunks_searched
        );

        Ok(RetrieveOutcome {
            query: request.query,
            session_id: request.session_id,
            results,
            total_results,
            total_chunks_searched: outcome.total_chunks_searched,
            message: None,
        })
    }

    /// Delete expired session collections.
    #[inline]
    pub async fn cleanup(&self) -> Result<CleanupSummary, RagError> {
        self.sessions
            .delete_expired(chrono::Utc::now().naive_utc())
            .await
    }

    #[inline]
    pub async fn session_info(&self, session_id: &str) -> Result<SessionInfo, RagError> {
        self.sessions.describe_session(session_id).await
    }

    #[inline]
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        self.sessions.delete_session(session_id).await
    }

    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, RagError> {
        self.sessions.list_sessions().await
    }

    /// Probe every backing service. Never returns an error: unreachable
    /// dependencies are reported as "down" with a degraded overall status.
    #[inline]
    pub async fn health(&self) -> HealthReport {
        let vector_store = match self.list_sessions().await {
            Ok(_) => "up",
            Err(e) => {
                warn!("Vector store health probe failed: {}", e);
                "down"
            }
        };

        let ollama = self.ollama.clone();
        let embedding_model =
            match tokio::task::spawn_blocking(move || ollama.health_check()).await {
                Ok(Ok(())) => "up",
                Ok(Err(e)) => {
                    warn!("Embedding model health probe failed: {}", e);
                    "down"
                }
                Err(e) => {
                    warn!("Embedding model health probe panicked: {}", e);
                    "down"
                }
            };

        let tokenizer = if self.token_counter.is_exact() {
            "up"
        } else {
            "down"
        };

        let status = if vector_store == "up" && embedding_model == "up" && tokenizer == "up" {
            "healthy"
        } else {
            "degraded"
        };

        HealthReport {
            status: status.to_string(),
            services: ServiceStatuses {
                api: "up".to_string(),
                vector_store: vector_store.to_string(),
                embedding_model: embedding_model.to_string(),
                tokenizer: tokenizer.to_string(),
            },
            rag_config: RagConfigEcho {
                embedding_model: self.ollama.model().to_string(),
                chunk_target_tokens: self.config.chunking.target_tokens,
                chunk_min_tokens: self.config.chunking.min_tokens,
                chunk_max_tokens: self.config.chunking.max_tokens,
                chunk_overlap_tokens: self.config.chunking.overlap_tokens,
                session_cleanup_hours: self.config.session.cleanup_hours,
            },
        }
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RagError> {
        let ollama = self.ollama.clone();
        tokio::task::spawn_blocking(move || ollama.embed_batch(&texts))
            .await
            .map_err(|e| RagError::EmbeddingFailed(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, RagError> {
        let ollama = self.ollama.clone();
        tokio::task::spawn_blocking(move || ollama.embed_one(&text))
            .await
            .map_err(|e| RagError::EmbeddingFailed(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))
    }
}

/// Assign 1-based ranks in the raw similarity order, then drop results
/// below the threshold. Ranks keep their pre-filter positions, so a
/// filtered list can contain gaps.
fn rank_and_filter(results: Vec<SearchResult>, similarity_threshold: f32) -> Vec<RankedResult> {
    results
        .into_iter()
        .enumerate()
        .map(|(i, r)| RankedResult {
            rank: i + 1,
            content: r.content,
            similarity_score: r.similarity_score,
            metadata: r.metadata,
        })
        .filter(|r| r.similarity_score >= similarity_threshold)
        .collect()
}

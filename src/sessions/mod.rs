// Session index manager
// Maps session identifiers to isolated vector collections and manages
// their lifecycle: lazy creation, storage, search, expiry sweeps

#[cfg(test)]
mod tests;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::RagError;
use crate::config::SessionConfig;
use crate::database::lancedb::{ChunkRecord, SearchResult, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{NewSession, Session};

const COLLECTION_PREFIX: &str = "session_";

/// Deterministic collection name for a session identifier: every
/// character outside `[A-Za-z0-9_-]` becomes `_`, prefixed with the
/// session namespace.
///
/// Distinct raw identifiers can sanitize to the same name and will then
/// share one collection. Accepted collision risk.
#[inline]
pub fn collection_name_for(session_id: &str) -> String {
    let sanitized: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", COLLECTION_PREFIX, sanitized)
}

/// Storage outcome for one ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSummary {
    pub chunks_stored: usize,
    pub collection_name: String,
    pub session_id: String,
}

/// Raw search outcome before ranking/thresholding
#[derive(Debug, Clone)]
pub struct SessionSearchOutcome {
    pub results: Vec<SearchResult>,
    pub total_chunks_searched: u64,
    pub collection_exists: bool,
}

/// Existence, size, and metadata of one session's collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub collection_name: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedCollection {
    pub name: String,
    pub session_id: String,
    pub created_at: NaiveDateTime,
}

/// Summary of one TTL sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub collections_checked: usize,
    pub collections_deleted: usize,
    pub deleted_collections: Vec<DeletedCollection>,
    pub errors: Vec<String>,
}

/// Owns the mapping from session identifier to isolated vector
/// collection. The registry row is the source of truth for collection
/// metadata; the vector table holds the chunks.
#[derive(Clone)]
pub struct SessionIndexManager {
    database: Database,
    vector_store: VectorStore,
    embedding_dimension: usize,
    session_config: SessionConfig,
}

impl SessionIndexManager {
    #[inline]
    pub fn new(
        database: Database,
        vector_store: VectorStore,
        embedding_dimension: usize,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            database,
            vector_store,
            embedding_dimension,
            session_config,
        }
    }

    /// Fetch the session's collection, creating it lazily on first use.
    /// Safe to call concurrently for the same session: the registry's
    /// unique constraint keeps at most one row per collection name, and
    /// a losing creator observes the winner's collection.
    #[inline]
    pub async fn get_or_create(&self, session_id: &str) -> Result<Session, RagError> {
        let collection_name = collection_name_for(session_id);
        let created_at = Utc::now().naive_utc();

        let session = self
            .database
            .register_session(NewSession {
                session_id: session_id.to_string(),
                collection_name: collection_name.clone(),
                created_at,
                expires_at: created_at + self.session_config.ttl(),
            })
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;

        self.vector_store
            .create_collection_if_absent(&collection_name, self.embedding_dimension)
            .await?;

        debug!(
            "Session {} maps to collection {}",
            session_id, collection_name
        );
        Ok(session)
    }

    /// Upsert processed chunks into the session's collection.
    #[inline]
    pub async fn store(
        &self,
        session_id: &str,
        records: &[ChunkRecord],
    ) -> Result<StorageSummary, RagError> {
        if records.is_empty() {
            return Err(RagError::InvalidInput("No chunks to store".to_string()));
        }

        let session = self.get_or_create(session_id).await?;
        self.vector_store
            .upsert_chunks(&session.collection_name, records)
            .await?;

        info!(
            "Stored {} chunks in collection {}",
            records.len(),
            session.collection_name
        );

        Ok(StorageSummary {
            chunks_stored: records.len(),
            collection_name: session.collection_name,
            session_id: session_id.to_string(),
        })
    }

    /// Similarity search within one session's collection. A missing
    /// collection is a normal empty outcome, not an error.
    #[inline]
    pub async fn search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        max_results: usize,
    ) -> Result<SessionSearchOutcome, RagError> {
        let collection_name = collection_name_for(session_id);

        if !self.vector_store.collection_exists(&collection_name).await? {
            warn!("Collection {} not found", collection_name);
            return Ok(SessionSearchOutcome {
                results: Vec::new(),
                total_chunks_searched: 0,
                collection_exists: false,
            });
        }

        let results = self
            .vector_store
            .search(&collection_name, query_embedding, max_results)
            .await?;
        let total_chunks_searched = self.vector_store.count(&collection_name).await?;

        Ok(SessionSearchOutcome {
            results,
            total_chunks_searched,
            collection_exists: true,
        })
    }

    /// Delete one session's collection and registry row. Returns whether
    /// anything existed; not-found is a normal result.
    #[inline]
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, RagError> {
        let collection_name = collection_name_for(session_id);

        let table_existed = self.vector_store.collection_exists(&collection_name).await?;
        self.vector_store.drop_collection(&collection_name).await?;

        let row_existed = self
            .database
            .delete_session(&collection_name)
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;

        if table_existed || row_existed {
            info!("Deleted collection {}", collection_name);
        }
        Ok(table_existed || row_existed)
    }

    /// Describe one session's collection. Not-found is reported via
    /// `exists: false`, never as an error.
    #[inline]
    pub async fn describe_session(&self, session_id: &str) -> Result<SessionInfo, RagError> {
        let collection_name = collection_name_for(session_id);

        let session = self
            .database
            .get_session(&collection_name)
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;

        let Some(session) = session else {
            return Ok(SessionInfo {
                session_id: session_id.to_string(),
                collection_name,
                exists: false,
                chunk_count: None,
                created_at: None,
                expires_at: None,
                message: Some("Collection not found".to_string()),
            });
        };

        let chunk_count = if self.vector_store.collection_exists(&collection_name).await? {
            Some(self.vector_store.count(&collection_name).await?)
        } else {
            Some(0)
        };

        Ok(SessionInfo {
            session_id: session_id.to_string(),
            collection_name,
            exists: true,
            chunk_count,
            created_at: Some(session.created_at),
            expires_at: Some(session.expires_at),
            message: None,
        })
    }

    /// Describe all managed session collections.
    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, RagError> {
        let sessions = self
            .database
            .list_sessions()
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            let chunk_count = if self
                .vector_store
                .collection_exists(&session.collection_name)
                .await?
            {
                Some(self.vector_store.count(&session.collection_name).await?)
            } else {
                Some(0)
            };

            infos.push(SessionInfo {
                session_id: session.session_id,
                collection_name: session.collection_name,
                exists: true,
                chunk_count,
                created_at: Some(session.created_at),
                expires_at: Some(session.expires_at),
                message: None,
            });
        }

        Ok(infos)
    }

    /// Delete every collection whose TTL has elapsed. Individual
    /// deletion failures are collected and do not abort the sweep.
    #[inline]
    pub async fn delete_expired(&self, now: NaiveDateTime) -> Result<CleanupSummary, RagError> {
        let all_sessions = self
            .database
            .list_sessions()
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;

        let mut summary = CleanupSummary {
            collections_checked: all_sessions.len(),
            ..CleanupSummary::default()
        };

        for session in all_sessions {
            if !session.is_expired(now) {
                continue;
            }

            match self.delete_one_expired(&session).await {
                Ok(()) => {
                    summary.collections_deleted += 1;
                    summary.deleted_collections.push(DeletedCollection {
                        name: session.collection_name.clone(),
                        session_id: session.session_id.clone(),
                        created_at: session.created_at,
                    });
                    info!("Deleted old collection: {}", session.collection_name);
                }
                Err(e) => {
                    let error_msg = format!(
                        "Error processing collection {}: {}",
                        session.collection_name, e
                    );
                    error!("{}", error_msg);
                    summary.errors.push(error_msg);
                }
            }
        }

        info!(
            "Cleanup complete: {} collections deleted",
            summary.collections_deleted
        );
        Ok(summary)
    }

    async fn delete_one_expired(&self, session: &Session) -> Result<(), RagError> {
        self.vector_store
            .drop_collection(&session.collection_name)
            .await?;
        self.database
            .delete_session(&session.collection_name)
            .await
            .map_err(|e| RagError::StoreOperationFailed(e.to_string()))?;
        Ok(())
    }
}

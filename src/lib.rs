use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Error taxonomy surfaced at the pipeline boundary. Internal errors are
/// converted into one of these kinds with a human-readable message.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Failed to generate embeddings: {0}")]
    EmbeddingFailed(String),

    #[error("No valid chunks created from document content")]
    NoChunksProduced,

    #[error("Vector store operation failed: {0}")]
    StoreOperationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod pipeline;
pub mod server;
pub mod sessions;
pub mod tokenizer;

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Generation service error: {0}")]
    GenerationService(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persistence failure for a location that holds no index yet
    #[error("No vector index found at {}; build the index first", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Prompt too large: {needed} characters exceeds the limit of {limit}")]
    PromptTooLarge { needed: usize, limit: usize },

    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("A rebuild of the vector index is already in progress")]
    RebuildInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod ollama;
pub mod pipeline;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

// Embeddings module
// Content chunking and the embedding service client

pub mod chunking;
pub mod ollama;

pub use chunking::{Chunk, ChunkingConfig, TextWindow, split_documents, split_text};
pub use ollama::OllamaEmbedder;

use crate::Result;

/// Converts texts into embedding vectors, one per input and in input order.
///
/// Indexing and querying must go through an embedder reporting the same model.
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

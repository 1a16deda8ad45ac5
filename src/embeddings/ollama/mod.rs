
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Embedder;
use crate::config::{EmbeddingConfig, OllamaConfig};
use crate::ollama::{OllamaClient, Service};
use crate::{RagError, Result};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

/// Embedding client for the Ollama `/api/embed` endpoint
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    batch_size: u32,
    dimension: u32,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(ollama: &OllamaConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        Ok(Self::with_client(OllamaClient::new(ollama)?, embedding))
    }

    #[inline]
    pub fn with_client(client: OllamaClient, embedding: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: embedding.model.clone(),
            batch_size: embedding.batch_size.max(1),
            dimension: embedding.dimension,
        }
    }

    /// Generate the embedding for a single text
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.generate_embeddings_single_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::EmbeddingService("Empty embedding response".to_string()))
    }

    /// Generate embeddings for multiple texts, `batch_size` texts per request
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.generate_embeddings_single_batch(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            model: &self.model,
            inputs: texts,
        };

        let response: BatchEmbedResponse =
            self.client
                .post_json("/api/embed", &request, Service::Embedding, "embedding")?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        if let Some(bad) = response
            .embeddings
            .iter()
            .find(|e| e.len() != self.dimension as usize)
        {
            return Err(RagError::EmbeddingService(format!(
                "Model {} returned a {}-dimensional vector, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        Ok(response.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
    }
}

// In-memory vector index with exact nearest-neighbour search.
// Persistence lives in `store`.


pub mod store;

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::embeddings::Chunk;
use crate::{RagError, Result};

/// One indexed chunk and its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// Search result from [`VectorIndex::retrieve`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Squared Euclidean distance to the query; 0 for an exact match
    pub distance: f32,
    /// `1 / (1 + distance)`, higher is better
    pub similarity: f32,
}

/// Flat L2 index over chunk embeddings. Entries keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    embedding_model: String,
    dimension: usize,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build a fresh index from embedded chunks
    #[inline]
    pub fn build(
        embedding_model: impl Into<String>,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<Self> {
        let entries = entries
            .into_iter()
            .map(|(chunk, vector)| IndexEntry {
                id: Uuid::new_v4(),
                vector,
                chunk,
            })
            .collect();

        let index = Self::from_entries(embedding_model.into(), Utc::now(), entries)?;
        debug!(
            "Built vector index with {} entries of dimension {}",
            index.len(),
            index.dimension
        );
        Ok(index)
    }

    /// Assemble an index from existing entries, checking every vector has the same finite dimension
    pub(crate) fn from_entries(
        embedding_model: String,
        built_at: DateTime<Utc>,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        let dimension = entries
            .first()
            .map(|e| e.vector.len())
            .ok_or_else(|| RagError::Config("Cannot build an index without entries".to_string()))?;

        if dimension == 0 {
            return Err(RagError::Config(
                "Embedding vectors must not be empty".to_string(),
            ));
        }

        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(RagError::Config(format!(
                    "Inconsistent embedding dimensions: expected {}, got {} for {}",
                    dimension,
                    entry.vector.len(),
                    entry.chunk.source.display()
                )));
            }
            if entry.vector.iter().any(|v| !v.is_finite()) {
                return Err(RagError::Config(format!(
                    "Embedding for chunk {} of {} contains non-finite values",
                    entry.chunk.chunk_index,
                    entry.chunk.source.display()
                )));
            }
        }

        Ok(Self {
            embedding_model,
            dimension,
            built_at,
            entries,
        })
    }

    /// Return the `k` entries closest to `query`, nearest first.
    ///
    /// Ties keep insertion order. `k` larger than the index is capped to its size.
    #[inline]
    pub fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(RagError::Config(
                "Number of chunks to retrieve must be at least 1".to_string(),
            ));
        }

        if query.len() != self.dimension {
            return Err(RagError::Config(format!(
                "Query vector has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, squared_l2(query, &entry.vector)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        let results: Vec<RetrievedChunk> = scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| RetrievedChunk {
                chunk: self.entries[i].chunk.clone(),
                distance,
                similarity: 1.0 / (1.0 + distance),
            })
            .collect();

        debug!(
            "Retrieved {} of {} entries (k = {})",
            results.len(),
            self.entries.len(),
            k
        );
        Ok(results)
    }

    /// Write the index to `location`, replacing whatever was stored there
    #[inline]
    pub fn persist(&self, location: &Path) -> Result<()> {
        store::persist(self, location)
    }

    /// Read an index previously written with [`VectorIndex::persist`]
    #[inline]
    pub fn load(location: &Path) -> Result<Self> {
        store::load(location)
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

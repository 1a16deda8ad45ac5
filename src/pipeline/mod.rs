// Pipeline module
// Owns the current vector index and coordinates rebuilds and questions


use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::documents::{PdfTextExtractor, TextExtractor, load_documents};
use crate::embeddings::{Embedder, OllamaEmbedder, split_documents};
use crate::generation::{Answer, Backend, OllamaGenerator, TextGenerator, assemble_prompt};
use crate::index::{VectorIndex, store};
use crate::{RagError, Result};

/// The external collaborators a pipeline talks to
#[derive(Clone)]
pub struct Clients {
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub llama: Arc<dyn TextGenerator>,
    pub mistral: Arc<dyn TextGenerator>,
}

impl Clients {
    /// PDF extraction plus Ollama-backed embedding and generation
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            extractor: Arc::new(PdfTextExtractor),
            embedder: Arc::new(OllamaEmbedder::new(&config.ollama, &config.embedding)?),
            llama: Arc::new(OllamaGenerator::for_backend(
                &config.ollama,
                &config.generation,
                Backend::Llama,
            )?),
            mistral: Arc::new(OllamaGenerator::for_backend(
                &config.ollama,
                &config.generation,
                Backend::Mistral,
            )?),
        })
    }

    #[inline]
    pub fn generator(&self, backend: Backend) -> Arc<dyn TextGenerator> {
        match backend {
            Backend::Llama => Arc::clone(&self.llama),
            Backend::Mistral => Arc::clone(&self.mistral),
        }
    }
}

/// Outcome of a successful rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

pub struct Pipeline {
    config: Config,
    clients: Clients,
    index: RwLock<Option<Arc<VectorIndex>>>,
    rebuild_lock: Mutex<()>,
}

impl Pipeline {
    #[inline]
    pub fn new(config: Config, clients: Clients) -> Self {
        Self {
            config,
            clients,
            index: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn from_config(config: Config) -> Result<Self> {
        let clients = Clients::from_config(&config)?;
        Ok(Self::new(config, clients))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of the index currently in memory, if any
    #[inline]
    pub async fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().await.clone()
    }

    /// Load the persisted index into memory, replacing the current one.
    ///
    /// Fails with `IndexNotFound` when nothing was persisted yet, and with a
    /// configuration error when the index was built by a different embedding model.
    #[inline]
    pub async fn load_persisted(&self) -> Result<Arc<VectorIndex>> {
        let location = self.config.storage.index_dir.clone();
        let index = self
            .run_blocking("load vector index", self.io_timeout(), move || {
                VectorIndex::load(&location)
            })
            .await?;

        let configured = self.clients.embedder.model();
        if index.embedding_model() != configured {
            return Err(RagError::Config(format!(
                "Index was built with embedding model '{}' but '{}' is configured; rebuild the index",
                index.embedding_model(),
                configured
            )));
        }

        let index = Arc::new(index);
        *self.index.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Re-ingest every document and replace the persisted index.
    ///
    /// Nothing is replaced unless every step succeeds. Only one rebuild may run at a time.
    #[inline]
    pub async fn rebuild_index(&self) -> Result<RebuildStats> {
        let _guard = self
            .rebuild_lock
            .try_lock()
            .map_err(|_| RagError::RebuildInProgress)?;

        info!(
            "Rebuilding vector index from {}",
            self.config.storage.documents_dir.display()
        );

        let documents_dir = self.config.storage.documents_dir.clone();
        let extractor = Arc::clone(&self.clients.extractor);
        let documents = self
            .run_blocking("load documents", self.io_timeout(), move || {
                load_documents(&documents_dir, extractor.as_ref())
            })
            .await?;

        let chunks = split_documents(&documents, &self.config.chunking)?;
        info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batches = texts
            .len()
            .div_ceil(self.config.embedding.batch_size.max(1) as usize);
        let embedder = Arc::clone(&self.clients.embedder);
        let vectors = self
            .run_blocking(
                "embed document chunks",
                self.request_timeout().saturating_mul(batches.max(1) as u32),
                move || embedder.embed(&texts),
            )
            .await?;

        if vectors.len() != chunks.len() {
            return Err(RagError::EmbeddingService(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let chunk_count = chunks.len();
        let index = Arc::new(VectorIndex::build(
            self.clients.embedder.model(),
            chunks.into_iter().zip(vectors).collect(),
        )?);

        // Joined even on timeout, so the guard outlives the writer
        let location = self.config.storage.index_dir.clone();
        let to_persist = Arc::clone(&index);
        self.run_cancellable("persist vector index", self.io_timeout(), move |cancel| {
            store::persist_unless_cancelled(&to_persist, &location, cancel)
        })
        .await?;

        let stats = RebuildStats {
            documents: documents.len(),
            chunks: chunk_count,
            dimension: index.dimension(),
        };
        *self.index.write().await = Some(index);

        info!(
            "Vector index rebuilt: {} documents, {} chunks, dimension {}",
            stats.documents, stats.chunks, stats.dimension
        );
        Ok(stats)
    }

    /// Answer `question` from the `top_k` closest chunks (the configured default when `None`)
    #[inline]
    pub async fn answer(
        &self,
        question: &str,
        backend: Backend,
        top_k: Option<usize>,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Config("Question must not be empty".to_string()));
        }

        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        if k == 0 {
            return Err(RagError::Config(
                "Number of chunks to retrieve must be at least 1".to_string(),
            ));
        }

        let index = match self.current_index().await {
            Some(index) => index,
            None => self.load_persisted().await?,
        };

        let embedder = Arc::clone(&self.clients.embedder);
        let query = vec![question.to_string()];
        let query_vector = self
            .run_blocking("embed question", self.request_timeout(), move || {
                embedder.embed(&query)
            })
            .await?
            .pop()
            .ok_or_else(|| {
                RagError::EmbeddingService("No embedding returned for the question".to_string())
            })?;

        let retrieved = index.retrieve(&query_vector, k)?;
        let prompt = assemble_prompt(&retrieved, question, self.config.retrieval.max_prompt_chars)?;
        debug!(
            "Prompt uses {} chunks ({} dropped)",
            prompt.chunks.len(),
            prompt.dropped
        );

        let generator = self.clients.generator(backend);
        let model = generator.model().to_string();
        let prompt_text = prompt.text;
        let text = self
            .run_blocking("generate answer", self.request_timeout(), move || {
                generator.generate(&prompt_text)
            })
            .await?;

        if text.trim().is_empty() {
            warn!("{} returned an empty answer", model);
        }

        Ok(Answer {
            text,
            backend,
            model,
            sources: prompt.chunks,
        })
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.storage.io_timeout_secs)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.ollama.timeout_secs)
    }

    /// Run blocking work off the async runtime, bounded by `limit`
    async fn run_blocking<T, F>(&self, operation: &str, limit: Duration, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!("{} task failed: {}", operation, join_error);
                Err(RagError::Other(anyhow::anyhow!(
                    "{} task failed: {}",
                    operation,
                    join_error
                )))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", operation, limit);
                Err(RagError::Timeout {
                    operation: operation.to_string(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }

    /// Run blocking work that watches a cancel flag, bounded by `limit`.
    ///
    /// On timeout the flag is raised and the task is awaited before returning,
    /// so nothing it does can land after the caller has moved on. Work that
    /// finished before it saw the flag keeps its result.
    async fn run_cancellable<T, F>(&self, operation: &str, limit: Duration, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicBool) -> Result<T> + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let mut task = tokio::task::spawn_blocking(move || work(&*flag));

        let joined = match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, waiting for it to stop",
                    operation, limit
                );
                cancel.store(true, Ordering::SeqCst);
                match task.await {
                    Ok(Ok(value)) => {
                        warn!("{} completed before it could be cancelled", operation);
                        return Ok(value);
                    }
                    Ok(Err(e)) => debug!("{} stopped after cancellation: {}", operation, e),
                    Err(join_error) => error!("{} task failed: {}", operation, join_error),
                }
                return Err(RagError::Timeout {
                    operation: operation.to_string(),
                    seconds: limit.as_secs(),
                });
            }
        };

        match joined {
            Ok(result) => result,
            Err(join_error) => {
                error!("{} task failed: {}", operation, join_error);
                Err(RagError::Other(anyhow::anyhow!(
                    "{} task failed: {}",
                    operation,
                    join_error
                )))
            }
        }
    }
}

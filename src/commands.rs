use anyhow::{Context, Result};
use console::style;
use tracing::{info, warn};

use crate::RagError;
use crate::config::Config;
use crate::generation::Backend;
use crate::index::VectorIndex;
use crate::ollama::OllamaClient;
use crate::pipeline::Pipeline;
use crate::shell::terminal::format_answer;

/// Re-ingest the documents directory and replace the persisted index
#[inline]
pub async fn rebuild_index(config: Config) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to initialize pipeline")?;

    let stats = pipeline
        .rebuild_index()
        .await
        .context("Failed to rebuild vector index")?;

    println!(
        "Indexed {} chunks from {} documents (dimension {})",
        stats.chunks, stats.documents, stats.dimension
    );
    println!(
        "Index written to {}",
        pipeline.config().storage.index_dir.display()
    );
    Ok(())
}

/// Answer one question from the persisted index and print it with its sources
#[inline]
pub async fn ask_question(
    config: Config,
    question: &str,
    backend: Backend,
    top_k: Option<usize>,
) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to initialize pipeline")?;

    info!("Answering with {}", backend);
    let answer = pipeline
        .answer(question, backend, top_k)
        .await
        .context("Failed to answer question")?;

    print!("{}", format_answer(&answer));
    Ok(())
}

/// Report whether the model service and the persisted index are usable
#[inline]
pub fn check_services(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let models = [
        config.embedding.model.as_str(),
        config.generation.llama_model.as_str(),
        config.generation.mistral_model.as_str(),
    ];

    println!("{}", style("Model service").bold().yellow());
    client
        .health_check(&models)
        .with_context(|| format!("Ollama at {} is not ready", client.base_url()))?;
    println!(
        "  {} {} serves {}",
        style("✓").green(),
        client.base_url(),
        models.join(", ")
    );

    println!("{}", style("Vector index").bold().yellow());
    let location = &config.storage.index_dir;
    match VectorIndex::load(location) {
        Ok(index) => {
            println!(
                "  {} {} chunks, dimension {}, built {} with {}",
                style("✓").green(),
                index.len(),
                index.dimension(),
                index.built_at().format("%Y-%m-%d %H:%M:%S UTC"),
                index.embedding_model()
            );
            if index.embedding_model() != config.embedding.model {
                warn!(
                    "Index model {} differs from configured {}",
                    index.embedding_model(),
                    config.embedding.model
                );
                println!(
                    "  {} configured embedding model is {}; rebuild the index",
                    style("⚠").yellow(),
                    config.embedding.model
                );
            }
        }
        Err(RagError::IndexNotFound(_)) => {
            println!(
                "  {} no index at {} yet; run `pdf-chat rebuild`",
                style("⚠").yellow(),
                location.display()
            );
        }
        Err(e) => {
            return Err(e).context("Persisted index is unusable");
        }
    }

    Ok(())
}

// Answer generation: prompt assembly and the text generation backends


pub mod prompt;

pub use prompt::{AssembledPrompt, assemble_prompt};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::config::{GenerationConfig, OllamaConfig};
use crate::index::RetrievedChunk;
use crate::ollama::{OllamaClient, Service};
use crate::Result;

/// The generation models a question can be routed to.
///
/// They stand in for a pair of hosted Bedrock models: `Llama` for
/// `meta.llama2-70b-chat-v1` (shown as "Llama Output"), and `Mistral` for
/// `ai21.j2-mid-v1` (shown as "Claude Output" despite the model). The model
/// each one calls is set in `[generation]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Llama,
    Mistral,
}

impl Backend {
    pub const ALL: [Self; 2] = [Self::Llama, Self::Mistral];

    #[inline]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Llama => "Llama",
            Self::Mistral => "Mistral",
        }
    }

    /// Model identifier configured for this backend
    #[inline]
    pub fn model_id(self, config: &GenerationConfig) -> &str {
        match self {
            Self::Llama => &config.llama_model,
            Self::Mistral => &config.mistral_model,
        }
    }
}

impl fmt::Display for Backend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Produces a completion for a fully rendered prompt
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;
}

/// An answer together with the chunks it was grounded on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub backend: Backend,
    pub model: String,
    pub sources: Vec<RetrievedChunk>,
}

impl Answer {
    /// True when the model returned nothing but whitespace
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Generation client for the Ollama `/api/generate` endpoint
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    #[inline]
    pub fn for_backend(
        ollama: &OllamaConfig,
        generation: &GenerationConfig,
        backend: Backend,
    ) -> Result<Self> {
        Ok(Self::with_client(
            OllamaClient::new(ollama)?,
            backend.model_id(generation),
            generation.max_tokens,
        ))
    }

    #[inline]
    pub fn with_client(client: OllamaClient, model: &str, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.to_string(),
            max_tokens,
        }
    }
}

impl TextGenerator for OllamaGenerator {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!(
            "Generating with {} ({} prompt chars, up to {} tokens)",
            self.model,
            prompt.chars().count(),
            self.max_tokens
        );

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
            },
        };
        let response: GenerateResponse =
            self.client
                .post_json("/api/generate", &request, Service::Generation, "generation")?;

        info!(
            "{} returned {} characters",
            self.model,
            response.response.chars().count()
        );
        Ok(response.response)
    }
}

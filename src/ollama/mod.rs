// HTTP transport shared by the embedding and generation clients.
// Requests are made once; failures are classified and returned, never retried.


use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::{RagError, Result};

/// The service a request belongs to, which decides the error kind it surfaces as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    Generation,
    Health,
}

impl Service {
    fn error(self, message: String) -> RagError {
        match self {
            Self::Embedding => RagError::EmbeddingService(message),
            Self::Generation => RagError::GenerationService(message),
            Self::Health => RagError::Other(anyhow::anyhow!(message)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    agent: ureq::Agent,
    timeout: Duration,
}

#[derive(Debug, serde::Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config.ollama_url()?;
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            base_url,
            agent: build_agent(timeout),
            timeout,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Verify the server is reachable and every named model is installed
    #[inline]
    pub fn health_check(&self, models: &[&str]) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let available = self.list_models()?;
        let missing: Vec<&str> = models
            .iter()
            .copied()
            .filter(|model| !available.iter().any(|m| m.name == *model))
            .collect();

        if !missing.is_empty() {
            let available_names: Vec<&str> = available.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Models {:?} not found. Available models: {:?}",
                missing, available_names
            );
            return Err(Service::Health.error(format!(
                "Models {:?} are not available. Available models: {:?}",
                missing, available_names
            )));
        }

        info!(
            "Health check passed for Ollama server at {} with models {:?}",
            self.base_url, models
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.list_models().map(|_| ())
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags", Service::Health)?;
        debug!("Fetching available models from {}", url);

        let response = self.agent.get(url.as_str()).call();
        let text = self.read_response(response, Service::Health, "list models")?;

        let models: ModelsResponse = serde_json::from_str(&text).map_err(|e| {
            Service::Health.error(format!("Failed to parse models response: {}", e))
        })?;

        debug!("Found {} models", models.models.len());
        Ok(models.models)
    }

    /// POST a JSON body and decode the JSON reply. Errors surface as the given service's kind.
    #[inline]
    pub fn post_json<Req, Resp>(
        &self,
        path: &str,
        request: &Req,
        service: Service,
        operation: &str,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path, service)?;
        let body = serde_json::to_string(request)
            .map_err(|e| service.error(format!("Failed to serialize {} request: {}", operation, e)))?;

        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body);
        let text = self.read_response(response, service, operation)?;

        serde_json::from_str(&text).map_err(|e| {
            service.error(format!("Malformed {} response: {}", operation, e))
        })
    }

    fn endpoint(&self, path: &str, service: Service) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| service.error(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn read_response(
        &self,
        response: std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error>,
        service: Service,
        operation: &str,
    ) -> Result<String> {
        let mut response = response.map_err(|e| self.classify(e, service, operation))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| self.classify(e, service, operation))?;

        if (200..300).contains(&status) {
            return Ok(text);
        }

        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or_else(|_| text.trim().to_string());
        warn!("{} failed with HTTP {}: {}", operation, status, message);

        Err(service.error(format!("HTTP {} during {}: {}", status, operation, message)))
    }

    fn classify(&self, error: ureq::Error, service: Service, operation: &str) -> RagError {
        match error {
            ureq::Error::Timeout(_) => {
                warn!("{} timed out after {:?}", operation, self.timeout);
                RagError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.timeout.as_secs(),
                }
            }
            other => {
                warn!("Transport error during {}: {}", operation, other);
                service.error(format!(
                    "Request to {} failed during {}: {}",
                    self.base_url, operation, other
                ))
            }
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

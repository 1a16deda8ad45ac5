// In-process stand-ins for the PDF parser and the model service

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::documents::TextExtractor;
use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::{RagError, Result};

/// Reads files as UTF-8 so tests don't need real PDFs
pub(crate) struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| RagError::Ingestion(e.to_string()))
    }
}

/// Byte histogram embedding: identical texts get identical vectors
pub(crate) fn histogram(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; 8];
    for byte in text.bytes() {
        vector[usize::from(byte) % 8] += 1.0;
    }
    vector
}

pub(crate) struct HistogramEmbedder {
    model: String,
    pub(crate) calls: AtomicUsize,
    pub(crate) delay_ms: AtomicU64,
}

impl HistogramEmbedder {
    pub(crate) fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }
}

impl Embedder for HistogramEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        Ok(texts.iter().map(|t| histogram(t)).collect())
    }
}

/// Replies with a fixed text and remembers every prompt it was given
pub(crate) struct RecordingGenerator {
    model: String,
    reply: Mutex<String>,
    failure: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub(crate) fn new(model: &str, reply: &str) -> Self {
        Self {
            model: model.to_string(),
            reply: Mutex::new(reply.to_string()),
            failure: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_reply(&self, reply: &str) {
        *self.reply.lock().expect("reply lock should not be poisoned") = reply.to_string();
    }

    /// Make every later call fail with a generation error carrying `message`
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().expect("failure lock should not be poisoned") =
            Some(message.to_string());
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .last()
            .cloned()
    }
}

impl TextGenerator for RecordingGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .push(prompt.to_string());
        if let Some(message) = self
            .failure
            .lock()
            .expect("failure lock should not be poisoned")
            .clone()
        {
            return Err(RagError::GenerationService(message));
        }
        Ok(self
            .reply
            .lock()
            .expect("reply lock should not be poisoned")
            .clone())
    }
}


use tracing::debug;

use crate::index::RetrievedChunk;
use crate::{RagError, Result};

const INSTRUCTIONS: &str = "Human: Use the following pieces of context to provide a concise answer
to the question at the end but use at least 250 words to summarize
with detailed explanations. If you don't know the answer,
just say that you don't know, don't try to make up an answer.";

/// Separator placed between chunks inside the context block
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// A rendered prompt and the chunks that made it in, in rank order
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub text: String,
    pub chunks: Vec<RetrievedChunk>,
    /// Number of lowest-ranked chunks left out to respect the size limit
    pub dropped: usize,
}

/// Render the question and its retrieved context into the instruction template.
///
/// Chunk text is embedded verbatim. When the prompt would exceed `max_chars`
/// characters the lowest-ranked chunks are dropped whole; if even the best
/// chunk alone is too large the call fails with `PromptTooLarge`.
#[inline]
pub fn assemble_prompt(
    chunks: &[RetrievedChunk],
    question: &str,
    max_chars: usize,
) -> Result<AssembledPrompt> {
    if question.trim().is_empty() {
        return Err(RagError::Config("Question must not be empty".to_string()));
    }

    if chunks.is_empty() {
        return Err(RagError::Config(
            "Cannot assemble a prompt without context chunks".to_string(),
        ));
    }

    for used in (1..=chunks.len()).rev() {
        let text = render(&chunks[..used], question);
        let length = text.chars().count();
        if length <= max_chars {
            let dropped = chunks.len() - used;
            if dropped > 0 {
                debug!(
                    "Dropped {} lowest-ranked chunks to fit the {} character prompt limit",
                    dropped, max_chars
                );
            }
            return Ok(AssembledPrompt {
                text,
                chunks: chunks[..used].to_vec(),
                dropped,
            });
        }
    }

    Err(RagError::PromptTooLarge {
        needed: render(&chunks[..1], question).chars().count(),
        limit: max_chars,
    })
}

fn render(chunks: &[RetrievedChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    format!(
        "\n{}\n<context>\n{}\n</context>\n\nQuestion: {}\n\nAssistant:\n",
        INSTRUCTIONS, context, question
    )
}

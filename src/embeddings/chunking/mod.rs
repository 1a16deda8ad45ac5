#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::Result;
use crate::config::ConfigError;
use crate::documents::Document;

/// Boundary separators, strongest first. Within one level the latest match wins.
const SEPARATOR_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "! ", "? "],
    &[" ", "\t"],
];

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text, copied verbatim from the document
    pub content: String,
    /// Path of the document this chunk was cut from
    pub source: PathBuf,
    /// The index of this chunk within its document
    pub chunk_index: usize,
    /// Character offset of the chunk within the document text
    pub start: usize,
    /// Length of the chunk in characters
    pub char_count: usize,
}

/// A window of text produced by [`split_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Character offset of the window within the source text
    pub start: usize,
    pub content: String,
}

impl TextWindow {
    #[inline]
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Configuration for content chunking. Sizes are measured in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same document
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            chunk_overlap: 1_000,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100_000).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunk_overlap,
                self.chunk_size,
            ));
        }

        Ok(())
    }
}

/// Split every document into overlapping chunks
#[inline]
pub fn split_documents(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let mut chunks = Vec::new();
    for document in documents {
        let windows = split_text(&document.text, config)?;
        debug!(
            "Split {} into {} chunks",
            document.source.display(),
            windows.len()
        );

        chunks.extend(windows.into_iter().enumerate().map(|(chunk_index, window)| {
            let char_count = window.char_count();
            Chunk {
                content: window.content,
                source: document.source.clone(),
                chunk_index,
                start: window.start,
                char_count,
            }
        }));
    }

    debug!(
        "Chunked {} documents into {} chunks (avg {} characters)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(|c| c.char_count).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Split text into windows of at most `chunk_size` characters.
///
/// Each window ends at the strongest separator found in its second half, or at
/// exactly `chunk_size` characters when there is none. The next window starts
/// `chunk_overlap` characters before the previous end, so dropping the first
/// `chunk_overlap` characters of every window after the first and concatenating
/// gives back the original text.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextWindow>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + config.chunk_size).min(len);
        let end = if hard_end == len {
            len
        } else {
            find_boundary(&chars, start, hard_end, config)
        };

        windows.push(TextWindow {
            start,
            content: chars[start..end].iter().collect(),
        });

        if end == len {
            break;
        }
        start = end - config.chunk_overlap;
    }

    Ok(windows)
}

/// Pick the end of the window starting at `start`. Never earlier than halfway,
/// and always past `start + chunk_overlap` so the walk makes progress.
fn find_boundary(chars: &[char], start: usize, hard_end: usize, config: &ChunkingConfig) -> usize {
    let lower = start + (config.chunk_overlap + 1).max(config.chunk_size / 2);

    for level in SEPARATOR_LEVELS {
        let best = level
            .iter()
            .filter_map(|separator| last_separator_end(chars, lower, hard_end, separator))
            .max();
        if let Some(end) = best {
            return end;
        }
    }

    hard_end
}

/// Largest `end` in `lower..=upper` such that the characters just before `end` are `separator`
fn last_separator_end(chars: &[char], lower: usize, upper: usize, separator: &str) -> Option<usize> {
    let pattern: Vec<char> = separator.chars().collect();
    let width = pattern.len();

    (lower.max(width)..=upper)
        .rev()
        .find(|&end| chars[end - width..end] == pattern[..])
}

//! Streaming text segmentation into speakable chunks
//!
//! Fragments from the LLM are appended to an accumulator. Once the
//! accumulator ends a sentence and is longer than the configured minimum, its
//! contents are cleaned up and emitted as a [`Chunk`] with the next sequence
//! number.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::strip_markdown;
use crate::{Error, Result};

/// Sentence end at the very end of the accumulator
static TRAILING_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["']?\s*$"#).expect("valid regex"));

/// Sentence end anywhere in the accumulator
static BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["']?"#).expect("valid regex"));

/// Minimum accumulator length (in characters) before a boundary is honoured
pub const DEFAULT_MIN_CHARS: usize = 120;

/// A finalized, speakable unit of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    sequence: u64,
    text: String,
}

impl Chunk {
    /// Create a chunk from already-cleaned text
    ///
    /// # Errors
    ///
    /// Returns `Error::Chunking` if the text is empty after trimming
    pub fn new(sequence: u64, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::Chunking(format!("chunk {sequence} has no text")));
        }

        Ok(Self {
            sequence,
            text: trimmed.to_string(),
        })
    }

    /// Ordering key, starting at 1 for the first chunk of a session
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// How often the accumulator is tested for a sentence boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segmentation {
    /// One check per fed fragment, at the end of the accumulator
    #[default]
    Fragment,
    /// Rescan the whole accumulator, splitting on every eligible boundary
    Sentence,
}

/// Turns a stream of text fragments into ordered chunks
///
/// One chunker serves exactly one session.
#[derive(Debug)]
pub struct Chunker {
    buffer: String,
    min_chars: usize,
    segmentation: Segmentation,
    next_sequence: u64,
}

impl Chunker {
    #[must_use]
    pub const fn new(min_chars: usize, segmentation: Segmentation) -> Self {
        Self {
            buffer: String::new(),
            min_chars,
            segmentation,
            next_sequence: 1,
        }
    }

    /// Append a fragment and return any chunks that became complete
    pub fn feed(&mut self, fragment: &str) -> Vec<Chunk> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);

        match self.segmentation {
            Segmentation::Fragment => {
                if self.buffer.chars().count() > self.min_chars
                    && TRAILING_BOUNDARY.is_match(&self.buffer)
                {
                    let text = std::mem::take(&mut self.buffer);
                    self.emit(&text).into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            Segmentation::Sentence => self.split_sentences(),
        }
    }

    /// Emit whatever is left once the token source is exhausted
    pub fn flush(&mut self) -> Option<Chunk> {
        let text = std::mem::take(&mut self.buffer);
        self.emit(&text)
    }

    /// Number of chunks emitted so far
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Text received since the last emitted chunk
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn split_sentences(&mut self) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        while let Some(end) = self.next_split() {
            let rest = self.buffer.split_off(end);
            let text = std::mem::replace(&mut self.buffer, rest);
            chunks.extend(self.emit(&text));
        }

        chunks
    }

    /// Byte offset just past the first boundary that may end a chunk
    fn next_split(&self) -> Option<usize> {
        BOUNDARY.find_iter(&self.buffer).find_map(|m| {
            let end = m.end();
            // A boundary at the end of the buffer may still be a decimal point
            let followed_by_space = self.buffer[end..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace);
            let long_enough = self.buffer[..end].chars().count() > self.min_chars;
            (followed_by_space && long_enough).then_some(end)
        })
    }

    fn emit(&mut self, raw: &str) -> Option<Chunk> {
        let cleaned = strip_markdown(raw);
        let text = cleaned.trim();
        if text.is_empty() {
            return None;
        }

        let chunk = Chunk {
            sequence: self.next_sequence,
            text: text.to_string(),
        };
        self.next_sequence += 1;

        tracing::debug!(
            sequence = chunk.sequence,
            chars = chunk.text.chars().count(),
            "chunk ready"
        );
        Some(chunk)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS, Segmentation::default())
    }
}

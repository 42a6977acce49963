//! Text splitting strategies.
//!
//! Two families exist: size-based splitters, which pack pieces of text into
//! chunks of at most `chunk_size` units with `chunk_overlap` units repeated
//! between neighbours, and the structural markdown splitter, which emits one
//! chunk per header section and ignores sizes altogether.

mod factory;
mod length;
mod markdown;
mod recursive;
mod sentence;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::error::SplitterError;
use crate::types::{RawDocument, TextChunk};

pub use factory::SplitterFactory;
pub use length::{counter_for, CharCounter, TiktokenCounter, TokenCounter};
pub use markdown::MarkdownHeaderTextSplitter;
pub use recursive::{RecursiveCharacterTextSplitter, Separator, SeparatorPlacement};
pub use sentence::{SentencePipeline, SentenceTextSplitter};

/// The core trait that all splitters implement.
pub trait TextSplitter: Send + Sync {
    /// Get the name of this splitter.
    fn name(&self) -> &'static str;

    /// Split a single text into chunks.
    ///
    /// Size-based splitters return chunks without metadata; structural
    /// splitters attach the header path of each section.
    fn split_text(&self, text: &str) -> Vec<TextChunk>;

    /// Split documents, keeping document order and inheriting each
    /// document's metadata (splitter metadata wins on key clashes).
    fn split_documents(&self, documents: &[RawDocument]) -> Vec<TextChunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content).into_iter().map(move |chunk| {
                    let mut metadata = doc.metadata.clone();
                    metadata.extend(chunk.metadata);
                    TextChunk {
                        content: chunk.content,
                        metadata,
                    }
                })
            })
            .collect()
    }

    /// Whether this splitter is driven by document structure rather than size.
    fn is_structural(&self) -> bool {
        false
    }
}

/// Chunk size, overlap and the function measuring both.
#[derive(Clone)]
pub struct SizeBudget {
    chunk_size: usize,
    chunk_overlap: usize,
    length: Arc<dyn TokenCounter>,
}

impl SizeBudget {
    /// Create a budget, rejecting `chunk_size == 0` and
    /// `chunk_overlap >= chunk_size`.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        length: Arc<dyn TokenCounter>,
    ) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::InvalidConfig("chunk_size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            length,
        })
    }

    /// Create a budget that is always valid, clamping out-of-range values.
    pub fn clamped(chunk_size: usize, chunk_overlap: usize, length: Arc<dyn TokenCounter>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            length,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Measure text with the budget's length function.
    pub fn measure(&self, text: &str) -> usize {
        self.length.count_tokens(text)
    }

    /// Greedily pack splits into chunks of at most `chunk_size` units.
    ///
    /// Candidates are measured as they would be emitted (joined and trimmed),
    /// since token counts are not additive over pieces. When a chunk is
    /// emitted, splits are dropped from its front until at most
    /// `chunk_overlap` units remain; those carry over into the next chunk.
    /// Only a single split that is itself too large can exceed `chunk_size`.
    pub(crate) fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();

        for split in splits {
            let split = split.as_str();
            if !current.is_empty() && self.measure_joined(&current, Some(split), separator) > self.chunk_size {
                if let Some(chunk) = join_splits(&current, None, separator) {
                    let size = self.measure(&chunk);
                    if size > self.chunk_size {
                        warn!(
                            size,
                            chunk_size = self.chunk_size,
                            "Created a chunk larger than the configured chunk size"
                        );
                    }
                    chunks.push(chunk);
                }

                // Keep at most `chunk_overlap` units, and make room for the next split
                while !current.is_empty()
                    && (self.measure_joined(&current, None, separator) > self.chunk_overlap
                        || self.measure_joined(&current, Some(split), separator) > self.chunk_size)
                {
                    current.pop_front();
                }
            }

            current.push_back(split);
        }

        if let Some(chunk) = join_splits(&current, None, separator) {
            if self.measure(&chunk) > self.chunk_size {
                warn!(chunk_size = self.chunk_size, "Created a chunk larger than the configured chunk size");
            }
            chunks.push(chunk);
        }

        chunks
    }

    fn measure_joined(&self, splits: &VecDeque<&str>, next: Option<&str>, separator: &str) -> usize {
        join_splits(splits, next, separator).map_or(0, |chunk| self.measure(&chunk))
    }
}

fn join_splits(splits: &VecDeque<&str>, next: Option<&str>, separator: &str) -> Option<String> {
    let joined = splits
        .iter()
        .copied()
        .chain(next)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

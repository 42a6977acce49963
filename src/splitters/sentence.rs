//! Sentence-based splitting.
//!
//! Sentences are detected first and then packed into chunks, joined by a
//! blank line. A sentence longer than the budget becomes its own oversized
//! chunk rather than being cut mid-sentence.

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::{SizeBudget, TextSplitter};
use crate::error::SplitterError;
use crate::types::TextChunk;

lazy_static::lazy_static! {
    static ref CJK_CLAUSE: Regex = Regex::new(r"[^；\n]+；?").unwrap();
}

/// Sentence segmentation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentencePipeline {
    /// Unicode sentence boundaries (UAX #29)
    Sentencizer,
    /// Unicode boundaries, additionally breaking on line ends and full-width
    /// semicolons
    Chinese,
}

impl SentencePipeline {
    /// Look up a pipeline by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sentencizer" => Some(Self::Sentencizer),
            "zh_core_web_sm" => Some(Self::Chinese),
            _ => None,
        }
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        let sentences = text.unicode_sentences().map(str::trim).filter(|s| !s.is_empty());
        match self {
            Self::Sentencizer => sentences.map(String::from).collect(),
            Self::Chinese => sentences
                .flat_map(|s| CJK_CLAUSE.find_iter(s).map(|m| m.as_str().trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// Splits text on sentence boundaries.
pub struct SentenceTextSplitter {
    pipeline: SentencePipeline,
    separator: String,
    budget: SizeBudget,
}

impl SentenceTextSplitter {
    /// Create a splitter using the given pipeline name, or the sentencizer
    /// when `pipeline` is `None`.
    pub fn new(budget: SizeBudget, pipeline: Option<&str>) -> Result<Self, SplitterError> {
        let pipeline = match pipeline {
            None => SentencePipeline::Sentencizer,
            Some(name) => SentencePipeline::from_name(name).ok_or_else(|| {
                SplitterError::UnsupportedPipeline {
                    splitter: "SpacyTextSplitter".to_string(),
                    pipeline: name.to_string(),
                }
            })?,
        };

        Ok(Self {
            pipeline,
            separator: "\n\n".to_string(),
            budget,
        })
    }

    pub fn pipeline(&self) -> SentencePipeline {
        self.pipeline
    }
}

impl TextSplitter for SentenceTextSplitter {
    fn name(&self) -> &'static str {
        "SpacyTextSplitter"
    }

    fn split_text(&self, text: &str) -> Vec<TextChunk> {
        let sentences = self.pipeline.sentences(text);
        self.budget
            .merge_splits(&sentences, &self.separator)
            .into_iter()
            .map(TextChunk::new)
            .collect()
    }
}

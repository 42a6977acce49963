//! Named splitter construction with graceful degradation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{
    counter_for, CharCounter, MarkdownHeaderTextSplitter, RecursiveCharacterTextSplitter,
    SentenceTextSplitter, SizeBudget, TextSplitter, TiktokenCounter, TokenCounter,
};
use crate::error::SplitterError;
use crate::types::{Settings, SplitterSpec};

type SplitterBuilder =
    fn(SizeBudget, Option<&str>) -> Result<Arc<dyn TextSplitter>, SplitterError>;

fn reject_pipeline(splitter: &str, pipeline: Option<&str>) -> Result<(), SplitterError> {
    match pipeline {
        Some(pipeline) => Err(SplitterError::UnsupportedPipeline {
            splitter: splitter.to_string(),
            pipeline: pipeline.to_string(),
        }),
        None => Ok(()),
    }
}

fn build_recursive(
    budget: SizeBudget,
    pipeline: Option<&str>,
) -> Result<Arc<dyn TextSplitter>, SplitterError> {
    reject_pipeline("RecursiveCharacterTextSplitter", pipeline)?;
    Ok(Arc::new(RecursiveCharacterTextSplitter::new(budget)))
}

fn build_markdown(
    budget: SizeBudget,
    pipeline: Option<&str>,
) -> Result<Arc<dyn TextSplitter>, SplitterError> {
    reject_pipeline("MarkdownTextSplitter", pipeline)?;
    Ok(Arc::new(RecursiveCharacterTextSplitter::for_markdown(budget)))
}

fn build_chinese(
    budget: SizeBudget,
    pipeline: Option<&str>,
) -> Result<Arc<dyn TextSplitter>, SplitterError> {
    reject_pipeline("ChineseRecursiveTextSplitter", pipeline)?;
    Ok(Arc::new(RecursiveCharacterTextSplitter::chinese(budget)?))
}

fn build_sentence(
    budget: SizeBudget,
    pipeline: Option<&str>,
) -> Result<Arc<dyn TextSplitter>, SplitterError> {
    Ok(Arc::new(SentenceTextSplitter::new(budget, pipeline)?))
}

/// Builds text splitters by name.
///
/// Construction never fails from the caller's point of view: a named
/// splitter is tried with the configured language pipeline, then without it,
/// and any remaining error is logged and answered with the default
/// recursive splitter.
pub struct SplitterFactory {
    settings: Arc<Settings>,
    builders: HashMap<&'static str, SplitterBuilder>,
}

impl SplitterFactory {
    /// Create a factory with all built-in size-based splitters registered.
    pub fn new(settings: Arc<Settings>) -> Self {
        let mut builders: HashMap<&'static str, SplitterBuilder> = HashMap::new();
        builders.insert("recursivecharactertextsplitter", build_recursive);
        builders.insert("markdowntextsplitter", build_markdown);
        builders.insert("chineserecursivetextsplitter", build_chinese);
        builders.insert("spacytextsplitter", build_sentence);
        Self { settings, builders }
    }

    /// Names of all splitters this factory can build by name.
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .settings
            .text_splitters
            .iter()
            .map(|spec| spec.name.as_str())
            .filter(|name| self.is_buildable(name))
            .collect();
        names.sort_unstable();
        names
    }

    fn is_buildable(&self, name: &str) -> bool {
        self.settings.splitter_spec(name).map_or(false, |spec| {
            !spec.headers_to_split_on.is_empty()
                || self.builders.contains_key(name.to_lowercase().as_str())
        })
    }

    /// Build the named splitter, falling back to the default on any error.
    pub fn make_text_splitter(
        &self,
        name: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Arc<dyn TextSplitter> {
        match self.try_make(name, chunk_size, chunk_overlap) {
            Ok(splitter) => {
                debug!(splitter = splitter.name(), chunk_size, chunk_overlap, "Built text splitter");
                splitter
            }
            Err(e) => {
                if self.settings.log_verbose {
                    error!(splitter = name, error = ?e, "Failed to build text splitter, using default");
                } else {
                    error!(splitter = name, error = %e, "Failed to build text splitter, using default");
                }
                Self::default_splitter(chunk_size, chunk_overlap)
            }
        }
    }

    /// Build the named splitter, reporting construction errors.
    pub fn try_make(
        &self,
        name: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Arc<dyn TextSplitter>, SplitterError> {
        let spec = self
            .settings
            .splitter_spec(name)
            .ok_or_else(|| SplitterError::MissingSpec(name.to_string()))?;

        if !spec.headers_to_split_on.is_empty() {
            return Ok(Arc::new(MarkdownHeaderTextSplitter::new(&spec.headers_to_split_on)));
        }

        let builder = self
            .builders
            .get(spec.name.to_lowercase().as_str())
            .ok_or_else(|| SplitterError::UnknownSplitter(spec.name.clone()))?;

        let budget = Self::budget_for(spec, chunk_size, chunk_overlap)?;
        let pipeline = self.settings.splitter_pipeline.as_str();

        match builder(budget.clone(), Some(pipeline)) {
            Ok(splitter) => Ok(splitter),
            Err(e) => {
                debug!(splitter = %spec.name, pipeline, error = %e, "Retrying without pipeline");
                builder(budget, None)
            }
        }
    }

    fn budget_for(
        spec: &SplitterSpec,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<SizeBudget, SplitterError> {
        let length = counter_for(spec.source, &spec.tokenizer_name_or_path)?;
        SizeBudget::new(chunk_size, chunk_overlap, length)
    }

    /// The terminal fallback: a recursive splitter measured in cl100k_base
    /// tokens (characters if the encoding cannot be loaded), with the size
    /// parameters clamped into range.
    pub fn default_splitter(chunk_size: usize, chunk_overlap: usize) -> Arc<dyn TextSplitter> {
        let length: Arc<dyn TokenCounter> = match TiktokenCounter::new() {
            Ok(counter) => Arc::new(counter),
            Err(e) => {
                warn!(error = %e, "Token encoding unavailable, measuring in characters");
                Arc::new(CharCounter)
            }
        };
        Arc::new(RecursiveCharacterTextSplitter::new(SizeBudget::clamped(
            chunk_size,
            chunk_overlap,
            length,
        )))
    }
}

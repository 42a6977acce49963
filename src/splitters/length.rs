//! Length functions used by size-based splitters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tiktoken_rs::CoreBPE;

use crate::error::SplitterError;
use crate::types::TokenizerSource;

/// Measures text in the units a splitter budgets with.
pub trait TokenCounter: Send + Sync {
    /// Name of the measure (encoding name or "chars").
    fn name(&self) -> &str;

    /// Count the units in the given text.
    fn count_tokens(&self, text: &str) -> usize;
}

lazy_static::lazy_static! {
    static ref BPE_CACHE: Mutex<HashMap<String, Arc<CoreBPE>>> = Mutex::new(HashMap::new());
}

fn load_bpe(encoding_name: &str) -> Result<Arc<CoreBPE>, SplitterError> {
    let mut cache = BPE_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(bpe) = cache.get(encoding_name) {
        return Ok(Arc::clone(bpe));
    }

    let bpe = match encoding_name {
        "cl100k_base" => tiktoken_rs::cl100k_base(),
        "p50k_base" => tiktoken_rs::p50k_base(),
        "p50k_edit" => tiktoken_rs::p50k_edit(),
        "r50k_base" | "gpt2" => tiktoken_rs::r50k_base(),
        other => {
            return Err(SplitterError::Tokenizer(format!("unknown encoding {}", other)));
        }
    }
    .map_err(|e| SplitterError::Tokenizer(e.to_string()))?;

    let bpe = Arc::new(bpe);
    cache.insert(encoding_name.to_string(), Arc::clone(&bpe));
    Ok(bpe)
}

/// Byte-pair-encoding token counter.
///
/// Encoding tables are loaded once per process and shared between counters.
pub struct TiktokenCounter {
    encoding: String,
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// Create a counter with the cl100k_base encoding (GPT-4/ChatGPT).
    pub fn new() -> Result<Self, SplitterError> {
        Self::with_encoding("cl100k_base")
    }

    /// Create a counter with a specific encoding.
    pub fn with_encoding(encoding_name: &str) -> Result<Self, SplitterError> {
        Ok(Self {
            encoding: encoding_name.to_string(),
            bpe: load_bpe(encoding_name)?,
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn name(&self) -> &str {
        &self.encoding
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Counts Unicode scalar values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCounter;

impl TokenCounter for CharCounter {
    fn name(&self) -> &str {
        "chars"
    }

    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count()
    }
}

/// Build the length function described by a splitter spec.
///
/// `tiktoken` selects a BPE encoding by name; `huggingface` only knows the
/// GPT-2 vocabulary and counts characters for anything else.
pub fn counter_for(
    source: Option<TokenizerSource>,
    tokenizer_name_or_path: &str,
) -> Result<Arc<dyn TokenCounter>, SplitterError> {
    match source {
        Some(TokenizerSource::Tiktoken) => {
            Ok(Arc::new(TiktokenCounter::with_encoding(tokenizer_name_or_path)?))
        }
        Some(TokenizerSource::Huggingface) if tokenizer_name_or_path == "gpt2" => {
            Ok(Arc::new(TiktokenCounter::with_encoding("gpt2")?))
        }
        Some(TokenizerSource::Huggingface) | None => Ok(Arc::new(CharCounter)),
    }
}

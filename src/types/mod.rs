//! Core types for the ingestion pipeline.

mod config;
mod document;

pub use config::{HeaderRule, LoaderSpec, Settings, SplitterSpec, TokenizerSource};
pub use document::{Metadata, RawDocument, TextChunk};

//! Knowledge-Base Chunker Library
//!
//! Turns the files of a knowledge base into bounded-size text chunks for
//! RAG pipelines. A file's extension selects a document loader, the loader
//! produces raw documents, and a named text splitter cuts them into chunks.

pub mod batch;
pub mod error;
pub mod knowledge_file;
pub mod loaders;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod splitters;
pub mod types;

pub use batch::{BatchConfig, BatchProcessor, BatchResult, FileChunks};
pub use error::{Error, Result, SplitterError};
pub use knowledge_file::{FileState, KnowledgeFile, SplitOptions};
pub use loaders::{Loader, LoaderOptions, LoaderResolver};
pub use pipeline::Pipeline;
pub use registry::ExtensionRegistry;
pub use splitters::{SplitterFactory, TextSplitter};
pub use types::{RawDocument, Settings, TextChunk};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::*;
    pub use crate::error::{Error, Result};
    pub use crate::knowledge_file::*;
    pub use crate::loaders::{Loader, LoaderOptions};
    pub use crate::pipeline::Pipeline;
    pub use crate::splitters::{SplitterFactory, TextSplitter};
    pub use crate::types::*;
}

/// Default chunk size, in units of the splitter's length function
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between neighbouring chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splitter used when none is configured
pub const DEFAULT_TEXT_SPLITTER: &str = "RecursiveCharacterTextSplitter";

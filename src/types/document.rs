//! Document and chunk type definitions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// String-keyed metadata carried by documents and chunks.
pub type Metadata = HashMap<String, String>;

/// A document produced by a loader.
///
/// One file may yield several raw documents (a PDF page, a CSV row, a
/// spreadsheet sheet). Loaders always record the originating file path under
/// the `source` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    /// The extracted text content
    pub content: String,

    /// Metadata describing where the content came from
    pub metadata: Metadata,
}

impl RawDocument {
    /// Create a document with the given content and a `source` entry.
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Add a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Check if the document has no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A chunk of content ready for embedding.
///
/// Chunk order within a document reflects document order and is preserved by
/// every splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The actual text content of the chunk
    pub content: String,

    /// Metadata inherited from the source document, augmented by the splitter
    pub metadata: Metadata,
}

impl TextChunk {
    /// Create a chunk without metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Create a chunk with metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the length of the chunk content in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl From<RawDocument> for TextChunk {
    fn from(doc: RawDocument) -> Self {
        Self {
            content: doc.content,
            metadata: doc.metadata,
        }
    }
}

//! Document loaders.
//!
//! A loader is bound to one file at construction and turns it into
//! [`RawDocument`]s on [`Loader::load`]. Which loader handles a file is
//! decided by the [`LoaderResolver`] from the loader name registered for the
//! file's extension.

pub mod encoding;
mod email;
mod markup;
mod ocr;
mod office;
mod pdf;
mod resolver;
mod structured;
mod tabular;
mod text;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::RawDocument;

pub use email::UnstructuredEmailLoader;
pub use markup::{UnstructuredEPubLoader, UnstructuredHTMLLoader, UnstructuredXMLLoader};
pub use ocr::{OcrEngine, RapidOCRLoader};
pub use office::{
    RapidOCRDocLoader, RapidOCRPPTLoader, UnstructuredPowerPointLoader,
    UnstructuredWordDocumentLoader,
};
pub use pdf::RapidOCRPDFLoader;
pub use resolver::LoaderResolver;
pub use structured::{JSONLinesLoader, JSONLoader, JqSelector, NotebookLoader};
pub use tabular::{CSVLoader, FilteredCSVLoader, UnstructuredExcelLoader};
pub use text::{UnstructuredFileLoader, UnstructuredMarkdownLoader};

/// Turns one file into documents.
pub trait Loader: Send {
    /// Registered loader name.
    fn name(&self) -> &'static str;

    /// Read and parse the file.
    fn load(&self) -> Result<Vec<RawDocument>>;
}

/// Loader construction options.
///
/// Every field is optional; each loader reads the ones that concern it and
/// ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Detect the encoding of text that is not valid UTF-8
    pub autodetect_encoding: Option<bool>,

    /// Encoding label (`utf-8`, `gbk`, ...)
    pub encoding: Option<String>,

    /// jq-style selector for JSON loaders
    pub jq_schema: Option<String>,

    /// Require selected JSON values to be strings
    pub text_content: Option<bool>,

    /// CSV field delimiter
    pub delimiter: Option<char>,

    /// CSV column whose value becomes the `source` metadata
    pub source_column: Option<String>,

    /// Columns included in the content of filtered CSV documents
    pub columns_to_read: Option<Vec<String>>,

    /// CSV columns copied into metadata
    pub metadata_columns: Option<Vec<String>>,

    /// OCR language (tesseract language code)
    pub ocr_language: Option<String>,

    /// Include cell outputs in notebook documents
    pub include_outputs: Option<bool>,

    /// Truncate notebook cell outputs to this many characters
    pub max_output_length: Option<usize>,
}

/// The `source` metadata value for a file.
pub(crate) fn source_of(path: &Path) -> String {
    crate::paths::to_posix(path)
}

/// Lowercased extension without the dot.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::io::{Cursor, Write};

    /// Build an in-memory zip archive from (name, content) pairs.
    pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

//! Process-wide configuration.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_TEXT_SPLITTER};

/// Global ingestion settings.
///
/// Built once at startup and shared read-only (usually behind an `Arc`) by
/// every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default chunk size (in units of the splitter's length function)
    pub chunk_size: usize,

    /// Default overlap between consecutive chunks
    pub chunk_overlap: usize,

    /// Splitter used for every knowledge file
    pub text_splitter_name: String,

    /// Root directory holding one subdirectory per knowledge base
    pub kb_root_path: PathBuf,

    /// Include full error chains in fallback log records
    pub log_verbose: bool,

    /// Log output format: "pretty" or "json"
    pub log_format: String,

    /// Language pipeline hint tried first when building splitters
    pub splitter_pipeline: String,

    /// Language passed to the OCR engine
    pub ocr_language: String,

    /// Loader name to extensions table, in lookup order
    pub loaders: Vec<LoaderSpec>,

    /// Splitter construction table
    pub text_splitters: Vec<SplitterSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            text_splitter_name: DEFAULT_TEXT_SPLITTER.to_string(),
            kb_root_path: PathBuf::from("./"),
            log_verbose: false,
            log_format: "pretty".to_string(),
            splitter_pipeline: "zh_core_web_sm".to_string(),
            ocr_language: "eng".to_string(),
            loaders: LoaderSpec::defaults(),
            text_splitters: SplitterSpec::defaults(),
        }
    }
}

impl Settings {
    /// Load settings from `config/kb_chunker.*` (optional) and `KB_*`
    /// environment variables, on top of the defaults.
    ///
    /// Variables look like `KB_CHUNK_SIZE=500`; nested keys are separated by `__`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::build(File::with_name("config/kb_chunker").required(false))
    }

    /// Load settings from an explicit configuration file.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(File::from(path))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("KB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the chunking parameters.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidOption("chunk_size must be > 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidOption(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Find the construction spec of a splitter (names match case-insensitively).
    pub fn splitter_spec(&self, name: &str) -> Option<&SplitterSpec> {
        self.text_splitters
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
    }
}

/// Maps one loader to the file extensions it handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    /// Loader name
    pub name: String,

    /// Extensions including the leading dot, lowercase
    pub extensions: Vec<String>,
}

impl LoaderSpec {
    fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// The default loader table. Order matters: the first loader listing an
    /// extension wins.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("UnstructuredHTMLLoader", &[".html", ".htm"]),
            Self::new("UnstructuredMarkdownLoader", &[".md"]),
            Self::new("JSONLoader", &[".json"]),
            Self::new("JSONLinesLoader", &[".jsonl"]),
            Self::new("CSVLoader", &[".csv"]),
            Self::new("RapidOCRPDFLoader", &[".pdf"]),
            Self::new("RapidOCRDocLoader", &[".docx", ".doc"]),
            Self::new("RapidOCRPPTLoader", &[".ppt", ".pptx"]),
            Self::new("RapidOCRLoader", &[".png", ".jpg", ".jpeg", ".bmp"]),
            Self::new(
                "UnstructuredFileLoader",
                &[
                    ".eml", ".msg", ".rst", ".rtf", ".txt", ".xml", ".epub", ".odt", ".tsv",
                ],
            ),
            Self::new("UnstructuredEmailLoader", &[".eml", ".msg"]),
            Self::new("UnstructuredEPubLoader", &[".epub"]),
            Self::new("UnstructuredExcelLoader", &[".xlsx", ".xls", ".xlsd"]),
            Self::new("NotebookLoader", &[".ipynb"]),
            Self::new("UnstructuredWordDocumentLoader", &[".docx", ".doc"]),
            Self::new("UnstructuredXMLLoader", &[".xml"]),
            Self::new("UnstructuredPowerPointLoader", &[".ppt", ".pptx"]),
        ]
    }
}

/// Where a splitter's length function comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerSource {
    /// Byte-pair encoding selected by encoding name
    Tiktoken,
    /// Model tokenizer; only GPT-2 is available, anything else counts characters
    Huggingface,
}

/// A header marker and the metadata key its title is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    pub marker: String,
    pub key: String,
}

impl HeaderRule {
    fn new(marker: &str, key: &str) -> Self {
        Self {
            marker: marker.to_string(),
            key: key.to_string(),
        }
    }
}

/// Construction parameters for a named splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterSpec {
    /// Splitter name
    pub name: String,

    /// Length function source (size-based splitters)
    #[serde(default)]
    pub source: Option<TokenizerSource>,

    /// Encoding or tokenizer name for the length function
    #[serde(default)]
    pub tokenizer_name_or_path: String,

    /// Header markers (structural splitters)
    #[serde(default)]
    pub headers_to_split_on: Vec<HeaderRule>,
}

impl SplitterSpec {
    fn tokenized(name: &str, source: TokenizerSource, tokenizer: &str) -> Self {
        Self {
            name: name.to_string(),
            source: Some(source),
            tokenizer_name_or_path: tokenizer.to_string(),
            headers_to_split_on: Vec::new(),
        }
    }

    /// The default splitter table.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::tokenized("ChineseRecursiveTextSplitter", TokenizerSource::Huggingface, ""),
            Self::tokenized("SpacyTextSplitter", TokenizerSource::Huggingface, "gpt2"),
            Self::tokenized(
                "RecursiveCharacterTextSplitter",
                TokenizerSource::Tiktoken,
                "cl100k_base",
            ),
            Self::tokenized("MarkdownTextSplitter", TokenizerSource::Tiktoken, "cl100k_base"),
            Self {
                name: "MarkdownHeaderTextSplitter".to_string(),
                source: None,
                tokenizer_name_or_path: String::new(),
                headers_to_split_on: vec![
                    HeaderRule::new("#", "head1"),
                    HeaderRule::new("##", "head2"),
                    HeaderRule::new("###", "head3"),
                    HeaderRule::new("####", "head4"),
                ],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.chunk_overlap, 200);
        assert_eq!(settings.text_splitter_name, "RecursiveCharacterTextSplitter");
        assert!(!settings.log_verbose);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let settings = Settings {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            chunk_size: 0,
            chunk_overlap: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_splitter_spec_lookup() {
        let settings = Settings::default();
        let spec = settings.splitter_spec("recursivecharactertextsplitter").unwrap();
        assert_eq!(spec.source, Some(TokenizerSource::Tiktoken));
        assert_eq!(spec.tokenizer_name_or_path, "cl100k_base");

        let headers = &settings.splitter_spec("MarkdownHeaderTextSplitter").unwrap().headers_to_split_on;
        assert_eq!(headers.len(), 4);
        assert_eq!(headers[1], HeaderRule::new("##", "head2"));

        assert!(settings.splitter_spec("NoSuchSplitter").is_none());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.toml");
        std::fs::write(
            &path,
            "chunk_size = 500\nchunk_overlap = 50\ntext_splitter_name = \"MarkdownHeaderTextSplitter\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.chunk_size, 500);
        assert_eq!(settings.chunk_overlap, 50);
        assert_eq!(settings.text_splitter_name, "MarkdownHeaderTextSplitter");
        // Tables not mentioned in the file keep their defaults
        assert_eq!(settings.loaders.len(), LoaderSpec::defaults().len());
    }

    #[test]
    fn test_load_from_file_rejects_invalid_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.toml");
        std::fs::write(&path, "chunk_size = 100\nchunk_overlap = 300\n").unwrap();

        assert!(Settings::load_from(&path).is_err());
    }
}

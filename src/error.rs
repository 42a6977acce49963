//! Error types for the ingestion pipeline.
//!
//! Data-layer failures (I/O, malformed content, OCR) are surfaced as [`Error`]
//! and propagate to the caller. Splitter construction failures are
//! [`SplitterError`]s; they never leave the splitter factory, which degrades
//! to its default splitter instead.

use thiserror::Error;

/// Main error type for loading and chunking knowledge files.
#[derive(Error, Debug)]
pub enum Error {
    /// File extension is not in the supported set
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Content could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// OCR engine missing or failed
    #[error("ocr error: {0}")]
    Ocr(String),

    /// External document conversion (legacy office formats) failed
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A loader option has an invalid or missing value
    #[error("invalid loader option: {0}")]
    InvalidOption(String),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// A background task panicked or was cancelled
    #[error("task error: {0}")]
    Task(String),
}

impl Error {
    /// Build a parse error for a given file.
    pub fn parse(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Error::Parse(format!("{}: {}", path, reason))
    }
}

/// Splitter construction errors.
#[derive(Error, Debug)]
pub enum SplitterError {
    #[error("unknown text splitter: {0}")]
    UnknownSplitter(String),

    #[error("no splitter spec configured for {0}")]
    MissingSpec(String),

    #[error("{splitter} does not support pipeline {pipeline}")]
    UnsupportedPipeline { splitter: String, pipeline: String },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid separator pattern: {0}")]
    InvalidSeparator(#[from] regex::Error),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_display() {
        let err = Error::UnsupportedFormat("notes.xyz".to_string());
        assert_eq!(err.to_string(), "unsupported file format: notes.xyz");
    }

    #[test]
    fn test_parse_helper() {
        let err = Error::parse("a/b.json", "unexpected end of input");
        assert_eq!(err.to_string(), "parse error: a/b.json: unexpected end of input");
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_splitter_pipeline_display() {
        let err = SplitterError::UnsupportedPipeline {
            splitter: "RecursiveCharacterTextSplitter".to_string(),
            pipeline: "zh_core_web_sm".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "RecursiveCharacterTextSplitter does not support pipeline zh_core_web_sm"
        );
    }
}

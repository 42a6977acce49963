//! One document of a knowledge base and its path from file to chunks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::loaders::LoaderOptions;
use crate::paths;
use crate::pipeline::Pipeline;
use crate::splitters::TextSplitter;
use crate::types::{RawDocument, Settings, TextChunk};

/// Where a knowledge file is in its lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Constructed,
    DocumentsLoaded,
    Chunked,
}

/// Parameters of one split.
#[derive(Clone)]
pub struct SplitOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Use this splitter instead of the configured one
    pub splitter: Option<Arc<dyn TextSplitter>>,
}

impl SplitOptions {
    /// Configured chunk size and overlap, configured splitter.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            splitter: None,
        }
    }

    pub fn with_sizes(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn TextSplitter>) -> Self {
        self.splitter = Some(splitter);
        self
    }
}

impl fmt::Debug for SplitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitOptions")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("splitter", &self.splitter.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// What produced a cached chunk list. Caller-supplied splitters are compared
/// by identity; the key holds the `Arc` so its address cannot be reused.
#[derive(Clone)]
enum SplitterKey {
    Configured(String),
    Override(Arc<dyn TextSplitter>),
}

impl SplitterKey {
    fn name(&self) -> &str {
        match self {
            Self::Configured(name) => name,
            Self::Override(splitter) => splitter.name(),
        }
    }
}

impl PartialEq for SplitterKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Configured(a), Self::Configured(b)) => a == b,
            (Self::Override(a), Self::Override(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Clone, PartialEq)]
struct ChunkKey {
    splitter: SplitterKey,
    chunk_size: usize,
    chunk_overlap: usize,
}

/// A single file of a knowledge base.
///
/// Documents and chunks are produced lazily and cached, so a file is read
/// at most once however often its chunks are requested.
pub struct KnowledgeFile {
    pipeline: Arc<Pipeline>,
    knowledge_base_name: String,
    filename: String,
    ext: String,
    filepath: PathBuf,
    loader_name: Option<String>,
    splitter_name: String,
    loader_options: LoaderOptions,
    docs: Option<Vec<RawDocument>>,
    chunks: Option<(ChunkKey, Vec<TextChunk>)>,
}

impl KnowledgeFile {
    /// Bind a file name to a knowledge base.
    ///
    /// Fails with [`Error::UnsupportedFormat`] when no loader is registered
    /// for the file's extension.
    pub fn new(filename: &str, knowledge_base_name: &str, pipeline: Arc<Pipeline>) -> Result<Self> {
        let filename = paths::normalize_filename(filename);
        let ext = Path::new(&filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        if !pipeline.registry().is_supported(&ext) {
            return Err(Error::UnsupportedFormat(filename));
        }

        let settings = pipeline.settings();
        let filepath = paths::file_path(&settings.kb_root_path, knowledge_base_name, &filename);
        let loader_name = pipeline.registry().resolve_loader_name(&ext).map(str::to_string);
        let splitter_name = settings.text_splitter_name.clone();

        Ok(Self {
            knowledge_base_name: knowledge_base_name.to_string(),
            filename,
            ext,
            filepath,
            loader_name,
            splitter_name,
            loader_options: LoaderOptions::default(),
            docs: None,
            chunks: None,
            pipeline,
        })
    }

    /// Set loader options that override the per-loader defaults.
    pub fn with_loader_options(mut self, options: LoaderOptions) -> Self {
        self.loader_options = options;
        self
    }

    pub fn knowledge_base_name(&self) -> &str {
        &self.knowledge_base_name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Lowercased extension including the leading dot.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    pub fn loader_name(&self) -> Option<&str> {
        self.loader_name.as_deref()
    }

    pub fn splitter_name(&self) -> &str {
        &self.splitter_name
    }

    pub fn loader_options(&self) -> &LoaderOptions {
        &self.loader_options
    }

    pub fn state(&self) -> FileState {
        match (&self.docs, &self.chunks) {
            (_, Some(_)) => FileState::Chunked,
            (Some(_), None) => FileState::DocumentsLoaded,
            (None, None) => FileState::Constructed,
        }
    }

    pub fn exists(&self) -> bool {
        self.filepath.is_file()
    }

    /// Last modification time of the file.
    pub fn mtime(&self) -> Result<SystemTime> {
        Ok(std::fs::metadata(&self.filepath)?.modified()?)
    }

    /// File size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.filepath)?.len())
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.docs.is_some() {
            return Ok(());
        }

        let loader = self.pipeline.loaders().create_loader(
            self.loader_name.as_deref(),
            &self.filepath,
            &self.loader_options,
        )?;
        info!("{} used for {}", loader.name(), self.filepath.display());

        let docs = loader.load()?;
        debug!(file = %self.filename, documents = docs.len(), "Documents loaded");
        self.docs = Some(docs);
        Ok(())
    }

    /// Load the file into documents (once).
    pub fn load_documents(&mut self) -> Result<&[RawDocument]> {
        self.ensure_loaded()?;
        Ok(self.docs.as_deref().unwrap_or_default())
    }

    /// Split the file's documents into chunks, loading them first if needed.
    ///
    /// CSV rows are already chunk-sized and pass through unchanged. A
    /// structural splitter only sees the first document. A repeated call
    /// with the same splitter and sizes returns the cached chunks.
    pub fn split_into_chunks(&mut self, options: &SplitOptions) -> Result<&[TextChunk]> {
        self.ensure_loaded()?;

        let key = ChunkKey {
            splitter: match &options.splitter {
                Some(splitter) => SplitterKey::Override(Arc::clone(splitter)),
                None => SplitterKey::Configured(self.splitter_name.clone()),
            },
            chunk_size: options.chunk_size,
            chunk_overlap: options.chunk_overlap,
        };

        let cached = matches!(&self.chunks, Some((cached, _)) if *cached == key);
        if !cached {
            let chunks = self.docs_to_chunks(options);
            debug!(file = %self.filename, splitter = key.splitter.name(), chunks = chunks.len(), "File split");
            self.chunks = Some((key, chunks));
        }

        Ok(self.chunks.as_ref().map(|(_, chunks)| chunks.as_slice()).unwrap_or_default())
    }

    fn docs_to_chunks(&self, options: &SplitOptions) -> Vec<TextChunk> {
        let docs = self.docs.as_deref().unwrap_or_default();
        if docs.is_empty() {
            return Vec::new();
        }

        if self.ext == ".csv" {
            return docs.iter().cloned().map(TextChunk::from).collect();
        }

        let splitter = match &options.splitter {
            Some(splitter) => Arc::clone(splitter),
            None => self.pipeline.splitters().make_text_splitter(
                &self.splitter_name,
                options.chunk_size,
                options.chunk_overlap,
            ),
        };

        if splitter.is_structural() {
            splitter.split_text(&docs[0].content)
        } else {
            splitter.split_documents(docs)
        }
    }

    /// Load and split with the configured splitter and sizes.
    pub fn file_to_chunks(&mut self) -> Result<&[TextChunk]> {
        let options = SplitOptions::from_settings(self.pipeline.settings());
        self.split_into_chunks(&options)
    }
}

impl fmt::Debug for KnowledgeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeFile")
            .field("knowledge_base_name", &self.knowledge_base_name)
            .field("filename", &self.filename)
            .field("loader_name", &self.loader_name)
            .field("splitter_name", &self.splitter_name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use pretty_assertions::assert_eq;

    fn pipeline_with(root: &Path, splitter: &str) -> Arc<Pipeline> {
        let settings = Settings {
            kb_root_path: root.to_path_buf(),
            text_splitter_name: splitter.to_string(),
            ..Default::default()
        };
        Arc::new(Pipeline::new(settings).unwrap())
    }

    fn write_kb_file(root: &Path, kb: &str, name: &str, bytes: &[u8]) {
        let path = paths::file_path(root, kb, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_construction() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");

        let file = KnowledgeFile::new("./docs\\Guide.PDF", "kb", pipeline.clone()).unwrap();
        assert_eq!(file.filename(), "docs/Guide.PDF");
        assert_eq!(file.ext(), ".pdf");
        assert_eq!(file.loader_name(), Some("RapidOCRPDFLoader"));
        assert_eq!(file.splitter_name(), "RecursiveCharacterTextSplitter");
        assert_eq!(file.filepath(), paths::file_path(dir.path(), "kb", "docs/Guide.PDF"));
        assert_eq!(file.state(), FileState::Constructed);
        assert!(!file.exists());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");

        for name in ["tool.exe", "README"] {
            let err = KnowledgeFile::new(name, "kb", pipeline.clone()).unwrap_err();
            assert!(matches!(err, Error::UnsupportedFormat(_)));
        }
    }

    #[test]
    fn test_documents_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        write_kb_file(dir.path(), "kb", "a.txt", b"first");
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");

        let mut file = pipeline.knowledge_file("a.txt", "kb").unwrap();
        let first = file.load_documents().unwrap().to_vec();
        assert_eq!(file.state(), FileState::DocumentsLoaded);

        // A changed file on disk is not re-read
        write_kb_file(dir.path(), "kb", "a.txt", b"second");
        let second = file.load_documents().unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(second[0].content, "first");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");
        let mut file = pipeline.knowledge_file("missing.txt", "kb").unwrap();
        assert!(matches!(file.load_documents(), Err(Error::Io(_))));
    }

    #[test]
    fn test_csv_rows_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        write_kb_file(dir.path(), "kb", "t.csv", b"a,b\n1,2\n3,4\n");
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");

        let mut file = pipeline.knowledge_file("t.csv", "kb").unwrap();
        let docs = file.load_documents().unwrap().to_vec();
        let chunks = file.file_to_chunks().unwrap().to_vec();
        assert_eq!(chunks.len(), docs.len());
        for (chunk, doc) in chunks.iter().zip(&docs) {
            assert_eq!(chunk.content, doc.content);
            assert_eq!(chunk.metadata, doc.metadata);
        }
        assert_eq!(file.state(), FileState::Chunked);
    }

    #[test]
    fn test_structural_split_of_markdown() {
        let dir = tempfile::tempdir().unwrap();
        write_kb_file(dir.path(), "kb", "notes.md", b"# Title\ntext1\n## Sub\ntext2");
        let pipeline = pipeline_with(dir.path(), "MarkdownHeaderTextSplitter");

        let mut file = pipeline.knowledge_file("notes.md", "kb").unwrap();
        let chunks = file.file_to_chunks().unwrap();

        let expected_first: Metadata = [("head1".to_string(), "Title".to_string())].into();
        let expected_second: Metadata = [
            ("head1".to_string(), "Title".to_string()),
            ("head2".to_string(), "Sub".to_string()),
        ]
        .into();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "text1");
        assert_eq!(chunks[0].metadata, expected_first);
        assert_eq!(chunks[1].content, "text2");
        assert_eq!(chunks[1].metadata, expected_second);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write_kb_file(dir.path(), "kb", "empty.txt", b"");
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");

        let mut file = pipeline.knowledge_file("empty.txt", "kb").unwrap();
        assert!(file.file_to_chunks().unwrap().is_empty());
    }

    #[test]
    fn test_broken_splitter_name_still_splits() {
        let dir = tempfile::tempdir().unwrap();
        let text = "word ".repeat(400);
        write_kb_file(dir.path(), "kb", "long.txt", text.as_bytes());
        let pipeline = pipeline_with(dir.path(), "NoSuchSplitter");

        let mut file = pipeline.knowledge_file("long.txt", "kb").unwrap();
        let options = SplitOptions::from_settings(pipeline.settings()).with_sizes(50, 10);
        let chunks = file.split_into_chunks(&options).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.metadata["source"].ends_with("long.txt")));
    }

    #[test]
    fn test_chunks_recomputed_for_new_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let text = "alpha beta gamma delta ".repeat(100);
        write_kb_file(dir.path(), "kb", "a.txt", text.as_bytes());
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");
        let mut file = pipeline.knowledge_file("a.txt", "kb").unwrap();

        let base = SplitOptions::from_settings(pipeline.settings());
        let coarse = file.split_into_chunks(&base.clone().with_sizes(400, 0)).unwrap().len();
        let again = file.split_into_chunks(&base.clone().with_sizes(400, 0)).unwrap().len();
        let fine = file.split_into_chunks(&base.with_sizes(40, 0)).unwrap().len();
        assert_eq!(coarse, again);
        assert!(fine > coarse);
    }

    #[test]
    fn test_override_splitters_are_not_confused() {
        use crate::splitters::{CharCounter, RecursiveCharacterTextSplitter, SizeBudget};

        let dir = tempfile::tempdir().unwrap();
        let text = "alpha beta gamma delta ".repeat(100);
        write_kb_file(dir.path(), "kb", "a.txt", text.as_bytes());
        let pipeline = pipeline_with(dir.path(), "RecursiveCharacterTextSplitter");
        let mut file = pipeline.knowledge_file("a.txt", "kb").unwrap();

        let splitter = |size| -> Arc<dyn TextSplitter> {
            Arc::new(RecursiveCharacterTextSplitter::new(
                SizeBudget::new(size, 0, Arc::new(CharCounter)).unwrap(),
            ))
        };
        let big = splitter(1000);
        let small = splitter(50);
        let base = SplitOptions::from_settings(pipeline.settings());

        let coarse = file.split_into_chunks(&base.clone().with_splitter(Arc::clone(&big))).unwrap().len();
        let fine = file.split_into_chunks(&base.clone().with_splitter(Arc::clone(&small))).unwrap().len();
        let direct = small.split_documents(file.load_documents().unwrap()).len();
        assert_eq!(fine, direct);
        assert!(fine > coarse);

        let again = file.split_into_chunks(&base.with_splitter(big)).unwrap().len();
        assert_eq!(again, coarse);
    }
}

//! Batch processing of whole knowledge bases.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::knowledge_file::{KnowledgeFile, SplitOptions};
use crate::pipeline::Pipeline;
use crate::types::TextChunk;

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum files processed concurrently
    pub concurrency: usize,
    /// Whether to continue on individual file failures
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            continue_on_error: true,
        }
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total_files: usize,
    pub processed_files: usize,
    pub failed_files: usize,
    pub total_chunks: usize,
    pub errors: Vec<BatchError>,
}

/// A file that could not be processed.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub filename: String,
    pub error: String,
}

/// The chunks of one file.
#[derive(Debug, Clone)]
pub struct FileChunks {
    pub filename: String,
    pub chunks: Vec<TextChunk>,
}

/// Runs the file-to-chunks pipeline over many files.
///
/// Loading and splitting block, so each file runs on the blocking thread
/// pool; results come back in input order.
pub struct BatchProcessor {
    pipeline: Arc<Pipeline>,
    config: BatchConfig,
}

impl BatchProcessor {
    /// Create a new batch processor.
    pub fn new(pipeline: Arc<Pipeline>, config: BatchConfig) -> Self {
        Self { pipeline, config }
    }

    /// Chunk every loadable file of a knowledge base.
    pub async fn process_knowledge_base(
        &self,
        knowledge_base_name: &str,
        options: SplitOptions,
    ) -> Result<(Vec<FileChunks>, BatchResult)> {
        let filenames = self.pipeline.list_files(knowledge_base_name)?;
        self.process_files(knowledge_base_name, filenames, options).await
    }

    /// Chunk the given files of a knowledge base.
    pub async fn process_files(
        &self,
        knowledge_base_name: &str,
        filenames: Vec<String>,
        options: SplitOptions,
    ) -> Result<(Vec<FileChunks>, BatchResult)> {
        let total_files = filenames.len();
        let mut result = BatchResult {
            total_files,
            ..Default::default()
        };
        let mut files = Vec::with_capacity(total_files);

        info!(knowledge_base = knowledge_base_name, total_files, "Starting batch processing");

        let mut outcomes = stream::iter(filenames)
            .map(|filename| {
                let pipeline = Arc::clone(&self.pipeline);
                let kb = knowledge_base_name.to_string();
                let options = options.clone();
                async move {
                    let name = filename.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        process_file(pipeline, &kb, &name, &options)
                    })
                    .await
                    .map_err(|e| Error::Task(e.to_string()))
                    .and_then(|r| r);
                    (filename, outcome)
                }
            })
            .buffered(self.config.concurrency.max(1));

        while let Some((filename, outcome)) = outcomes.next().await {
            match outcome {
                Ok(chunks) => {
                    debug!(file = %filename, chunks = chunks.len(), "File processed");
                    result.processed_files += 1;
                    result.total_chunks += chunks.len();
                    files.push(FileChunks { filename, chunks });
                }
                Err(e) => {
                    result.failed_files += 1;
                    result.errors.push(BatchError {
                        filename: filename.clone(),
                        error: e.to_string(),
                    });

                    if !self.config.continue_on_error {
                        return Err(e);
                    }

                    warn!(file = %filename, error = %e, "Failed to process file");
                }
            }
        }

        info!(
            processed = result.processed_files,
            failed = result.failed_files,
            chunks = result.total_chunks,
            "Batch processing complete"
        );

        Ok((files, result))
    }
}

fn process_file(
    pipeline: Arc<Pipeline>,
    knowledge_base_name: &str,
    filename: &str,
    options: &SplitOptions,
) -> Result<Vec<TextChunk>> {
    let mut file = KnowledgeFile::new(filename, knowledge_base_name, pipeline)?;
    Ok(file.split_into_chunks(options)?.to_vec())
}

//! Chunk every file of a knowledge base and print a summary.
//!
//! ```text
//! cargo run --example ingest_kb -- <knowledge-base-name>
//! ```
//!
//! Settings come from `config/kb_chunker.*` and `KB_*` environment variables
//! (for example `KB_KB_ROOT_PATH=/data/knowledge_base`).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use kb_chunker::logging::init_tracing;
use kb_chunker::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings).context("installing tracing subscriber")?;

    let kb = std::env::args().nth(1).unwrap_or_else(|| "samples".to_string());
    let pipeline = Arc::new(Pipeline::new(settings)?);

    info!("Starting kb-chunker demo v{}", env!("CARGO_PKG_VERSION"));

    let options = SplitOptions::from_settings(pipeline.settings());
    let processor = BatchProcessor::new(Arc::clone(&pipeline), BatchConfig::default());
    let (files, result) = processor
        .process_knowledge_base(&kb, options)
        .await
        .with_context(|| format!("processing knowledge base {}", kb))?;

    for file in &files {
        println!("{:>6} chunks  {}", file.chunks.len(), file.filename);
        if let Some(first) = file.chunks.first() {
            let preview: String = first.content.chars().take(80).collect();
            println!("        {}", preview.replace('\n', " "));
        }
    }
    for error in &result.errors {
        println!("FAILED  {}: {}", error.filename, error.error);
    }
    println!(
        "{} of {} files, {} chunks",
        result.processed_files, result.total_files, result.total_chunks
    );

    Ok(())
}

//! End-to-end tests: knowledge-base files through loading and splitting.

use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use kb_chunker::paths;
use kb_chunker::prelude::*;
use kb_chunker::splitters::{CharCounter, RecursiveCharacterTextSplitter, SizeBudget, TokenCounter};

const KB: &str = "samples";

fn pipeline(root: &Path, splitter: &str) -> Arc<Pipeline> {
    let settings = Settings {
        kb_root_path: root.to_path_buf(),
        text_splitter_name: splitter.to_string(),
        ..Default::default()
    };
    Arc::new(Pipeline::new(settings).unwrap())
}

fn write(root: &Path, name: &str, bytes: &[u8]) {
    let path = paths::file_path(root, KB, name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn long_text() -> String {
    (0..300)
        .map(|i| format!("Sentence number {} talks about knowledge bases and chunking.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_every_supported_extension_has_a_loader() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");

    for ext in pipeline.registry().supported_extensions() {
        let file = KnowledgeFile::new(&format!("doc{}", ext), KB, Arc::clone(&pipeline)).unwrap();
        let loader = file.loader_name().unwrap();
        assert!(pipeline.loaders().is_known(loader), "{} -> {}", ext, loader);
    }

    let err = KnowledgeFile::new("archive.rar", KB, Arc::clone(&pipeline)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
}

#[test]
fn test_size_bounded_chunks_overlap() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "long.txt", long_text().as_bytes());

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let splitter = Arc::new(RecursiveCharacterTextSplitter::new(
        SizeBudget::new(1000, 200, Arc::new(CharCounter)).unwrap(),
    ));
    let options = SplitOptions::from_settings(pipeline.settings()).with_splitter(splitter);

    let mut file = pipeline.knowledge_file("long.txt", KB).unwrap();
    let chunks = file.split_into_chunks(&options).unwrap();

    assert!(chunks.len() > 2);
    for chunk in chunks {
        assert!(CharCounter.count_tokens(&chunk.content) <= 1000);
    }
    for pair in chunks.windows(2) {
        let head: String = pair[1].content.chars().take(100).collect();
        assert!(pair[0].content.contains(&head), "no overlap between neighbours");
    }
}

#[test]
fn test_configured_token_splitter_respects_size() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "long.txt", long_text().as_bytes());

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let counter = kb_chunker::splitters::TiktokenCounter::new().unwrap();

    for (size, overlap) in [(1000, 200), (200, 40)] {
        let mut file = pipeline.knowledge_file("long.txt", KB).unwrap();
        let options = SplitOptions::from_settings(pipeline.settings()).with_sizes(size, overlap);
        let chunks = file.split_into_chunks(&options).unwrap().to_vec();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            let tokens = counter.count_tokens(&chunk.content);
            assert!(tokens <= size, "{} tokens with chunk_size {}", tokens, size);
        }
    }
}

#[test]
fn test_markdown_headers_become_metadata() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "guide.md", b"# A\nintro\n## B\ndetails under b\n# C\nlast");

    let pipeline = pipeline(dir.path(), "MarkdownHeaderTextSplitter");
    let mut file = pipeline.knowledge_file("guide.md", KB).unwrap();
    let chunks = file.file_to_chunks().unwrap();

    let under_b = chunks.iter().find(|c| c.content == "details under b").unwrap();
    assert_eq!(under_b.metadata.get("head1").map(String::as_str), Some("A"));
    assert_eq!(under_b.metadata.get("head2").map(String::as_str), Some("B"));

    let last = chunks.last().unwrap();
    assert_eq!(last.content, "last");
    assert_eq!(last.metadata.get("head2"), None);
}

#[test]
fn test_csv_chunks_equal_documents() {
    let dir = tempfile::tempdir().unwrap();
    let (gbk, _, _) = encoding_rs::GBK.encode("名称,说明\n中国,我们的国家\n北京,中国的首都\n");
    write(dir.path(), "places.csv", &gbk);

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let mut file = pipeline.knowledge_file("places.csv", KB).unwrap();
    let docs = file.load_documents().unwrap().to_vec();
    let chunks = file.file_to_chunks().unwrap().to_vec();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].content, "名称: 中国\n说明: 我们的国家");
    assert_eq!(chunks.len(), docs.len());
    assert_eq!(chunks[1].content, docs[1].content);
}

#[test]
fn test_json_document_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "faq.json", br#"{"q": "What is it?", "a": "A chunker."}"#);

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let mut file = pipeline.knowledge_file("faq.json", KB).unwrap();
    let docs = file.load_documents().unwrap();

    assert_eq!(docs.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&docs[0].content).unwrap();
    assert_eq!(value["a"], "A chunker.");
}

#[test]
fn test_loader_options_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "items.jsonl", b"{\"t\": \"one\"}\n{\"t\": \"two\"}\n");

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let options = LoaderOptions {
        jq_schema: Some(".t".to_string()),
        ..Default::default()
    };
    let mut file = pipeline
        .knowledge_file("items.jsonl", KB)
        .unwrap()
        .with_loader_options(options);
    let chunks = file.file_to_chunks().unwrap();

    let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);
    assert_eq!(chunks[1].metadata["seq_num"], "2");
}

#[test]
fn test_empty_file_yields_no_chunks() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.txt", b"");

    let pipeline = pipeline(dir.path(), "ChineseRecursiveTextSplitter");
    let mut file = pipeline.knowledge_file("empty.txt", KB).unwrap();
    assert!(file.file_to_chunks().unwrap().is_empty());
}

#[test]
fn test_broken_splitter_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "long.txt", long_text().as_bytes());

    let pipeline = pipeline(dir.path(), "DoesNotExistSplitter");
    let splitter = pipeline.splitters().make_text_splitter("DoesNotExistSplitter", 100, 20);
    assert_eq!(splitter.name(), "RecursiveCharacterTextSplitter");

    let mut file = pipeline.knowledge_file("long.txt", KB).unwrap();
    let options = SplitOptions::from_settings(pipeline.settings()).with_sizes(100, 20);
    assert!(file.split_into_chunks(&options).unwrap().len() > 1);
}

#[tokio::test]
async fn test_batch_over_mixed_knowledge_base() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", b"# Notes\nSome notes.");
    write(dir.path(), "b.html", b"<html><body><p>Web page</p></body></html>");
    write(dir.path(), "c.csv", b"k,v\n1,2\n");
    write(dir.path(), "d.json", b"{ not json");
    write(dir.path(), "skip.exe", b"MZ");

    let pipeline = pipeline(dir.path(), "RecursiveCharacterTextSplitter");
    let processor = BatchProcessor::new(Arc::clone(&pipeline), BatchConfig::default());
    let options = SplitOptions::from_settings(pipeline.settings());
    let (files, result) = processor.process_knowledge_base(KB, options).await.unwrap();

    assert_eq!(result.total_files, 4);
    assert_eq!(result.processed_files, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].filename, "d.json");

    let html = files.iter().find(|f| f.filename == "b.html").unwrap();
    assert_eq!(html.chunks[0].content, "Web page");
}

//! PDF documents.

use std::path::{Path, PathBuf};

use lopdf::Document;

use super::ocr::OcrEngine;
use super::{source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

/// Loads a PDF as one document per page, with metadata `page` (1-based).
///
/// Pages without a text layer (scans) are rendered and recognized when the
/// OCR tools are installed; otherwise they stay empty and a warning is
/// logged. A failing OCR run fails the load.
pub struct RapidOCRPDFLoader {
    path: PathBuf,
    engine: OcrEngine,
}

impl RapidOCRPDFLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            engine: OcrEngine::new(options.ocr_language.as_deref().unwrap_or("eng")),
        })
    }

    pub fn with_engine(mut self, engine: OcrEngine) -> Self {
        self.engine = engine;
        self
    }

    fn scanned_page_text(&self, page: u32) -> Result<String> {
        if !self.engine.can_read_pdf_pages() {
            tracing::warn!(path = %self.path.display(), page, "Page has no text layer and OCR tools are not installed");
            return Ok(String::new());
        }
        self.engine.pdf_page_text(&self.path, page)
    }
}

impl Loader for RapidOCRPDFLoader {
    fn name(&self) -> &'static str {
        "RapidOCRPDFLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let document = Document::load_mem(&bytes).map_err(|e| Error::parse(self.path.display(), e))?;
        let source = source_of(&self.path);

        let mut docs = Vec::new();
        for page in document.get_pages().keys().copied() {
            let text = match document.extract_text(&[page]) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), page, error = %e, "No extractable text");
                    String::new()
                }
            };

            let text = if text.is_empty() {
                self.scanned_page_text(page)?
            } else {
                text
            };

            docs.push(RawDocument::new(text, source.clone()).with_meta("page", page));
        }

        tracing::debug!(path = %self.path.display(), pages = docs.len(), "PDF loaded");
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// A PDF whose pages carry the given strings; `None` is a page without text.
    fn pdf_bytes(pages: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_one_document_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, pdf_bytes(&[Some("First page"), None, Some("Third page")])).unwrap();

        let docs = RapidOCRPDFLoader::new(&path, &LoaderOptions::default())
            .unwrap()
            .with_engine(OcrEngine::disabled("eng"))
            .load()
            .unwrap();

        assert_eq!(docs.len(), 3);
        assert!(docs[0].content.contains("First page"));
        assert_eq!(docs[0].metadata["page"], "1");
        assert!(docs[1].is_empty());
        assert!(docs[2].content.contains("Third page"));
        assert_eq!(docs[2].metadata["page"], "3");
    }

    #[test]
    fn test_scanned_page_ocr_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, pdf_bytes(&[Some("Text layer"), None])).unwrap();

        let result = RapidOCRPDFLoader::new(&path, &LoaderOptions::default())
            .unwrap()
            .with_engine(OcrEngine::with_programs("eng", "/nonexistent/tesseract", "/nonexistent/pdftoppm"))
            .load();
        assert!(matches!(result, Err(Error::Ocr(_))));
    }

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 nothing else").unwrap();

        let result = RapidOCRPDFLoader::new(&path, &LoaderOptions::default())
            .unwrap()
            .with_engine(OcrEngine::disabled("eng"))
            .load();
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}

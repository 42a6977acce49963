//! Word and PowerPoint documents.
//!
//! Modern formats (`.docx`, `.pptx`) are read directly. Legacy binary
//! formats (`.doc`, `.ppt`) are first converted with a headless LibreOffice.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::process::Command;

use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableCellContent, TableChild, TableRowChild};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::markup::{open_archive, read_entry, xml_text};
use super::ocr::OcrEngine;
use super::{extension_of, source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Convert a legacy office file to its modern counterpart and return the
/// converted bytes.
fn convert_with_libreoffice(path: &Path, target: &str) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;

    let output = Command::new("libreoffice")
        .args(["--headless", "--convert-to", target, "--outdir"])
        .arg(dir.path())
        .arg(path)
        .output()
        .map_err(|e| Error::Conversion(format!("libreoffice is required to read {}: {}", path.display(), e)))?;

    if !output.status.success() {
        return Err(Error::Conversion(format!(
            "libreoffice failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let converted = dir.path().join(format!("{}.{}", stem, target));
    std::fs::read(&converted).map_err(|e| {
        Error::Conversion(format!("no converted output for {}: {}", path.display(), e))
    })
}

/// File bytes in the modern format, converting `legacy` extensions.
fn modern_bytes(path: &Path, legacy: &str, modern: &str) -> Result<Vec<u8>> {
    if extension_of(path) == legacy {
        tracing::debug!(path = %path.display(), target = modern, "Converting legacy office file");
        convert_with_libreoffice(path, modern)
    } else {
        Ok(std::fs::read(path)?)
    }
}

fn is_image(name: &str) -> bool {
    name.rsplit_once('.')
        .map_or(false, |(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn read_binary<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str, path: &Path) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| Error::parse(path.display(), format!("{}: {}", name, e)))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Recognize a list of archive images, keeping the non-empty texts.
fn ocr_images<R: Read + Seek>(
    engine: &OcrEngine,
    archive: &mut zip::ZipArchive<R>,
    names: &[String],
    path: &Path,
) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    for name in names {
        let bytes = read_binary(archive, name, path)?;
        let ext = name.rsplit_once('.').map_or("png", |(_, e)| e);
        let text = engine.image_bytes_text(&bytes, ext)?;
        if !text.is_empty() {
            texts.push(text);
        }
    }
    Ok(texts)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for child in &run.children {
                match child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

#[allow(irrefutable_let_patterns)]
fn table_lines(table: &docx_rs::Table, lines: &mut Vec<String>) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row else { continue };
        let cells: Vec<String> = row
            .cells
            .iter()
            .filter_map(|cell| {
                let TableRowChild::TableCell(cell) = cell else { return None };
                let text = cell
                    .children
                    .iter()
                    .filter_map(|content| match content {
                        TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(text)
            })
            .collect();

        if cells.iter().any(|c| !c.trim().is_empty()) {
            lines.push(cells.join(" | "));
        }
    }
}

/// Paragraph and table text of a `.docx` document, in body order.
fn docx_text(bytes: &[u8], path: &Path) -> Result<String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| Error::parse(path.display(), e))?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                let text = paragraph_text(p);
                if !text.trim().is_empty() {
                    lines.push(text);
                }
            }
            DocumentChild::Table(t) => table_lines(t, &mut lines),
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn docx_media(bytes: &[u8], path: &Path) -> Result<Vec<String>> {
    let archive = open_archive(bytes, path)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("word/media/") && is_image(n))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

/// Text and picture entries of one slide.
struct Slide {
    text: String,
    images: Vec<String>,
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(0)
}

/// Image targets of a slide's relationship part, resolved to archive names.
fn slide_images(rels: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(rels);
    let mut images = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut kind = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    let value = attr.unescape_value()?.into_owned();
                    match attr.key.as_ref() {
                        b"Type" => kind = value,
                        b"Target" => target = value,
                        _ => {}
                    }
                }
                if kind.ends_with("/image") && is_image(&target) {
                    let name = target.trim_start_matches("../");
                    images.push(format!("ppt/{}", name));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(images)
}

fn pptx_slides(bytes: &[u8], path: &Path) -> Result<Vec<Slide>> {
    let mut archive = open_archive(bytes, path)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|n| slide_number(n));

    let mut slides = Vec::with_capacity(names.len());
    for name in names {
        let xml = read_entry(&mut archive, &name, path)?;
        let text = xml_text(&xml, Some(&b"t"[..]), &[&b"p"[..]])
            .map_err(|e| Error::parse(path.display(), format!("{}: {}", name, e)))?;

        let rels_name = name.replacen("ppt/slides/", "ppt/slides/_rels/", 1) + ".rels";
        let images = match read_entry(&mut archive, &rels_name, path) {
            Ok(rels) => slide_images(&rels).map_err(|e| Error::parse(path.display(), e))?,
            Err(_) => Vec::new(),
        };

        slides.push(Slide { text, images });
    }

    Ok(slides)
}

/// Loads the text of a Word document as one document.
pub struct UnstructuredWordDocumentLoader {
    path: PathBuf,
}

impl UnstructuredWordDocumentLoader {
    pub fn new(path: &Path, _options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Loader for UnstructuredWordDocumentLoader {
    fn name(&self) -> &'static str {
        "UnstructuredWordDocumentLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = modern_bytes(&self.path, "doc", "docx")?;
        let text = docx_text(&bytes, &self.path)?;
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

/// Loads a Word document as one document, with the recognized text of its
/// embedded pictures appended after the body text.
pub struct RapidOCRDocLoader {
    path: PathBuf,
    engine: OcrEngine,
}

impl RapidOCRDocLoader {
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
}

impl Loader for RapidOCRDocLoader {
    fn name(&self) -> &'static str {
        "RapidOCRDocLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = modern_bytes(&self.path, "doc", "docx")?;
        let mut parts = vec![docx_text(&bytes, &self.path)?];

        let images = docx_media(&bytes, &self.path)?;
        if !images.is_empty() {
            if self.engine.is_available() {
                let mut archive = open_archive(&bytes, &self.path)?;
                parts.extend(ocr_images(&self.engine, &mut archive, &images, &self.path)?);
            } else {
                tracing::warn!(path = %self.path.display(), images = images.len(), "tesseract not installed, skipping embedded images");
            }
        }

        parts.retain(|p| !p.is_empty());
        Ok(vec![RawDocument::new(parts.join("\n"), source_of(&self.path))])
    }
}

/// Loads the slide text of a presentation as one document.
pub struct UnstructuredPowerPointLoader {
    path: PathBuf,
}

impl UnstructuredPowerPointLoader {
    pub fn new(path: &Path, _options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Loader for UnstructuredPowerPointLoader {
    fn name(&self) -> &'static str {
        "UnstructuredPowerPointLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = modern_bytes(&self.path, "ppt", "pptx")?;
        let text = pptx_slides(&bytes, &self.path)?
            .into_iter()
            .map(|s| s.text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

/// Loads a presentation as one document; each slide contributes its text
/// followed by the recognized text of its pictures.
pub struct RapidOCRPPTLoader {
    path: PathBuf,
    engine: OcrEngine,
}

impl RapidOCRPPTLoader {
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
}

impl Loader for RapidOCRPPTLoader {
    fn name(&self) -> &'static str {
        "RapidOCRPPTLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = modern_bytes(&self.path, "ppt", "pptx")?;
        let slides = pptx_slides(&bytes, &self.path)?;

        let image_count: usize = slides.iter().map(|s| s.images.len()).sum();
        if image_count > 0 && !self.engine.is_available() {
            tracing::warn!(path = %self.path.display(), images = image_count, "tesseract not installed, skipping slide images");
        }

        let mut archive = open_archive(&bytes, &self.path)?;
        let mut sections = Vec::new();
        for slide in slides {
            let mut parts = vec![slide.text];
            if self.engine.is_available() {
                parts.extend(ocr_images(&self.engine, &mut archive, &slide.images, &self.path)?);
            }
            parts.retain(|p| !p.is_empty());
            if !parts.is_empty() {
                sections.push(parts.join("\n"));
            }
        }

        Ok(vec![RawDocument::new(sections.join("\n\n"), source_of(&self.path))])
    }
}

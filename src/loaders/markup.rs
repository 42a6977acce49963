//! Markup formats: HTML, XML, EPUB, ODT and RTF.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{ElementRef, Html, Selector};

use super::encoding::decode_text;
use super::{source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

lazy_static::lazy_static! {
    static ref BODY: Selector = Selector::parse("body").unwrap();
    static ref TITLE: Selector = Selector::parse("title").unwrap();
}

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Visible text of an HTML document, one line per text node.
pub(crate) fn html_text(html: &str) -> (String, Option<String>) {
    let document = Html::parse_document(html);
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    (visible_lines(root).join("\n"), title)
}

fn visible_lines(root: ElementRef<'_>) -> Vec<String> {
    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map_or(false, |e| HIDDEN_TAGS.contains(&e.name()))
            });
            let text = text.trim();
            (!hidden && !text.is_empty()).then(|| text.to_string())
        })
        .collect()
}

/// Text of an XML document.
///
/// With `text_tag`, only text inside elements of that local name is kept.
/// The end of any element listed in `block_tags` starts a new line; without
/// block tags every text node is its own line.
pub(crate) fn xml_text(
    xml: &str,
    text_tag: Option<&[u8]>,
    block_tags: &[&[u8]],
) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut depth_in_text = 0usize;

    let end_line = |line: &mut String, lines: &mut Vec<String>| {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
        line.clear();
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if text_tag.map_or(false, |t| e.local_name().as_ref() == t) {
                    depth_in_text += 1;
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if text_tag.map_or(false, |t| name.as_ref() == t) {
                    depth_in_text = depth_in_text.saturating_sub(1);
                }
                if block_tags.iter().any(|b| name.as_ref() == *b) {
                    end_line(&mut line, &mut lines);
                }
            }
            Event::Text(e) => {
                if text_tag.is_none() || depth_in_text > 0 {
                    let text = e.unescape()?;
                    if !line.is_empty() && !block_tags.is_empty() {
                        line.push(' ');
                    }
                    line.push_str(&text);
                    if block_tags.is_empty() {
                        end_line(&mut line, &mut lines);
                    }
                }
            }
            Event::CData(e) => {
                if text_tag.is_none() || depth_in_text > 0 {
                    line.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    if block_tags.is_empty() {
                        end_line(&mut line, &mut lines);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    end_line(&mut line, &mut lines);

    Ok(lines.join("\n"))
}

pub(crate) fn open_archive<'a>(
    bytes: &'a [u8],
    path: &Path,
) -> Result<zip::ZipArchive<Cursor<&'a [u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::parse(path.display(), e))
}

/// Read one archive entry as UTF-8 text.
pub(crate) fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    path: &Path,
) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| Error::parse(path.display(), format!("{}: {}", name, e)))?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

/// Text of every XHTML entry of an EPUB, in archive order.
pub(crate) fn epub_sections(bytes: &[u8], path: &Path) -> Result<Vec<String>> {
    let mut archive = open_archive(bytes, path)?;
    let mut sections = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::parse(path.display(), e))?;
        let name = entry.name().to_lowercase();
        if !(name.ends_with(".xhtml") || name.ends_with(".html") || name.ends_with(".htm")) {
            continue;
        }

        let mut html = String::new();
        entry.read_to_string(&mut html)?;
        let (text, _) = html_text(&html);
        if !text.is_empty() {
            sections.push(text);
        }
    }

    Ok(sections)
}

/// Paragraph and heading text of an OpenDocument text file.
pub(crate) fn odt_text(bytes: &[u8], path: &Path) -> Result<String> {
    let mut archive = open_archive(bytes, path)?;
    let content = read_entry(&mut archive, "content.xml", path)?;
    xml_text(&content, None, &[&b"p"[..], &b"h"[..]]).map_err(|e| Error::parse(path.display(), e))
}

/// Plain text of an RTF document.
pub(crate) fn rtf_text(rtf: &str, path: &Path) -> Result<String> {
    let document = rtf_parser::document::RtfDocument::try_from(rtf)
        .map_err(|e| Error::parse(path.display(), format!("{:?}", e)))?;
    Ok(document.get_text())
}

/// Loads the visible text of an HTML page as one document.
pub struct UnstructuredHTMLLoader {
    path: PathBuf,
    encoding: Option<String>,
}

impl UnstructuredHTMLLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
        })
    }
}

impl Loader for UnstructuredHTMLLoader {
    fn name(&self) -> &'static str {
        "UnstructuredHTMLLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let html = decode_text(&bytes, self.encoding.as_deref(), true, &self.path)?;
        let (text, title) = html_text(&html);

        let mut doc = RawDocument::new(text, source_of(&self.path));
        if let Some(title) = title {
            doc = doc.with_meta("title", title);
        }
        Ok(vec![doc])
    }
}

/// Loads the element text of an XML file as one document.
pub struct UnstructuredXMLLoader {
    path: PathBuf,
    encoding: Option<String>,
}

impl UnstructuredXMLLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
        })
    }
}

impl Loader for UnstructuredXMLLoader {
    fn name(&self) -> &'static str {
        "UnstructuredXMLLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let xml = decode_text(&bytes, self.encoding.as_deref(), true, &self.path)?;
        let text = xml_text(&xml, None, &[]).map_err(|e| Error::parse(self.path.display(), e))?;
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

/// Loads the text of an EPUB book as one document.
pub struct UnstructuredEPubLoader {
    path: PathBuf,
}

impl UnstructuredEPubLoader {
    pub fn new(path: &Path, _options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Loader for UnstructuredEPubLoader {
    fn name(&self) -> &'static str {
        "UnstructuredEPubLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let text = epub_sections(&bytes, &self.path)?.join("\n\n");
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

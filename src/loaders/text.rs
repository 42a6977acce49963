//! Plain text and the generic partitioning loader.

use std::path::{Path, PathBuf};

use super::email::{msg_text, MessagePart};
use super::encoding::decode_text;
use super::markup::{epub_sections, odt_text, rtf_text, xml_text};
use super::{extension_of, source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

/// Loads any file as a single document, picking a text extraction strategy
/// from the extension.
///
/// Container formats (EPUB, ODT, RTF, e-mail) are unpacked; everything else
/// is decoded as text. This is also the loader of last resort when a
/// specialized loader fails.
pub struct UnstructuredFileLoader {
    path: PathBuf,
    encoding: Option<String>,
    autodetect_encoding: bool,
}

impl UnstructuredFileLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
            autodetect_encoding: options.autodetect_encoding.unwrap_or(false),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        decode_text(
            bytes,
            self.encoding.as_deref(),
            self.autodetect_encoding,
            &self.path,
        )
    }

    fn partition(&self, bytes: &[u8]) -> Result<String> {
        let path = &self.path;
        match extension_of(path).as_str() {
            "xml" => xml_text(&self.decode(bytes)?, None, &[]).map_err(|e| Error::parse(path.display(), e)),
            "epub" => Ok(epub_sections(bytes, path)?.join("\n\n")),
            "odt" => odt_text(bytes, path),
            "rtf" => rtf_text(&self.decode(bytes)?, path),
            "eml" => Ok(MessagePart::parse(&self.decode(bytes)?).text()),
            "msg" => Ok(msg_text(bytes)),
            _ => self.decode(bytes),
        }
    }
}

impl Loader for UnstructuredFileLoader {
    fn name(&self) -> &'static str {
        "UnstructuredFileLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let text = self.partition(&bytes)?;
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

/// Loads a Markdown file verbatim, so header markers survive for structural
/// splitting.
pub struct UnstructuredMarkdownLoader {
    path: PathBuf,
    encoding: Option<String>,
}

impl UnstructuredMarkdownLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoding: options.encoding.clone(),
        })
    }
}

impl Loader for UnstructuredMarkdownLoader {
    fn name(&self) -> &'static str {
        "UnstructuredMarkdownLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        let bytes = std::fs::read(&self.path)?;
        let text = decode_text(&bytes, self.encoding.as_deref(), true, &self.path)?;
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::test_util::zip_bytes;
    use pretty_assertions::assert_eq;

    fn load_file(name: &str, bytes: &[u8], options: &LoaderOptions) -> Result<Vec<RawDocument>> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        UnstructuredFileLoader::new(&path, options)?.load()
    }

    #[test]
    fn test_plain_text_is_one_document() {
        let docs = load_file("a.txt", "line one\nline two\n".as_bytes(), &LoaderOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "line one\nline two\n");
        assert!(docs[0].metadata["source"].ends_with("/a.txt"));
    }

    #[test]
    fn test_empty_file_gives_empty_document() {
        let docs = load_file("empty.txt", b"", &LoaderOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].is_empty());
    }

    #[test]
    fn test_autodetect_encoding() {
        let (bytes, _, _) = encoding_rs::GBK.encode("我们的国家是一个大的国家，你说这个时候他在中国。");

        let strict = load_file("gbk.txt", &bytes, &LoaderOptions::default());
        assert!(matches!(strict, Err(Error::Parse(_))));

        let options = LoaderOptions {
            autodetect_encoding: Some(true),
            ..Default::default()
        };
        let docs = load_file("gbk.txt", &bytes, &options).unwrap();
        assert_eq!(docs[0].content, "我们的国家是一个大的国家，你说这个时候他在中国。");
    }

    #[test]
    fn test_partitions_containers() {
        let content = r#"<office:document-content xmlns:office="o" xmlns:text="t"><text:p>Odt body</text:p></office:document-content>"#;
        let odt = zip_bytes(&[("content.xml", content)]);
        let docs = load_file("a.odt", &odt, &LoaderOptions::default()).unwrap();
        assert_eq!(docs[0].content, "Odt body");

        let xml = load_file("a.xml", b"<a><b>one</b><b>two</b></a>", &LoaderOptions::default()).unwrap();
        assert_eq!(xml[0].content, "one\ntwo");

        let eml = load_file("a.eml", b"Subject: hi\n\nMail body\n", &LoaderOptions::default()).unwrap();
        assert_eq!(eml[0].content.trim(), "Mail body");
    }

    #[test]
    fn test_markdown_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nSome *text*.\n").unwrap();

        let docs = UnstructuredMarkdownLoader::new(&path, &LoaderOptions::default())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(docs[0].content, "# Title\n\nSome *text*.\n");
    }
}

//! OCR through the external `tesseract` and `pdftoppm` tools.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{source_of, Loader, LoaderOptions};
use crate::error::{Error, Result};
use crate::types::RawDocument;

lazy_static::lazy_static! {
    static ref HAS_TESSERACT: bool = has_tool("tesseract", "--version");
    // pdftoppm -v exits non-zero on some builds, so only spawning is checked
    static ref HAS_PDFTOPPM: bool = Command::new("pdftoppm").arg("-v").output().is_ok();
}

fn has_tool(program: &str, version_flag: &str) -> bool {
    Command::new(program)
        .arg(version_flag)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Text recognition for images and rendered PDF pages.
///
/// A tool set to `None` is treated as not installed.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    language: String,
    tesseract: Option<PathBuf>,
    pdftoppm: Option<PathBuf>,
}

impl OcrEngine {
    /// Engine for `language`, using whichever tools are installed.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            tesseract: HAS_TESSERACT.then(|| PathBuf::from("tesseract")),
            pdftoppm: HAS_PDFTOPPM.then(|| PathBuf::from("pdftoppm")),
        }
    }

    /// Engine that behaves as if no OCR tools were installed.
    pub fn disabled(language: &str) -> Self {
        Self {
            language: language.to_string(),
            tesseract: None,
            pdftoppm: None,
        }
    }

    /// Engine running the given `tesseract` and `pdftoppm` binaries.
    pub fn with_programs(
        language: &str,
        tesseract: impl Into<PathBuf>,
        pdftoppm: impl Into<PathBuf>,
    ) -> Self {
        Self {
            language: language.to_string(),
            tesseract: Some(tesseract.into()),
            pdftoppm: Some(pdftoppm.into()),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Whether images can be recognized.
    pub fn is_available(&self) -> bool {
        self.tesseract.is_some()
    }

    /// Whether PDF pages can be rendered and recognized.
    pub fn can_read_pdf_pages(&self) -> bool {
        self.tesseract.is_some() && self.pdftoppm.is_some()
    }

    /// Recognize the text of an image file.
    pub fn image_text(&self, image: &Path) -> Result<String> {
        let Some(tesseract) = &self.tesseract else {
            return Err(Error::Ocr(format!(
                "tesseract is required to read {}",
                image.display()
            )));
        };

        let output = Command::new(tesseract)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .map_err(|e| Error::Ocr(format!("tesseract failed on {}: {}", image.display(), e)))?;

        if !output.status.success() {
            return Err(Error::Ocr(format!(
                "tesseract error on {}: {}",
                image.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(image = %image.display(), chars = text.len(), "OCR finished");
        Ok(text)
    }

    /// Recognize the text of an in-memory image (an embedded picture).
    pub fn image_bytes_text(&self, bytes: &[u8], extension: &str) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join(format!("image.{}", extension));
        std::fs::write(&image, bytes)?;
        self.image_text(&image)
    }

    /// Render one PDF page (1-based) and recognize its text.
    pub fn pdf_page_text(&self, pdf: &Path, page: u32) -> Result<String> {
        let (Some(pdftoppm), true) = (&self.pdftoppm, self.is_available()) else {
            return Err(Error::Ocr(format!(
                "pdftoppm and tesseract are required to read scanned pages of {}",
                pdf.display()
            )));
        };

        let dir = tempfile::tempdir()?;
        let page_arg = page.to_string();
        let output = Command::new(pdftoppm)
            .args(["-png", "-r", "150", "-f", &page_arg, "-l", &page_arg])
            .arg(pdf)
            .arg(dir.path().join("page"))
            .output()
            .map_err(|e| Error::Ocr(format!("pdftoppm failed: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Ocr(format!(
                "pdftoppm error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        images.sort();

        let mut texts = Vec::new();
        for image in &images {
            texts.push(self.image_text(image)?);
        }
        Ok(texts.join("\n"))
    }
}

/// Loads the recognized text of an image as one document.
pub struct RapidOCRLoader {
    path: PathBuf,
    engine: OcrEngine,
}

impl RapidOCRLoader {
    pub fn new(path: &Path, options: &LoaderOptions) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            engine: OcrEngine::new(options.ocr_language.as_deref().unwrap_or("eng")),
        })
    }

    /// Use a specific engine instead of the installed tools.
    pub fn with_engine(mut self, engine: OcrEngine) -> Self {
        self.engine = engine;
        self
    }
}

impl Loader for RapidOCRLoader {
    fn name(&self) -> &'static str {
        "RapidOCRLoader"
    }

    fn load(&self) -> Result<Vec<RawDocument>> {
        if !self.path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", self.path.display()),
            )));
        }
        let text = self.engine.image_text(&self.path)?;
        Ok(vec![RawDocument::new(text, source_of(&self.path))])
    }
}

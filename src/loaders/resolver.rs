//! Loader construction by name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};

use super::encoding::detect_encoding;
use super::{
    CSVLoader, FilteredCSVLoader, JSONLinesLoader, JSONLoader, Loader, LoaderOptions,
    NotebookLoader, RapidOCRDocLoader, RapidOCRLoader, RapidOCRPDFLoader, RapidOCRPPTLoader,
    UnstructuredEPubLoader, UnstructuredEmailLoader, UnstructuredExcelLoader,
    UnstructuredFileLoader, UnstructuredHTMLLoader, UnstructuredMarkdownLoader,
    UnstructuredPowerPointLoader, UnstructuredWordDocumentLoader, UnstructuredXMLLoader,
};
use crate::error::Result;
use crate::types::Settings;

type LoaderFactory = fn(&Path, &LoaderOptions) -> Result<Box<dyn Loader>>;

macro_rules! factory {
    ($loader:ty) => {
        |path: &Path, options: &LoaderOptions| -> Result<Box<dyn Loader>> {
            Ok(Box::new(<$loader>::new(path, options)?))
        }
    };
}

/// Loader used when a name cannot be resolved.
const FALLBACK_LOADER: &str = "UnstructuredFileLoader";

/// Creates loaders from registered names.
///
/// Two families are kept: specialized loaders (OCR-backed and filtered CSV)
/// and the standard set. Names unknown to both fall back to
/// [`UnstructuredFileLoader`]. Per-loader default options are filled in
/// where the caller left them unset.
pub struct LoaderResolver {
    settings: Arc<Settings>,
    specialized: HashMap<&'static str, LoaderFactory>,
    standard: HashMap<&'static str, LoaderFactory>,
}

impl LoaderResolver {
    pub fn new(settings: Arc<Settings>) -> Self {
        let mut specialized: HashMap<&'static str, LoaderFactory> = HashMap::new();
        specialized.insert("RapidOCRPDFLoader", factory!(RapidOCRPDFLoader));
        specialized.insert("RapidOCRLoader", factory!(RapidOCRLoader));
        specialized.insert("RapidOCRDocLoader", factory!(RapidOCRDocLoader));
        specialized.insert("RapidOCRPPTLoader", factory!(RapidOCRPPTLoader));
        specialized.insert("FilteredCSVLoader", factory!(FilteredCSVLoader));

        let mut standard: HashMap<&'static str, LoaderFactory> = HashMap::new();
        standard.insert("UnstructuredFileLoader", factory!(UnstructuredFileLoader));
        standard.insert("UnstructuredMarkdownLoader", factory!(UnstructuredMarkdownLoader));
        standard.insert("UnstructuredHTMLLoader", factory!(UnstructuredHTMLLoader));
        standard.insert("UnstructuredXMLLoader", factory!(UnstructuredXMLLoader));
        standard.insert("UnstructuredEPubLoader", factory!(UnstructuredEPubLoader));
        standard.insert("UnstructuredEmailLoader", factory!(UnstructuredEmailLoader));
        standard.insert("UnstructuredExcelLoader", factory!(UnstructuredExcelLoader));
        standard.insert("UnstructuredWordDocumentLoader", factory!(UnstructuredWordDocumentLoader));
        standard.insert("UnstructuredPowerPointLoader", factory!(UnstructuredPowerPointLoader));
        standard.insert("JSONLoader", factory!(JSONLoader));
        standard.insert("JSONLinesLoader", factory!(JSONLinesLoader));
        standard.insert("CSVLoader", factory!(CSVLoader));
        standard.insert("NotebookLoader", factory!(NotebookLoader));

        Self {
            settings,
            specialized,
            standard,
        }
    }

    /// Whether a loader with this name is registered.
    pub fn is_known(&self, name: &str) -> bool {
        self.specialized.contains_key(name) || self.standard.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Option<(&'static str, LoaderFactory)> {
        self.specialized
            .get_key_value(name)
            .or_else(|| self.standard.get_key_value(name))
            .map(|(name, factory)| (*name, *factory))
    }

    /// Construct a loader bound to `file_path`.
    ///
    /// Lookup failures are logged and answered with the fallback loader.
    /// Errors from filling in defaults or from the loader's own construction
    /// propagate.
    pub fn create_loader(
        &self,
        loader_name: Option<&str>,
        file_path: &Path,
        options: &LoaderOptions,
    ) -> Result<Box<dyn Loader>> {
        let (name, factory) = match loader_name.and_then(|name| self.lookup(name)) {
            Some(found) => found,
            None => {
                let requested = loader_name.unwrap_or("<none>");
                if self.settings.log_verbose {
                    error!(
                        loader = requested,
                        path = %file_path.display(),
                        specialized = ?self.specialized.keys().collect::<Vec<_>>(),
                        standard = ?self.standard.keys().collect::<Vec<_>>(),
                        "No such document loader, using {}", FALLBACK_LOADER
                    );
                } else {
                    error!(loader = requested, path = %file_path.display(), "No such document loader, using {}", FALLBACK_LOADER);
                }
                (FALLBACK_LOADER, factory!(UnstructuredFileLoader) as LoaderFactory)
            }
        };

        let options = self.with_defaults(name, file_path, options)?;
        debug!(loader = name, path = %file_path.display(), ?options, "Creating loader");
        factory(file_path, &options)
    }

    /// Fill per-loader defaults into the options the caller left unset.
    fn with_defaults(&self, name: &str, file_path: &Path, options: &LoaderOptions) -> Result<LoaderOptions> {
        let mut options = options.clone();

        if options.ocr_language.is_none() {
            options.ocr_language = Some(self.settings.ocr_language.clone());
        }

        match name {
            "UnstructuredFileLoader" => {
                options.autodetect_encoding.get_or_insert(true);
            }
            "CSVLoader" => {
                if options.encoding.as_deref().map_or(true, str::is_empty) {
                    let bytes = std::fs::read(file_path)?;
                    let encoding = detect_encoding(&bytes)
                        .map(|e| e.name().to_lowercase())
                        .unwrap_or_else(|| "utf-8".to_string());
                    debug!(path = %file_path.display(), %encoding, "Sniffed CSV encoding");
                    options.encoding = Some(encoding);
                }
            }
            "JSONLoader" | "JSONLinesLoader" => {
                options.jq_schema.get_or_insert_with(|| ".".to_string());
                options.text_content.get_or_insert(false);
            }
            _ => {}
        }

        Ok(options)
    }
}

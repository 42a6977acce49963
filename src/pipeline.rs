//! Process-wide ingestion context.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::knowledge_file::KnowledgeFile;
use crate::loaders::LoaderResolver;
use crate::paths;
use crate::registry::ExtensionRegistry;
use crate::splitters::SplitterFactory;
use crate::types::Settings;

/// Settings plus the registries built from them.
///
/// Built once and shared read-only through an `Arc` by every
/// [`KnowledgeFile`] and batch worker.
pub struct Pipeline {
    settings: Arc<Settings>,
    registry: ExtensionRegistry,
    loaders: LoaderResolver,
    splitters: SplitterFactory,
}

impl Pipeline {
    /// Build a pipeline from validated settings.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let settings = Arc::new(settings);

        info!(
            kb_root = %settings.kb_root_path.display(),
            splitter = %settings.text_splitter_name,
            chunk_size = settings.chunk_size,
            chunk_overlap = settings.chunk_overlap,
            "Pipeline initialized"
        );

        Ok(Self {
            registry: ExtensionRegistry::new(&settings.loaders),
            loaders: LoaderResolver::new(Arc::clone(&settings)),
            splitters: SplitterFactory::new(Arc::clone(&settings)),
            settings,
        })
    }

    /// Build a pipeline from the configuration file and environment.
    pub fn from_env() -> Result<Self> {
        Self::new(Settings::load()?)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn loaders(&self) -> &LoaderResolver {
        &self.loaders
    }

    pub fn splitters(&self) -> &SplitterFactory {
        &self.splitters
    }

    pub fn kb_root(&self) -> &Path {
        &self.settings.kb_root_path
    }

    /// Loadable files of a knowledge base.
    pub fn list_files(&self, knowledge_base_name: &str) -> Result<Vec<String>> {
        paths::list_kb_files(self.kb_root(), knowledge_base_name, &self.registry)
    }

    /// Open a knowledge file of this pipeline.
    pub fn knowledge_file(self: &Arc<Self>, filename: &str, knowledge_base_name: &str) -> Result<KnowledgeFile> {
        KnowledgeFile::new(filename, knowledge_base_name, Arc::clone(self))
    }
}

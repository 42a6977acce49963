//! Extension to loader-name lookup.

use crate::types::LoaderSpec;

/// Maps file extensions to loader names.
///
/// The mapping is not injective (`.docx` is listed by two loaders, for
/// instance); lookups return the first loader in registration order.
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    specs: Vec<LoaderSpec>,
}

impl ExtensionRegistry {
    /// Build a registry from a loader table, lowercasing the extensions.
    pub fn new(specs: &[LoaderSpec]) -> Self {
        let specs = specs
            .iter()
            .map(|spec| LoaderSpec {
                name: spec.name.clone(),
                extensions: spec.extensions.iter().map(|e| e.to_lowercase()).collect(),
            })
            .collect();
        Self { specs }
    }

    /// Get the loader name registered for an extension (leading dot included).
    pub fn resolve_loader_name(&self, extension: &str) -> Option<&str> {
        let extension = extension.to_lowercase();
        self.specs
            .iter()
            .find(|spec| spec.extensions.iter().any(|e| *e == extension))
            .map(|spec| spec.name.as_str())
    }

    /// Check if an extension is loadable.
    pub fn is_supported(&self, extension: &str) -> bool {
        self.resolve_loader_name(extension).is_some()
    }

    /// All supported extensions, deduplicated, in registration order.
    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for ext in self.specs.iter().flat_map(|spec| spec.extensions.iter()) {
            if !seen.contains(&ext.as_str()) {
                seen.push(ext.as_str());
            }
        }
        seen
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new(&LoaderSpec::defaults())
    }
}

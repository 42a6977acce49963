//! Knowledge-base directory layout.
//!
//! Every knowledge base lives under the configured root as
//! `<root>/<kb>/content/<filename>`, where `filename` is a forward-slash path
//! relative to the content directory.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::Result;
use crate::registry::ExtensionRegistry;

/// Directory of one knowledge base.
pub fn kb_path(root: &Path, kb: &str) -> PathBuf {
    root.join(kb)
}

/// Content directory of one knowledge base.
pub fn doc_path(root: &Path, kb: &str) -> PathBuf {
    kb_path(root, kb).join("content")
}

/// Location of a knowledge file on disk.
pub fn file_path(root: &Path, kb: &str, filename: &str) -> PathBuf {
    doc_path(root, kb).join(filename)
}

/// Render a path with forward slashes.
pub fn to_posix(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Normalize a knowledge file name: forward slashes, no leading `./`.
pub fn normalize_filename(filename: &str) -> String {
    let mut name = filename.replace('\\', "/");
    while let Some(rest) = name.strip_prefix("./") {
        name = rest.to_string();
    }
    name
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with("~$") || name.ends_with(".tmp")
}

/// List the loadable files of a knowledge base, as sorted names relative to
/// its content directory.
///
/// Hidden entries, office lock files (`~$...`), `.tmp` files and files with
/// unsupported extensions are skipped.
pub fn list_kb_files(root: &Path, kb: &str, registry: &ExtensionRegistry) -> Result<Vec<String>> {
    let content = doc_path(root, kb);
    let mut files = Vec::new();

    let walker = WalkDir::new(&content)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let extension = entry
            .path()
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        if !registry.is_supported(&extension) {
            tracing::debug!(path = %entry.path().display(), "Skipping unsupported file");
            continue;
        }

        if let Ok(relative) = entry.path().strip_prefix(&content) {
            files.push(to_posix(relative));
        }
    }

    files.sort();
    Ok(files)
}

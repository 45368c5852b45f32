//! Local document ingestion.
//!
//! Loads configured text files (or scans directories for them) into
//! local-source references that are seeded into every section's initial
//! evidence before the first search. Ingested documents participate in
//! deduplication and citations exactly like search hits, distinguished
//! only by the local url sentinel.

use crate::report::reference::Reference;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Loads local evidence documents from configured paths.
pub struct DocumentLoader {
    paths: Vec<PathBuf>,
}

impl DocumentLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Load every configured file (and every supported file in configured
    /// directories) as a local reference. Unreadable or empty files are
    /// skipped with a warning rather than failing the run.
    pub async fn load(&self) -> Vec<Reference> {
        let mut documents = Vec::new();

        for path in &self.paths {
            if path.is_file() {
                if let Some(reference) = Self::read_document(path).await {
                    documents.push(reference);
                }
            } else if path.is_dir() {
                match fs::read_dir(path).await {
                    Ok(mut entries) => {
                        while let Ok(Some(entry)) = entries.next_entry().await {
                            let entry_path = entry.path();
                            if entry_path.is_file() {
                                if let Some(reference) = Self::read_document(&entry_path).await {
                                    documents.push(reference);
                                }
                            }
                        }
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to scan directory"),
                }
            } else {
                warn!(path = %path.display(), "Configured local path does not exist");
            }
        }

        if !documents.is_empty() {
            info!(count = documents.len(), "Loaded local evidence documents");
        }
        documents
    }

    async fn read_document(path: &Path) -> Option<Reference> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return None;
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match fs::read_to_string(path).await {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    warn!(file = %filename, "Local document is empty; skipping");
                    None
                } else {
                    Some(Reference::local(
                        filename.clone(),
                        format!("[Source file: {filename}]\n{trimmed}"),
                    ))
                }
            }
            Err(e) => {
                warn!(file = %filename, error = %e, "Failed to read local document");
                None
            }
        }
    }
}

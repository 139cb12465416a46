use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File extensions tried, in order, for a category's reference document.
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt"];

/// Source of reference case documents, keyed by hazard category.
pub trait DocumentStore {
    /// Reference text for `category`, or `None` when there is none.
    fn lookup(&self, category: &str) -> std::io::Result<Option<String>>;
}

/// One text file per category: `<dir>/<category>.md` or `<dir>/<category>.txt`.
pub struct DirectoryDocumentStore {
    dir: PathBuf,
}

impl DirectoryDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_safe_file_stem(category: &str) -> bool {
    !category.is_empty()
        && !category.contains(['/', '\\', '\0'])
        && !category.contains("..")
}

impl DocumentStore for DirectoryDocumentStore {
    fn lookup(&self, category: &str) -> std::io::Result<Option<String>> {
        let category = category.trim();
        if !is_safe_file_stem(category) {
            tracing::warn!(category = %category, "Refusing document lookup for unsafe category name");
            return Ok(None);
        }

        for ext in DOCUMENT_EXTENSIONS {
            let path = self.dir.join(format!("{category}.{ext}"));
            match std::fs::read_to_string(&path) {
                Ok(text) if text.trim().is_empty() => return Ok(None),
                Ok(text) => return Ok(Some(text.trim().to_string())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// In-memory document store for testing.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: HashMap<String, String>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: &str, text: &str) -> Self {
        self.documents.insert(category.to_string(), text.to_string());
        self
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn lookup(&self, category: &str) -> std::io::Result<Option<String>> {
        Ok(self.documents.get(category.trim()).cloned())
    }
}

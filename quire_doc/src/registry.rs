//! Owner of the open documents.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_config::{Config, FileSettings};
use quire_fs::{Encoding, FileInfo, JsonMetadataStore, MemoryMetadata, MetadataError, MetadataStore, UsageError};

use crate::context::DocumentContext;
use crate::document::{Document, DocumentEvent, DocumentId};

#[derive(Debug)]
pub struct DocumentRegistry {
    context: Arc<DocumentContext>,
    documents: BTreeMap<DocumentId, Document>,
    next_id: NonZeroUsize,
}

impl DocumentRegistry {
    pub fn new(settings: FileSettings, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            context: Arc::new(DocumentContext::new(settings, metadata)),
            documents: BTreeMap::new(),
            next_id: NonZeroUsize::MIN,
        }
    }

    /// Registry using the `[files]` settings and, when enabled, the metadata
    /// file named by `[metadata]`.
    pub fn from_config(config: &Config) -> Result<Self, MetadataError> {
        let metadata: Arc<dyn MetadataStore> = match config.metadata.resolved_path() {
            Some(path) if config.metadata.enabled => {
                Arc::new(JsonMetadataStore::open(path, config.metadata.max_entries)?)
            }
            _ => Arc::new(MemoryMetadata::new()),
        };
        Ok(Self::new(config.files.clone(), metadata))
    }

    pub fn context(&self) -> &Arc<DocumentContext> {
        &self.context
    }

    /// Create an empty untitled document.
    pub fn new_document(&mut self) -> DocumentId {
        let id = DocumentId::new(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.documents
            .insert(id, Document::new(id, self.context.clone()));
        id
    }

    /// Create a document and start loading `path` into it.
    pub fn open(
        &mut self,
        path: impl Into<PathBuf>,
        encoding: Option<Encoding>,
        line: usize,
        create: bool,
    ) -> Result<DocumentId, UsageError> {
        let id = self.new_document();
        let result = self
            .documents
            .get_mut(&id)
            .map_or(Ok(()), |doc| doc.load(path, encoding, line, create));
        if let Err(err) = result {
            self.documents.remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn get_mut(&mut self, id: DocumentId) -> Option<&mut Document> {
        self.documents.get_mut(&id)
    }

    /// Document bound to `path`, if one is open.
    /// The document bound to `path`, or to another name of the same file
    /// (a hard or symbolic link).
    pub fn find_by_path(&self, path: &Path) -> Option<DocumentId> {
        if let Some(doc) = self.documents.values().find(|doc| doc.path() == Some(path)) {
            return Some(doc.id());
        }
        let wanted = FileInfo::from_path(path).ok()?;
        self.documents
            .values()
            .find(|doc| {
                doc.path()
                    .and_then(|bound| FileInfo::from_path(bound).ok())
                    .is_some_and(|info| info.is_same_file(&wanted))
            })
            .map(Document::id)
    }

    /// Close a document. Returns `false` if `id` is unknown.
    pub fn close(&mut self, id: DocumentId) -> bool {
        match self.documents.remove(&id) {
            Some(doc) => {
                doc.close();
                true
            }
            None => false,
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Run one phase for every busy document.
    pub fn poll(&mut self) -> Vec<(DocumentId, DocumentEvent)> {
        let mut events = Vec::new();
        for (id, doc) in &mut self.documents {
            events.extend(doc.poll().into_iter().map(|event| (*id, event)));
        }
        events
    }

    /// Poll until no document has an operation running.
    pub fn run_io(&mut self) -> Vec<(DocumentId, DocumentEvent)> {
        let mut events = self.poll();
        while self.documents.values().any(Document::is_busy) {
            events.extend(self.poll());
        }
        events
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new(FileSettings::default(), Arc::new(MemoryMetadata::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ids_are_unique() {
        let mut registry = DocumentRegistry::default();
        let first = registry.new_document();
        let second = registry.new_document();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.close(first));
        assert!(!registry.close(first));
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
    }

    #[test]
    fn test_open_many_in_parallel() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "alpha\n").unwrap();
        fs::write(&b, "beta\n").unwrap();

        let mut registry = DocumentRegistry::default();
        let first = registry.open(&a, None, 0, false).unwrap();
        let second = registry.open(&b, None, 0, false).unwrap();

        let events = registry.run_io();
        let loaded: Vec<DocumentId> = events
            .iter()
            .filter(|(_, event)| matches!(event, DocumentEvent::Loaded(Ok(()))))
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(loaded, vec![first, second]);

        assert_eq!(registry.find_by_path(&b), Some(second));
        assert_eq!(registry.get(first).unwrap().buffer().text(), "alpha\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_find_by_path_follows_links() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("real.txt");
        let symlink = dir.path().join("sym.txt");
        let hard = dir.path().join("hard.txt");
        fs::write(&file, "x\n").unwrap();
        std::os::unix::fs::symlink(&file, &symlink).unwrap();
        fs::hard_link(&file, &hard).unwrap();

        let mut registry = DocumentRegistry::default();
        let id = registry.open(&file, None, 0, false).unwrap();
        registry.run_io();

        assert_eq!(registry.find_by_path(&file), Some(id));
        assert_eq!(registry.find_by_path(&symlink), Some(id));
        assert_eq!(registry.find_by_path(&hard), Some(id));
        assert_eq!(registry.find_by_path(&dir.path().join("missing.txt")), None);
    }

    #[test]
    fn test_from_config_with_disabled_metadata() {
        let mut config = Config::default();
        config.metadata.enabled = false;
        let registry = DocumentRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.context().settings(), &config.files);
    }

    #[test]
    fn test_from_config_with_metadata_file() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("meta").join("metadata.json");
        let file = dir.path().join("doc.txt");
        fs::write(&file, "x\n").unwrap();

        let mut config = Config::default();
        config.metadata.path = Some(store.clone());
        let mut registry = DocumentRegistry::from_config(&config).unwrap();
        let id = registry.open(&file, Some(Encoding::Utf8), 0, false).unwrap();
        registry.run_io();
        registry.close(id);
        drop(registry);

        let reopened = JsonMetadataStore::open(&store, 10).unwrap();
        assert_eq!(reopened.get(&file, quire_fs::KEY_ENCODING).as_deref(), Some("UTF-8"));
        assert_eq!(reopened.get(&file, quire_fs::KEY_POSITION).as_deref(), Some("0"));
    }
}

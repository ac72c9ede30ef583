//! Storage collaborator trait and the in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use contentengine_core::{EngineError, FileId, Result, FOLDER_MIME_TYPE};
use tokio::sync::RwLock;

use crate::query::{Clause, FileEntry, FileQuery};

/// Operations the pipeline needs from a hierarchical file store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Files matching `query`, in the store's listing order.
    async fn find(&self, query: &FileQuery) -> Result<Vec<FileEntry>>;

    /// Raw content of a file.
    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>>;

    /// Create a folder with a single parent.
    async fn create_folder(&self, name: &str, parent: &FileId) -> Result<FileId>;

    /// Upload a new file under `parent`.
    async fn upload(
        &self,
        name: &str,
        parent: &FileId,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<FileId>;

    /// Current parents of a file.
    async fn parents(&self, file_id: &FileId) -> Result<Vec<FileId>>;

    /// Remove `remove` from the file's parents and add `add`.
    async fn reparent(&self, file_id: &FileId, remove: &[FileId], add: &FileId) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredFile {
    entry: FileEntry,
    content: Vec<u8>,
    trashed: bool,
}

#[derive(Debug, Default)]
struct Faults {
    upload_names: HashSet<String>,
    download_ids: HashSet<FileId>,
    reparent_ids: HashSet<FileId>,
    list_parents: HashSet<FileId>,
    create_folder: bool,
}

#[derive(Debug, Default)]
struct Inner {
    files: Vec<StoredFile>,
    next_id: u64,
    write_calls: u64,
    faults: Faults,
}

impl Inner {
    fn allocate_id(&mut self) -> FileId {
        self.next_id += 1;
        FileId::new(format!("mem-{}", self.next_id))
    }

    fn insert(&mut self, name: &str, parent: Option<&FileId>, mime_type: &str, content: Vec<u8>) -> FileId {
        let id = self.allocate_id();
        self.files.push(StoredFile {
            entry: FileEntry {
                id: id.clone(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                parents: parent.into_iter().cloned().collect(),
            },
            content,
            trashed: false,
        });
        id
    }

    fn get(&self, file_id: &FileId) -> Result<&StoredFile> {
        self.files
            .iter()
            .find(|f| f.entry.id == *file_id)
            .ok_or_else(|| EngineError::Storage(format!("File not found: {}", file_id)))
    }

    fn get_mut(&mut self, file_id: &FileId) -> Result<&mut StoredFile> {
        self.files
            .iter_mut()
            .find(|f| f.entry.id == *file_id)
            .ok_or_else(|| EngineError::Storage(format!("File not found: {}", file_id)))
    }
}

/// In-memory implementation of FileStore.
///
/// Listing order is insertion order. Faults can be armed per operation to
/// exercise failure handling.
#[derive(Clone, Default)]
pub struct InMemoryFileStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder without counting it as a pipeline write.
    pub async fn seed_folder(&self, name: &str, parent: Option<&FileId>) -> FileId {
        let mut inner = self.inner.write().await;
        inner.insert(name, parent, FOLDER_MIME_TYPE, Vec::new())
    }

    /// Add a file without counting it as a pipeline write.
    pub async fn seed_file(
        &self,
        name: &str,
        parent: &FileId,
        mime_type: &str,
        content: impl Into<Vec<u8>>,
    ) -> FileId {
        let mut inner = self.inner.write().await;
        inner.insert(name, Some(parent), mime_type, content.into())
    }

    /// Move a file to the trash.
    pub async fn trash(&self, file_id: &FileId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.get_mut(file_id)?.trashed = true;
        Ok(())
    }

    /// Non-trashed entries directly inside `folder`.
    pub async fn children(&self, folder: &FileId) -> Vec<FileEntry> {
        let inner = self.inner.read().await;
        inner
            .files
            .iter()
            .filter(|f| !f.trashed && f.entry.parents.contains(folder))
            .map(|f| f.entry.clone())
            .collect()
    }

    /// Content of the named child of `folder`, if present.
    pub async fn child_content(&self, folder: &FileId, name: &str) -> Option<Vec<u8>> {
        let inner = self.inner.read().await;
        inner
            .files
            .iter()
            .find(|f| !f.trashed && f.entry.name == name && f.entry.parents.contains(folder))
            .map(|f| f.content.clone())
    }

    /// Number of mutating calls (folder creation, upload, reparent) made so far.
    pub async fn write_calls(&self) -> u64 {
        self.inner.read().await.write_calls
    }

    /// Make every upload named `name` fail.
    pub async fn fail_uploads_named(&self, name: &str) {
        self.inner.write().await.faults.upload_names.insert(name.to_string());
    }

    /// Clear upload faults.
    pub async fn clear_upload_faults(&self) {
        self.inner.write().await.faults.upload_names.clear();
    }

    /// Make downloads of `file_id` fail.
    pub async fn fail_downloads_of(&self, file_id: &FileId) {
        self.inner.write().await.faults.download_ids.insert(file_id.clone());
    }

    /// Make reparenting `file_id` fail.
    pub async fn fail_reparent_of(&self, file_id: &FileId) {
        self.inner.write().await.faults.reparent_ids.insert(file_id.clone());
    }

    /// Clear reparent faults.
    pub async fn clear_reparent_faults(&self) {
        self.inner.write().await.faults.reparent_ids.clear();
    }

    /// Make queries scoped to `folder` fail.
    pub async fn fail_listing_of(&self, folder: &FileId) {
        self.inner.write().await.faults.list_parents.insert(folder.clone());
    }

    /// Make folder creation fail.
    pub async fn fail_create_folder(&self, fail: bool) {
        self.inner.write().await.faults.create_folder = fail;
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn find(&self, query: &FileQuery) -> Result<Vec<FileEntry>> {
        let inner = self.inner.read().await;
        let refused = query.clauses().iter().any(|clause| {
            matches!(clause, Clause::InParent(parent) if inner.faults.list_parents.contains(parent))
        });
        if refused {
            return Err(EngineError::Storage("Listing refused".to_string()));
        }
        Ok(inner
            .files
            .iter()
            .filter(|f| query.matches(&f.entry, f.trashed))
            .map(|f| f.entry.clone())
            .collect())
    }

    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>> {
        let inner = self.inner.read().await;
        if inner.faults.download_ids.contains(file_id) {
            return Err(EngineError::Storage(format!("Download of {} refused", file_id)));
        }
        Ok(inner.get(file_id)?.content.clone())
    }

    async fn create_folder(&self, name: &str, parent: &FileId) -> Result<FileId> {
        let mut inner = self.inner.write().await;
        inner.write_calls += 1;
        if inner.faults.create_folder {
            return Err(EngineError::Storage(format!("Cannot create folder {}", name)));
        }
        inner.get(parent)?;
        Ok(inner.insert(name, Some(parent), FOLDER_MIME_TYPE, Vec::new()))
    }

    async fn upload(
        &self,
        name: &str,
        parent: &FileId,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<FileId> {
        let mut inner = self.inner.write().await;
        inner.write_calls += 1;
        if inner.faults.upload_names.contains(name) {
            return Err(EngineError::Storage(format!("Upload of {} refused", name)));
        }
        inner.get(parent)?;
        Ok(inner.insert(name, Some(parent), mime_type, content))
    }

    async fn parents(&self, file_id: &FileId) -> Result<Vec<FileId>> {
        let inner = self.inner.read().await;
        Ok(inner.get(file_id)?.entry.parents.clone())
    }

    async fn reparent(&self, file_id: &FileId, remove: &[FileId], add: &FileId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.write_calls += 1;
        if inner.faults.reparent_ids.contains(file_id) {
            return Err(EngineError::Storage(format!("Reparent of {} refused", file_id)));
        }
        inner.get(add)?;

        let file = inner.get_mut(file_id)?;
        file.entry.parents.retain(|p| !remove.contains(p));
        if !file.entry.parents.contains(add) {
            file.entry.parents.push(add.clone());
        }
        Ok(())
    }
}

//! Folder-state machine.
//!
//! The three folder-states (`new`, `used`, `output`) are plain storage
//! folders. An image's state is the folder it lives in; advancing it is a
//! reparent that drops every previous parent.

use std::sync::Arc;

use contentengine_core::{is_image_mime, EngineError, FileId, FolderState, ImageRef, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::query::{FileEntry, FileQuery};
use crate::store::FileStore;

/// Names of the folder-states, optionally scoped to a parent folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNames {
    pub new: String,
    pub used: String,
    pub output: String,

    /// Restrict resolution to direct children of this folder.
    #[serde(default)]
    pub root: Option<FileId>,
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            new: FolderState::New.default_name().to_string(),
            used: FolderState::Used.default_name().to_string(),
            output: FolderState::Output.default_name().to_string(),
            root: None,
        }
    }
}

impl FolderNames {
    pub fn name(&self, state: FolderState) -> &str {
        match state {
            FolderState::New => &self.new,
            FolderState::Used => &self.used,
            FolderState::Output => &self.output,
        }
    }
}

/// Folder ids for one run, resolved once at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolders {
    pub new: FileId,
    pub used: FileId,
    pub output: FileId,
}

impl ResolvedFolders {
    pub fn get(&self, state: FolderState) -> &FileId {
        match state {
            FolderState::New => &self.new,
            FolderState::Used => &self.used,
            FolderState::Output => &self.output,
        }
    }
}

/// A child folder returned by [`FolderStateMachine::ensure_child`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFolder {
    pub id: FileId,
    pub name: String,
    /// False when an existing folder was found instead.
    pub created: bool,
}

/// Folder-state operations over a [`FileStore`].
#[derive(Clone)]
pub struct FolderStateMachine {
    store: Arc<dyn FileStore>,
    names: FolderNames,
}

impl FolderStateMachine {
    pub fn new(store: Arc<dyn FileStore>, names: FolderNames) -> Self {
        Self { store, names }
    }

    pub fn names(&self) -> &FolderNames {
        &self.names
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Look up the folder for `state`.
    pub async fn resolve(&self, state: FolderState) -> Result<Option<FileId>> {
        let name = self.names.name(state);
        let mut query = FileQuery::folder_named(name);
        if let Some(root) = &self.names.root {
            query = query.in_parent(root);
        }

        let matches = self.store.find(&query).await?;
        if matches.len() > 1 {
            warn!(
                "{} folders named '{}' found; using {}",
                matches.len(),
                name,
                matches[0].id
            );
        }
        Ok(matches.into_iter().next().map(|entry| entry.id))
    }

    /// Resolve every folder-state, failing with the full list of missing names.
    pub async fn resolve_all(&self) -> Result<ResolvedFolders> {
        let mut resolved = Vec::with_capacity(FolderState::ALL.len());
        let mut missing = Vec::new();

        for state in FolderState::ALL {
            match self.resolve(state).await? {
                Some(id) => resolved.push(id),
                None => missing.push(self.names.name(state).to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(EngineError::Configuration { missing });
        }

        let mut ids = resolved.into_iter();
        match (ids.next(), ids.next(), ids.next()) {
            (Some(new), Some(used), Some(output)) => {
                debug!("Resolved folders new={} used={} output={}", new, used, output);
                Ok(ResolvedFolders { new, used, output })
            }
            _ => Err(EngineError::Internal("folder resolution incomplete".to_string())),
        }
    }

    /// Images directly inside `folder`, in storage listing order.
    pub async fn list_images(&self, folder: &FileId) -> Result<Vec<ImageRef>> {
        let entries = self.store.find(&FileQuery::images_in(folder)).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| is_image_mime(&entry.mime_type))
            .map(|entry| ImageRef::new(entry.id, entry.name, entry.mime_type))
            .collect())
    }

    /// Everything directly inside `folder`.
    pub async fn list_children(&self, folder: &FileId) -> Result<Vec<FileEntry>> {
        self.store.find(&FileQuery::children_of(folder)).await
    }

    /// Find the child folder `name` of `parent`, creating it if absent.
    pub async fn ensure_child(&self, parent: &FileId, name: &str) -> Result<ChildFolder> {
        let query = FileQuery::folder_named(name).in_parent(parent);
        if let Some(existing) = self.store.find(&query).await?.into_iter().next() {
            return Ok(ChildFolder {
                id: existing.id,
                name: name.to_string(),
                created: false,
            });
        }

        let id = self.store.create_folder(name, parent).await?;
        debug!("Created folder '{}' ({}) under {}", name, id, parent);
        Ok(ChildFolder {
            id,
            name: name.to_string(),
            created: true,
        })
    }

    /// Move `image` from `from` to `to`, removing all of its current parents.
    pub async fn transition(
        &self,
        image: &ImageRef,
        folders: &ResolvedFolders,
        from: FolderState,
        to: FolderState,
    ) -> Result<()> {
        let from_id = folders.get(from);
        let to_id = folders.get(to);
        let transition_error = |message: String| EngineError::Transition {
            image: image.name.clone(),
            message,
        };

        let parents = self
            .store
            .parents(&image.id)
            .await
            .map_err(|e| transition_error(e.to_string()))?;
        if !parents.contains(from_id) {
            return Err(transition_error(format!(
                "image is no longer in '{}'",
                self.names.name(from)
            )));
        }

        self.store
            .reparent(&image.id, &parents, to_id)
            .await
            .map_err(|e| transition_error(e.to_string()))?;

        info!("Moved {} from '{}' to '{}'", image.name, self.names.name(from), self.names.name(to));
        Ok(())
    }
}

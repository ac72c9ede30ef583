//! Artifact persistence and output-group management.

use std::collections::BTreeSet;

use contentengine_core::{
    artifact_name, parse_artifact_name, EngineError, FileId, ImageRef, Listing, OutputManifest,
    Result, ARTIFACT_MIME_TYPE, MANIFEST_FILE_NAME,
};
use contentengine_drive::{FileEntry, FolderStateMachine};
use tracing::{debug, info};

/// The output folder for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputGroup {
    pub id: FileId,
    pub name: String,

    /// True if this run created the folder.
    pub created: bool,

    /// Variant indices already stored by an earlier run.
    pub existing: BTreeSet<u32>,
}

impl OutputGroup {
    /// Whether every variant `1..=variants` is already stored.
    pub fn is_complete(&self, variants: u32) -> bool {
        (1..=variants).all(|v| self.existing.contains(&v))
    }
}

/// Writes listings and manifests into output groups.
#[derive(Clone)]
pub struct ArtifactStore {
    folders: FolderStateMachine,
}

impl ArtifactStore {
    pub fn new(folders: FolderStateMachine) -> Self {
        Self { folders }
    }

    /// Create or reopen the output group for `image`.
    ///
    /// A fresh group gets a manifest. An existing group is reused only if
    /// its manifest names the same image by storage id; otherwise the
    /// name collision is reported and nothing is written.
    pub async fn open_group(
        &self,
        output: &FileId,
        image: &ImageRef,
        content: &[u8],
        variants: u32,
    ) -> Result<OutputGroup> {
        let name = image.output_group_name().to_string();
        let child = self.folders.ensure_child(output, &name).await?;

        if child.created {
            self.write_manifest(&child.id, image, content).await?;
            info!("Created output group '{}'", name);
            return Ok(OutputGroup {
                id: child.id,
                name,
                created: true,
                existing: BTreeSet::new(),
            });
        }

        let children = self.folders.list_children(&child.id).await?;
        let collision = |message: String| EngineError::OutputCollision {
            group: name.clone(),
            message,
        };

        match children.iter().find(|c| c.name == MANIFEST_FILE_NAME) {
            Some(entry) => {
                let bytes = self.folders.store().download(&entry.id).await?;
                let manifest = OutputManifest::from_bytes(&bytes).map_err(|e| collision(e.to_string()))?;
                if !manifest.matches(image) {
                    let detail = if manifest.same_content(content) {
                        ", a copy with identical content"
                    } else {
                        ""
                    };
                    return Err(collision(format!(
                        "group belongs to '{}' ({}){}",
                        manifest.source_name, manifest.source_id, detail
                    )));
                }
            }
            None if children.is_empty() => {
                debug!("Adopting empty output group '{}'", name);
                self.write_manifest(&child.id, image, content).await?;
            }
            None => {
                return Err(collision(
                    "group has content but no manifest".to_string(),
                ));
            }
        }

        let existing = self.verified_artifacts(&children, variants).await.map_err(collision)?;
        if !existing.is_empty() {
            info!(
                "Reusing output group '{}' with {} stored variant(s)",
                name,
                existing.len()
            );
        }

        Ok(OutputGroup {
            id: child.id,
            name,
            created: false,
            existing,
        })
    }

    /// Write `listing` as `pin_<variant>.json` into `group`.
    pub async fn persist(&self, group: &OutputGroup, variant: u32, listing: &Listing) -> Result<FileId> {
        let bytes = listing
            .to_artifact_bytes()
            .map_err(|e| EngineError::persistence(variant, e))?;
        let name = artifact_name(variant);

        let id = self
            .folders
            .store()
            .upload(&name, &group.id, ARTIFACT_MIME_TYPE, bytes)
            .await
            .map_err(|e| EngineError::persistence(variant, e))?;
        debug!("Stored {}/{}", group.name, name);
        Ok(id)
    }

    async fn write_manifest(&self, group: &FileId, image: &ImageRef, content: &[u8]) -> Result<()> {
        let manifest = OutputManifest::for_image(image, content);
        self.folders
            .store()
            .upload(MANIFEST_FILE_NAME, group, ARTIFACT_MIME_TYPE, manifest.to_bytes()?)
            .await?;
        Ok(())
    }

    /// Indices of stored artifacts, each checked to parse as a listing.
    async fn verified_artifacts(
        &self,
        children: &[FileEntry],
        variants: u32,
    ) -> std::result::Result<BTreeSet<u32>, String> {
        let mut existing = BTreeSet::new();

        for entry in children {
            let Some(index) = parse_artifact_name(&entry.name) else {
                continue;
            };
            if index > variants {
                return Err(format!(
                    "group holds {} but only {} variant(s) were requested",
                    entry.name, variants
                ));
            }
            if !existing.insert(index) {
                return Err(format!("group holds {} more than once", entry.name));
            }

            let bytes = self
                .folders
                .store()
                .download(&entry.id)
                .await
                .map_err(|e| e.to_string())?;
            Listing::from_artifact_bytes(&bytes)
                .map_err(|e| format!("{} is not a valid listing: {}", entry.name, e))?;
        }

        Ok(existing)
    }
}

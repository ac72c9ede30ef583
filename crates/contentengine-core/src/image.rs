//! Image descriptors and storage identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// MIME type of a storage folder.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME prefix shared by every image content type.
pub const IMAGE_MIME_PREFIX: &str = "image/";

/// Opaque identifier of a file or folder in the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An image waiting in (or moved out of) the `new` folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Storage identifier.
    pub id: FileId,

    /// Display name, including extension.
    pub name: String,

    /// Content type reported by storage (e.g. `image/jpeg`).
    pub mime_type: String,
}

impl ImageRef {
    pub fn new(id: impl Into<FileId>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Name of the output group that holds this image's listings.
    pub fn output_group_name(&self) -> &str {
        base_name(&self.name)
    }
}

/// Strips the final extension from a file name.
///
/// A leading dot does not start an extension, so `.hidden` stays intact.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if !file_name[..idx].chars().all(|c| c == '.') => &file_name[..idx],
        _ => file_name,
    }
}

/// Returns true if `mime_type` names image content.
pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.starts_with(IMAGE_MIME_PREFIX)
}

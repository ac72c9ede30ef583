//! Structured file queries.
//!
//! Queries are built from typed clauses and rendered to the Drive `q`
//! language only at the HTTP boundary, so names containing quotes or
//! backslashes never change the meaning of a query.

use contentengine_core::{FileId, FOLDER_MIME_TYPE};
use serde::{Deserialize, Serialize};

/// A file or folder as reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: FileId,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<FileId>,
}

impl FileEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Exact name match.
    NameEq(String),
    /// Direct child of the given folder.
    InParent(FileId),
    /// Exact MIME type match.
    MimeEq(String),
    /// MIME type contains the given text (Drive's `contains` operator).
    MimeContains(String),
    /// Not in the trash.
    NotTrashed,
}

/// Conjunction of clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    clauses: Vec<Clause>,
}

impl FileQuery {
    /// Empty query; matches every non-filtered file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folders named `name`.
    pub fn folder_named(name: impl Into<String>) -> Self {
        Self::new()
            .name_eq(name)
            .mime_eq(FOLDER_MIME_TYPE)
            .not_trashed()
    }

    /// Images directly inside `parent`.
    pub fn images_in(parent: &FileId) -> Self {
        Self::new()
            .in_parent(parent)
            .mime_contains(contentengine_core::IMAGE_MIME_PREFIX)
            .not_trashed()
    }

    /// Everything directly inside `parent`.
    pub fn children_of(parent: &FileId) -> Self {
        Self::new().in_parent(parent).not_trashed()
    }

    pub fn name_eq(mut self, name: impl Into<String>) -> Self {
        self.clauses.push(Clause::NameEq(name.into()));
        self
    }

    pub fn in_parent(mut self, parent: &FileId) -> Self {
        self.clauses.push(Clause::InParent(parent.clone()));
        self
    }

    pub fn mime_eq(mut self, mime_type: impl Into<String>) -> Self {
        self.clauses.push(Clause::MimeEq(mime_type.into()));
        self
    }

    pub fn mime_contains(mut self, fragment: impl Into<String>) -> Self {
        self.clauses.push(Clause::MimeContains(fragment.into()));
        self
    }

    pub fn not_trashed(mut self) -> Self {
        if !self.clauses.contains(&Clause::NotTrashed) {
            self.clauses.push(Clause::NotTrashed);
        }
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Render as a Drive v3 `q` parameter.
    pub fn to_drive_query(&self) -> String {
        self.clauses
            .iter()
            .map(|clause| match clause {
                Clause::NameEq(name) => format!("name = '{}'", escape_literal(name)),
                Clause::InParent(parent) => format!("'{}' in parents", escape_literal(parent.as_str())),
                Clause::MimeEq(mime) => format!("mimeType = '{}'", escape_literal(mime)),
                Clause::MimeContains(fragment) => {
                    format!("mimeType contains '{}'", escape_literal(fragment))
                }
                Clause::NotTrashed => "trashed = false".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Evaluate against an entry. `trashed` is tracked by the caller.
    pub fn matches(&self, entry: &FileEntry, trashed: bool) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::NameEq(name) => entry.name == *name,
            Clause::InParent(parent) => entry.parents.contains(parent),
            Clause::MimeEq(mime) => entry.mime_type == *mime,
            Clause::MimeContains(fragment) => entry.mime_type.contains(fragment.as_str()),
            Clause::NotTrashed => !trashed,
        })
    }
}

/// Escape a string literal for the Drive query language.
fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

//! # ContentEngine Drive
//!
//! Folder-state storage: the [`FileStore`] collaborator trait, a Google
//! Drive client, an in-memory store and the [`FolderStateMachine`].

pub mod folders;
pub mod google;
pub mod query;
pub mod store;

pub use folders::{ChildFolder, FolderNames, FolderStateMachine, ResolvedFolders};
pub use google::{DriveConfig, GoogleDriveStore};
pub use query::{Clause, FileEntry, FileQuery};
pub use store::{FileStore, InMemoryFileStore};

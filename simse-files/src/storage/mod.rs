//! The storage capability every entry object talks to.
//!
//! `Storage` is the whole surface the object model needs from a backend:
//! existence checks, whole-file and streamed reads, writes, moves, copies,
//! listings and metadata. Backends follow the same conventions:
//!
//! * `write`, `move_entry`, `copy_entry` and `create_directory` create any
//!   missing parent directories.
//! * `delete` and `delete_directory` are no-ops for missing entries;
//!   `delete_directory` removes the whole subtree.
//! * `mime_type` reports [`mime::DIRECTORY`](crate::mime::DIRECTORY) for
//!   directories.

mod factory;
mod local;
mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};
use crate::location::Location;
use crate::stream::{StreamHandle, StreamMode};

pub use factory::StorageFactory;
pub use local::LocalStorage;
pub use memory::MemoryStorage;

pub type SharedStorage = Arc<dyn Storage>;

/// Lazily produced listing entries.
pub type Listing<'a> = Box<dyn Iterator<Item = Result<StorageAttributes>> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

/// What a listing reports about one direct child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageAttributes {
    pub location: Location,
    pub kind: EntryKind,
    /// Byte length, files only.
    pub size: Option<u64>,
}

impl StorageAttributes {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(FsError::InvalidOperation(format!(
                "Unknown visibility: {}",
                other
            ))),
        }
    }
}

pub trait Storage: Send + Sync {
    fn file_exists(&self, location: &Location) -> Result<bool>;

    fn directory_exists(&self, location: &Location) -> Result<bool>;

    fn exists(&self, location: &Location) -> Result<bool> {
        Ok(self.file_exists(location)? || self.directory_exists(location)?)
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>>;

    /// Open a byte stream. `StreamMode::READ_WRITE` requires the file to exist.
    fn open_stream(&self, location: &Location, mode: StreamMode) -> Result<StreamHandle>;

    fn read_stream(&self, location: &Location) -> Result<StreamHandle> {
        self.open_stream(location, StreamMode::READ_ONLY)
    }

    fn write(&self, location: &Location, content: &[u8]) -> Result<()>;

    fn delete(&self, location: &Location) -> Result<()>;

    fn delete_directory(&self, location: &Location) -> Result<()>;

    fn move_entry(&self, from: &Location, to: &Location) -> Result<()>;

    /// Copy a single file.
    fn copy_entry(&self, from: &Location, to: &Location) -> Result<()>;

    fn create_directory(&self, location: &Location) -> Result<()>;

    /// Direct children of a directory, in backend-defined order.
    fn list_contents(&self, location: &Location) -> Result<Listing<'_>>;

    fn file_size(&self, location: &Location) -> Result<u64>;

    fn last_modified(&self, location: &Location) -> Result<DateTime<Utc>>;

    fn mime_type(&self, location: &Location) -> Result<String>;

    fn visibility(&self, location: &Location) -> Result<Visibility>;

    fn set_visibility(&self, location: &Location, visibility: Visibility) -> Result<()>;
}

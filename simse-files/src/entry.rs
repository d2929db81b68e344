use crate::directory::Directory;
use crate::error::Result;
use crate::file::{File, FileEntry};
use crate::image::Image;
use crate::location::Location;

/// One listed child of a directory.
#[derive(Debug)]
pub enum Entry {
    File(File),
    Image(Image),
    Directory(Directory),
}

impl From<FileEntry> for Entry {
    fn from(entry: FileEntry) -> Self {
        match entry {
            FileEntry::File(file) => Self::File(file),
            FileEntry::Image(image) => Self::Image(image),
        }
    }
}

impl From<Directory> for Entry {
    fn from(directory: Directory) -> Self {
        Self::Directory(directory)
    }
}

impl Entry {
    pub fn location(&self) -> &Location {
        match self {
            Self::File(file) => file.location(),
            Self::Image(image) => image.location(),
            Self::Directory(dir) => dir.location(),
        }
    }

    pub fn basename(&self) -> &str {
        match self {
            Self::File(file) => file.basename(),
            Self::Image(image) => image.file().basename(),
            Self::Directory(dir) => dir.basename(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn into_directory(self) -> Option<Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn matches(&self, pattern: &str) -> bool {
        self.location().matches(pattern)
    }

    /// Byte size; the whole subtree for directories.
    pub fn size(&self) -> Result<u64> {
        match self {
            Self::File(file) => file.size(),
            Self::Image(image) => image.file().size(),
            Self::Directory(dir) => dir.size(),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self {
            Self::File(file) => Ok(serde_json::to_value(file.info()?)?),
            Self::Image(image) => Ok(serde_json::to_value(image.info()?)?),
            Self::Directory(dir) => Ok(serde_json::to_value(dir.info()?)?),
        }
    }
}

pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod file;
pub mod glob;
pub mod image;
pub mod location;
pub mod mime;
pub mod storage;
pub mod stream;
pub mod upload;
pub mod validation;

pub use directory::Directory;
pub use entry::Entry;
pub use error::{FsError, Result};
pub use file::{File, FileEntry, FileInfo};
pub use image::{Image, ImageInfo};
pub use location::Location;
pub use storage::{SharedStorage, Storage, StorageFactory};

use std::path::Path;
use std::sync::Arc;

use super::{LocalStorage, MemoryStorage, SharedStorage};
use crate::error::Result;

/// Builds shared storage handles.
pub struct StorageFactory;

impl StorageFactory {
    /// Local disk storage rooted at `root`, or at the working directory.
    pub fn local(root: Option<&Path>) -> Result<SharedStorage> {
        let storage = match root {
            Some(root) => LocalStorage::new(root)?,
            None => LocalStorage::current_dir()?,
        };
        tracing::debug!("Local storage rooted at {}", storage.root().display());
        Ok(Arc::new(storage))
    }

    pub fn memory() -> SharedStorage {
        Arc::new(MemoryStorage::new())
    }
}

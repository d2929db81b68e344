use serde::Serialize;

use crate::error::{FsError, Result};
use crate::file::{EntryCache, File, FileInfo};
use crate::location::Location;

/// A file whose content decodes as an image.
#[derive(Debug)]
pub struct Image {
    file: File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    #[serde(flatten)]
    pub file: FileInfo,
    pub width: usize,
    pub height: usize,
}

impl Image {
    pub(crate) fn new(file: File) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn into_file(self) -> File {
        self.file
    }

    pub fn location(&self) -> &Location {
        self.file.location()
    }

    /// Width and height in pixels, read from the image header.
    pub fn dimensions(&self) -> Result<(usize, usize)> {
        EntryCache::get_or_try(&self.file.cache.dimensions, || {
            let content = self.file.contents()?;
            let size = imagesize::blob_size(&content).map_err(|e| {
                FsError::InvalidImage(format!("{}: {}", self.file.location(), e))
            })?;
            Ok((size.width, size.height))
        })
    }

    pub fn width(&self) -> Result<usize> {
        Ok(self.dimensions()?.0)
    }

    pub fn height(&self) -> Result<usize> {
        Ok(self.dimensions()?.1)
    }

    pub fn info(&self) -> Result<ImageInfo> {
        let (width, height) = self.dimensions()?;
        Ok(ImageInfo {
            file: self.file.info()?,
            width,
            height,
        })
    }
}

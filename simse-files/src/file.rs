use std::cell::OnceCell;
use std::fmt;
use std::io::SeekFrom;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{FsError, Result};
use crate::image::Image;
use crate::location::Location;
use crate::mime;
use crate::storage::{SharedStorage, Visibility};
use crate::stream::{StreamHandle, StreamMetadata, StreamMode};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

// ── Cache ───────────────────────────────────────────────────────────────────

/// Metadata resolved on first access. Everything here describes the entry at
/// its current location, so it is dropped wholesale when the location or the
/// content changes.
#[derive(Debug, Default, Clone)]
pub struct EntryCache {
    pub(crate) basename: OnceCell<String>,
    pub(crate) parent: OnceCell<Location>,
    pub(crate) size: OnceCell<u64>,
    pub(crate) mime_type: OnceCell<String>,
    pub(crate) extension: OnceCell<String>,
    pub(crate) last_modified: OnceCell<DateTime<Utc>>,
    pub(crate) dimensions: OnceCell<(usize, usize)>,
}

impl EntryCache {
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn get_or_try<T: Clone>(
        cell: &OnceCell<T>,
        resolve: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }
        let value = resolve()?;
        Ok(cell.get_or_init(|| value).clone())
    }
}

enum StreamState {
    Unopened,
    Open(StreamHandle),
    Detached,
}

// ── File ────────────────────────────────────────────────────────────────────

/// A single non-directory entry.
///
/// A `File` owns at most one open stream. The stream is opened lazily on the
/// first stream operation, released by [`close`](File::close) or
/// [`detach`](File::detach), and reset after a move so the next stream
/// operation reopens it at the new location. `File` is deliberately not
/// `Clone`.
pub struct File {
    location: Location,
    storage: SharedStorage,
    pub(crate) cache: EntryCache,
    stream: StreamState,
    chunk_size: usize,
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = match &self.stream {
            StreamState::Unopened => "unopened",
            StreamState::Open(_) => "open",
            StreamState::Detached => "detached",
        };
        f.debug_struct("File")
            .field("location", &self.location)
            .field("stream", &stream)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl File {
    fn new(location: Location, storage: SharedStorage) -> Self {
        Self {
            location,
            storage,
            cache: EntryCache::default(),
            stream: StreamState::Unopened,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Open an existing file. Images come back as [`FileEntry::Image`].
    pub fn open(location: impl Into<Location>, storage: &SharedStorage) -> Result<FileEntry> {
        let location = location.into();
        if !storage.file_exists(&location)? {
            return Err(FsError::NoSuchFile(location.to_string()));
        }

        let mime_type = storage.mime_type(&location)?;
        let file = Self::new(location, SharedStorage::clone(storage));
        let is_image = mime::is_image(&mime_type);
        let _ = file.cache.mime_type.set(mime_type);

        if is_image {
            Ok(FileEntry::Image(Image::new(file)))
        } else {
            Ok(FileEntry::File(file))
        }
    }

    /// Create a file unless one already exists, then open it.
    ///
    /// An existing file is opened as-is and `content` is ignored. Without a
    /// location the file lands in the root under a random name carrying the
    /// extension detected from `content`.
    pub fn create(
        location: Option<Location>,
        content: &[u8],
        storage: &SharedStorage,
    ) -> Result<FileEntry> {
        let location = location.unwrap_or_else(|| {
            let name = format!(
                "{}.{}",
                uuid::Uuid::new_v4().simple(),
                mime::extension_for_content(content)
            );
            Location::root().join(&name)
        });

        if storage.file_exists(&location)? {
            tracing::debug!("File {} already exists, opening it", location);
        } else {
            storage.write(&location, content)?;
            tracing::debug!("Created {} ({} bytes)", location, content.len());
        }
        Self::open(location, storage)
    }

    // -- Accessors --------------------------------------------------------

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Full path of the file.
    pub fn filename(&self) -> &str {
        self.location.as_str()
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn basename(&self) -> &str {
        self.cache
            .basename
            .get_or_init(|| self.location.basename().to_string())
    }

    /// Location of the containing directory.
    pub fn parent(&self) -> &Location {
        self.cache.parent.get_or_init(|| self.location.up())
    }

    pub fn matches(&self, pattern: &str) -> bool {
        self.location.matches(pattern)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn set_chunk_size(&mut self, bytes: usize) {
        self.chunk_size = bytes.max(1);
    }

    // -- Metadata ---------------------------------------------------------

    pub fn size(&self) -> Result<u64> {
        EntryCache::get_or_try(&self.cache.size, || self.storage.file_size(&self.location))
    }

    pub fn mime_type(&self) -> Result<String> {
        EntryCache::get_or_try(&self.cache.mime_type, || {
            self.storage.mime_type(&self.location)
        })
    }

    /// The name's extension, or the one registered for the detected mime
    /// type when the name has none. Empty when neither is known.
    pub fn extension(&self) -> Result<String> {
        EntryCache::get_or_try(&self.cache.extension, || {
            if let Some(ext) = self.location.extension() {
                return Ok(ext.to_string());
            }
            let mime_type = self.mime_type()?;
            Ok(mime::extension_for_mime(&mime_type)
                .unwrap_or_default()
                .to_string())
        })
    }

    pub fn last_modified(&self) -> Result<DateTime<Utc>> {
        EntryCache::get_or_try(&self.cache.last_modified, || {
            self.storage.last_modified(&self.location)
        })
    }

    /// Current visibility; when `set` is given it is applied afterwards.
    pub fn visibility(&self, set: Option<Visibility>) -> Result<Visibility> {
        let current = self.storage.visibility(&self.location)?;
        if let Some(visibility) = set {
            self.storage.set_visibility(&self.location, visibility)?;
        }
        Ok(current)
    }

    pub fn info(&self) -> Result<FileInfo> {
        Ok(FileInfo {
            filename: self.location.clone(),
            basename: self.basename().to_string(),
            extension: self.extension()?,
            mime_type: self.mime_type()?,
            size: self.size()?,
        })
    }

    // -- Content ----------------------------------------------------------

    /// The whole content, read through storage rather than the stream.
    pub fn contents(&self) -> Result<Vec<u8>> {
        self.storage.read(&self.location)
    }

    /// Replace the content. Any open stream is dropped.
    pub fn put_contents(&mut self, content: &[u8]) -> Result<()> {
        self.storage.write(&self.location, content)?;
        self.cache.invalidate();
        self.stream = StreamState::Unopened;
        Ok(())
    }

    // -- Relocation -------------------------------------------------------

    /// Move into `destination` when it is an existing directory, otherwise
    /// move to exactly `destination`.
    pub fn move_to(&mut self, destination: impl Into<Location>) -> Result<&mut Self> {
        let destination = destination.into();
        let target = if self.storage.directory_exists(&destination)? {
            destination.join(self.basename())
        } else {
            destination
        };
        self.relocate(target)
    }

    /// Copy the content to `destination`, or into it when
    /// `destination_is_dir`. An existing target is opened, not overwritten.
    pub fn copy(
        &self,
        destination: impl Into<Location>,
        destination_is_dir: bool,
    ) -> Result<FileEntry> {
        let destination = destination.into();
        let target = if destination_is_dir {
            destination.join(self.basename())
        } else {
            destination
        };
        let content = self.contents()?;
        tracing::debug!("Copying {} to {}", self.location, target);
        Self::create(Some(target), &content, &self.storage)
    }

    /// Rename within the current directory, keeping the current extension
    /// when `name` has none. `None` keeps the current name.
    pub fn rename(&mut self, name: Option<&str>) -> Result<&mut Self> {
        let mut name = match name {
            Some(name) => name.to_string(),
            None => self.basename().to_string(),
        };
        if Location::new(&name).extension().is_none() {
            let ext = self.extension()?;
            if !ext.is_empty() {
                name = format!("{}.{}", name, ext);
            }
        }
        let target = self.parent().join(&name);
        self.relocate(target)
    }

    fn relocate(&mut self, target: Location) -> Result<&mut Self> {
        if target == self.location {
            return Ok(self);
        }
        self.storage.move_entry(&self.location, &target)?;
        tracing::debug!("Moved {} to {}", self.location, target);
        self.location = target;
        self.cache.invalidate();
        self.stream = StreamState::Unopened;
        Ok(self)
    }

    pub fn delete(mut self) -> Result<()> {
        self.stream = StreamState::Detached;
        self.storage.delete(&self.location)?;
        tracing::debug!("Deleted {}", self.location);
        Ok(())
    }

    // -- Stream -----------------------------------------------------------

    fn handle(&mut self) -> Result<&mut StreamHandle> {
        if matches!(self.stream, StreamState::Unopened) {
            let handle = self.storage.read_stream(&self.location)?;
            self.stream = StreamState::Open(handle);
        }
        match &mut self.stream {
            StreamState::Open(handle) => Ok(handle),
            _ => Err(FsError::Detached),
        }
    }

    /// Replace the current stream with one opened in `mode`.
    pub fn open_stream(&mut self, mode: StreamMode) -> Result<()> {
        let handle = self.storage.open_stream(&self.location, mode)?;
        self.stream = StreamState::Open(handle);
        Ok(())
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.stream, StreamState::Detached)
    }

    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        self.handle()?.read(len)
    }

    /// Rest of the stream from the current position.
    pub fn read_remaining(&mut self) -> Result<Vec<u8>> {
        self.handle()?.read_remaining()
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let written = self.handle()?.write(bytes)?;
        self.cache.invalidate();
        Ok(written)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.handle()?.seek(pos)
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.handle()?.rewind()
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.handle()?.tell())
    }

    pub fn eof(&mut self) -> Result<bool> {
        Ok(self.handle()?.eof())
    }

    pub fn is_readable(&mut self) -> bool {
        self.handle().is_ok_and(|h| h.is_readable())
    }

    pub fn is_writable(&mut self) -> bool {
        self.handle().is_ok_and(|h| h.is_writable())
    }

    pub fn is_seekable(&mut self) -> bool {
        self.handle().is_ok_and(|h| h.is_seekable())
    }

    pub fn stream_metadata(&mut self) -> Result<StreamMetadata> {
        Ok(self.handle()?.metadata())
    }

    /// Release the stream; later stream operations fail with `Detached`.
    pub fn close(&mut self) {
        self.stream = StreamState::Detached;
    }

    /// Hand the underlying stream to the caller. `None` when already detached.
    pub fn detach(&mut self) -> Result<Option<StreamHandle>> {
        if self.is_detached() {
            return Ok(None);
        }
        self.handle()?;
        match std::mem::replace(&mut self.stream, StreamState::Detached) {
            StreamState::Open(handle) => Ok(Some(handle)),
            _ => Ok(None),
        }
    }

    /// Iterate the stream in chunks of [`chunk_size`](File::chunk_size).
    pub fn chunks(&mut self) -> Chunks<'_> {
        let size = self.chunk_size;
        self.chunks_of(size)
    }

    pub fn chunks_of(&mut self, size: usize) -> Chunks<'_> {
        Chunks {
            file: self,
            size: size.max(1),
            done: false,
        }
    }
}

/// Byte chunks read from a file's stream.
pub struct Chunks<'a> {
    file: &'a mut File,
    size: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.file.read(self.size) {
            Ok(chunk) if chunk.is_empty() => {
                self.done = true;
                None
            }
            Ok(chunk) => {
                self.done = chunk.len() < self.size;
                Some(Ok(chunk))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: Location,
    pub basename: String,
    pub extension: String,
    pub mime_type: String,
    pub size: u64,
}

// ── FileEntry ───────────────────────────────────────────────────────────────

/// An opened file: plain, or an image with decodable dimensions.
#[derive(Debug)]
pub enum FileEntry {
    File(File),
    Image(Image),
}

impl FileEntry {
    pub fn file(&self) -> &File {
        match self {
            Self::File(file) => file,
            Self::Image(image) => image.file(),
        }
    }

    pub fn file_mut(&mut self) -> &mut File {
        match self {
            Self::File(file) => file,
            Self::Image(image) => image.file_mut(),
        }
    }

    pub fn into_file(self) -> File {
        match self {
            Self::File(file) => file,
            Self::Image(image) => image.into_file(),
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::Image(image) => Some(image),
            Self::File(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    pub fn location(&self) -> &Location {
        self.file().location()
    }

    pub fn basename(&self) -> &str {
        self.file().basename()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        match self {
            Self::File(file) => Ok(serde_json::to_value(file.info()?)?),
            Self::Image(image) => Ok(serde_json::to_value(image.info()?)?),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{EntryKind, Listing, SharedStorage, Storage, StorageAttributes, Visibility};
use crate::error::{FsError, Result};
use crate::location::Location;
use crate::mime;
use crate::stream::{StreamHandle, StreamMode};

/// Storage rooted at a directory on the local disk.
///
/// Locations are resolved segment by segment under the root; since a
/// [`Location`] never contains `..`, nothing outside the root is reachable
/// through it (symlinks inside the root are followed).
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Use `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn current_dir() -> Result<Self> {
        Self::new(std::env::current_dir()?)
    }

    pub fn shared(root: impl Into<PathBuf>) -> Result<SharedStorage> {
        Ok(Arc::new(Self::new(root)?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute on-disk path of a location.
    pub fn resolve(&self, location: &Location) -> PathBuf {
        let mut path = self.root.clone();
        for segment in location.segments() {
            path.push(segment);
        }
        path
    }

    fn ensure_parent(&self, location: &Location) -> Result<()> {
        let parent = self.resolve(&location.up());
        if parent.is_file() {
            return Err(FsError::AlreadyExists(format!(
                "Parent is a file: {}",
                location.up()
            )));
        }
        fs::create_dir_all(parent)?;
        Ok(())
    }

    fn file_path(&self, location: &Location) -> Result<PathBuf> {
        let path = self.resolve(location);
        if path.is_file() {
            Ok(path)
        } else {
            Err(FsError::NoSuchFile(location.to_string()))
        }
    }
}

/// Map `NotFound` to the domain error, pass everything else through.
fn not_found_as(err: io::Error, location: &Location) -> FsError {
    if err.kind() == io::ErrorKind::NotFound {
        FsError::NoSuchFile(location.to_string())
    } else {
        FsError::Io(err)
    }
}

/// Location of a listed entry, or `None` when its on-disk name does not
/// round-trip through `Location` (not UTF-8, or containing `\`).
fn addressable(parent: &Location, entry: &fs::DirEntry) -> Option<Location> {
    let raw = entry.file_name();
    let Some(name) = raw.to_str() else {
        tracing::warn!("Skipping non UTF-8 entry {:?} in {}", raw, parent);
        return None;
    };
    let location = parent.join(name);
    if name.contains('\\') || location.basename() != name {
        tracing::warn!("Skipping unaddressable entry {:?} in {}", name, parent);
        return None;
    }
    Some(location)
}

fn attributes(entry: &fs::DirEntry, location: Location) -> Result<StorageAttributes> {
    let file_type = entry.file_type()?;
    let is_dir = if file_type.is_symlink() {
        entry.path().is_dir()
    } else {
        file_type.is_dir()
    };
    let (kind, size) = if is_dir {
        (EntryKind::Directory, None)
    } else {
        (EntryKind::File, Some(fs::metadata(entry.path())?.len()))
    };
    Ok(StorageAttributes {
        location,
        kind,
        size,
    })
}

impl Storage for LocalStorage {
    fn file_exists(&self, location: &Location) -> Result<bool> {
        Ok(self.resolve(location).is_file())
    }

    fn directory_exists(&self, location: &Location) -> Result<bool> {
        Ok(self.resolve(location).is_dir())
    }

    fn read(&self, location: &Location) -> Result<Vec<u8>> {
        let path = self.file_path(location)?;
        fs::read(path).map_err(|e| not_found_as(e, location))
    }

    fn open_stream(&self, location: &Location, mode: StreamMode) -> Result<StreamHandle> {
        let path = self.file_path(location)?;
        let file = fs::OpenOptions::new()
            .read(mode.readable)
            .write(mode.writable)
            .open(&path)
            .map_err(|e| not_found_as(e, location))?;
        Ok(StreamHandle::new(file, mode, path.to_string_lossy()))
    }

    fn write(&self, location: &Location, content: &[u8]) -> Result<()> {
        let path = self.resolve(location);
        if path.is_dir() {
            return Err(FsError::AlreadyExists(format!(
                "Cannot overwrite directory with file: {}",
                location
            )));
        }
        self.ensure_parent(location)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn delete(&self, location: &Location) -> Result<()> {
        let path = self.resolve(location);
        if path.is_dir() {
            return Err(FsError::InvalidOperation(format!("Not a file: {}", location)));
        }
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(FsError::Io(e)),
            _ => Ok(()),
        }
    }

    fn delete_directory(&self, location: &Location) -> Result<()> {
        if location.is_root() {
            return Err(FsError::InvalidOperation(
                "Cannot delete root directory".to_string(),
            ));
        }
        let path = self.resolve(location);
        if path.is_file() {
            return Err(FsError::InvalidOperation(format!(
                "Not a directory: {}",
                location
            )));
        }
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(FsError::Io(e)),
            _ => Ok(()),
        }
    }

    fn move_entry(&self, from: &Location, to: &Location) -> Result<()> {
        if from.is_root() {
            return Err(FsError::InvalidOperation(
                "Cannot move root directory".to_string(),
            ));
        }
        if from == to {
            return Ok(());
        }
        let source = self.resolve(from);
        if !source.exists() {
            return Err(FsError::NoSuchFile(from.to_string()));
        }
        if source.is_dir() && to.starts_with(from) {
            return Err(FsError::InvalidOperation(format!(
                "Cannot move directory into its own descendant: {} -> {}",
                from, to
            )));
        }
        let target = self.resolve(to);
        if target.is_dir() || (target.exists() && source.is_dir()) {
            return Err(FsError::AlreadyExists(format!(
                "Destination already exists: {}",
                to
            )));
        }
        self.ensure_parent(to)?;
        fs::rename(source, target)?;
        Ok(())
    }

    fn copy_entry(&self, from: &Location, to: &Location) -> Result<()> {
        let source = self.file_path(from)?;
        let target = self.resolve(to);
        if target.is_dir() {
            return Err(FsError::AlreadyExists(format!(
                "Cannot overwrite directory with file: {}",
                to
            )));
        }
        self.ensure_parent(to)?;
        fs::copy(source, target)?;
        Ok(())
    }

    fn create_directory(&self, location: &Location) -> Result<()> {
        let path = self.resolve(location);
        if path.is_file() {
            return Err(FsError::AlreadyExists(format!(
                "Path exists and is not a directory: {}",
                location
            )));
        }
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn list_contents(&self, location: &Location) -> Result<Listing<'_>> {
        let path = self.resolve(location);
        if !path.is_dir() {
            return Err(FsError::NoSuchDirectory(location.to_string()));
        }
        let parent = location.clone();
        let entries = fs::read_dir(path)?.filter_map(move |entry| -> Option<Result<StorageAttributes>> {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(FsError::Io(e))),
            };
            let location = addressable(&parent, &entry)?;
            Some(attributes(&entry, location))
        });
        Ok(Box::new(entries))
    }

    fn file_size(&self, location: &Location) -> Result<u64> {
        let path = self.file_path(location)?;
        Ok(fs::metadata(path).map_err(|e| not_found_as(e, location))?.len())
    }

    fn last_modified(&self, location: &Location) -> Result<DateTime<Utc>> {
        let metadata = fs::metadata(self.resolve(location)).map_err(|e| not_found_as(e, location))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    fn mime_type(&self, location: &Location) -> Result<String> {
        let path = self.resolve(location);
        if path.is_dir() {
            return Ok(mime::DIRECTORY.to_string());
        }
        let file = fs::File::open(&path).map_err(|e| not_found_as(e, location))?;
        let mut head = Vec::with_capacity(mime::SNIFF_LEN);
        file.take(mime::SNIFF_LEN as u64).read_to_end(&mut head)?;
        Ok(mime::detect(location, &head))
    }

    #[cfg(unix)]
    fn visibility(&self, location: &Location) -> Result<Visibility> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(self.resolve(location)).map_err(|e| not_found_as(e, location))?;
        if metadata.permissions().mode() & 0o044 != 0 {
            Ok(Visibility::Public)
        } else {
            Ok(Visibility::Private)
        }
    }

    #[cfg(not(unix))]
    fn visibility(&self, location: &Location) -> Result<Visibility> {
        fs::metadata(self.resolve(location)).map_err(|e| not_found_as(e, location))?;
        Ok(Visibility::Public)
    }

    #[cfg(unix)]
    fn set_visibility(&self, location: &Location, visibility: Visibility) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.resolve(location);
        let metadata = fs::metadata(&path).map_err(|e| not_found_as(e, location))?;
        let mode = match (visibility, metadata.is_dir()) {
            (Visibility::Public, false) => 0o644,
            (Visibility::Private, false) => 0o600,
            (Visibility::Public, true) => 0o755,
            (Visibility::Private, true) => 0o700,
        };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_visibility(&self, location: &Location, visibility: Visibility) -> Result<()> {
        fs::metadata(self.resolve(location)).map_err(|e| not_found_as(e, location))?;
        tracing::debug!(%location, %visibility, "visibility is not supported on this platform");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Directory;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    fn loc(raw: &str) -> Location {
        Location::new(raw)
    }

    #[test]
    fn resolves_under_root() {
        let (dir, storage) = storage();
        assert_eq!(storage.resolve(&loc("../../etc/passwd")), dir.path().join("etc").join("passwd"));
        assert_eq!(storage.resolve(&Location::root()), dir.path());
    }

    #[test]
    fn write_read_and_size() {
        let (dir, storage) = storage();
        storage.write(&loc("/a/b.txt"), b"hello").unwrap();
        assert!(dir.path().join("a").join("b.txt").is_file());
        assert_eq!(storage.read(&loc("/a/b.txt")).unwrap(), b"hello");
        assert_eq!(storage.file_size(&loc("/a/b.txt")).unwrap(), 5);
        assert!(storage.directory_exists(&loc("/a")).unwrap());
    }

    #[test]
    fn missing_entries_are_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(storage.read(&loc("/nope")), Err(FsError::NoSuchFile(_))));
        assert!(matches!(storage.file_size(&loc("/nope")), Err(FsError::NoSuchFile(_))));
        assert!(matches!(
            storage.list_contents(&loc("/nope")),
            Err(FsError::NoSuchDirectory(_))
        ));
        storage.delete(&loc("/nope")).unwrap();
        storage.delete_directory(&loc("/nope")).unwrap();
    }

    #[test]
    fn list_contents_reports_kinds_and_sizes() {
        let (_dir, storage) = storage();
        storage.write(&loc("/d/one.txt"), b"1").unwrap();
        storage.write(&loc("/d/sub/two.txt"), b"22").unwrap();
        let mut attrs: Vec<StorageAttributes> = storage
            .list_contents(&loc("/d"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        attrs.sort_by(|a, b| a.location.cmp(&b.location));
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].location, loc("/d/one.txt"));
        assert_eq!(attrs[0].size, Some(1));
        assert_eq!(attrs[1].kind, EntryKind::Directory);
    }

    #[test]
    fn move_and_copy() {
        let (_dir, storage) = storage();
        storage.write(&loc("/src.txt"), b"data").unwrap();
        storage.copy_entry(&loc("/src.txt"), &loc("/copy/src.txt")).unwrap();
        storage.move_entry(&loc("/src.txt"), &loc("/moved/renamed.txt")).unwrap();
        assert!(!storage.file_exists(&loc("/src.txt")).unwrap());
        assert_eq!(storage.read(&loc("/copy/src.txt")).unwrap(), b"data");
        assert_eq!(storage.read(&loc("/moved/renamed.txt")).unwrap(), b"data");
    }

    #[test]
    fn mime_type_sniffs_content() {
        let (_dir, storage) = storage();
        storage.create_directory(&loc("/d")).unwrap();
        storage.write(&loc("/d/page.html"), b"<html></html>").unwrap();
        assert_eq!(storage.mime_type(&loc("/d")).unwrap(), mime::DIRECTORY);
        assert_eq!(storage.mime_type(&loc("/d/page.html")).unwrap(), "text/html");
    }

    #[test]
    fn read_write_stream() {
        let (_dir, storage) = storage();
        storage.write(&loc("/s.txt"), b"abc").unwrap();
        let mut handle = storage.open_stream(&loc("/s.txt"), StreamMode::READ_WRITE).unwrap();
        handle.seek(io::SeekFrom::End(0)).unwrap();
        handle.write(b"def").unwrap();
        drop(handle);
        assert_eq!(storage.read(&loc("/s.txt")).unwrap(), b"abcdef");
    }

    #[cfg(unix)]
    #[test]
    fn listing_skips_names_without_a_location() {
        let (dir, storage) = storage();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d").join("a\\b.txt"), b"x").unwrap();
        fs::write(dir.path().join("d").join("ok.txt"), b"ok").unwrap();

        let attrs: Vec<StorageAttributes> = storage
            .list_contents(&loc("/d"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].location, loc("/d/ok.txt"));

        // Listing, counting and copying agree on what the directory holds.
        let shared: SharedStorage = Arc::new(storage);
        let d = Directory::open("/d", &shared).unwrap();
        assert_eq!(d.count(false).unwrap(), 1);
        assert_eq!(d.list_contents(None).unwrap().len(), 1);
        let copy = d.copy("/copy").unwrap();
        assert!(copy.exists("ok.txt").unwrap());
        assert_eq!(copy.count(true).unwrap(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn listing_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (dir, storage) = storage();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d").join(OsStr::from_bytes(b"bad\xff.txt")), b"x").unwrap();
        fs::write(dir.path().join("d").join("ok.txt"), b"ok").unwrap();

        let attrs: Vec<StorageAttributes> = storage
            .list_contents(&loc("/d"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].location, loc("/d/ok.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn visibility_maps_to_permissions() {
        let (_dir, storage) = storage();
        storage.write(&loc("/v.txt"), b"v").unwrap();
        storage.set_visibility(&loc("/v.txt"), Visibility::Private).unwrap();
        assert_eq!(storage.visibility(&loc("/v.txt")).unwrap(), Visibility::Private);
        storage.set_visibility(&loc("/v.txt"), Visibility::Public).unwrap();
        assert_eq!(storage.visibility(&loc("/v.txt")).unwrap(), Visibility::Public);
    }
}

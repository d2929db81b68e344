use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entry::Entry;
use crate::error::{FsError, Result};
use crate::file::{EntryCache, File, FileEntry};
use crate::location::Location;
use crate::storage::{SharedStorage, StorageAttributes, Visibility};

/// A container entry.
///
/// `Directory` holds no open resources; every structural query goes to the
/// storage. Only the basename, parent and last-modified time are cached.
#[derive(Clone)]
pub struct Directory {
    location: Location,
    storage: SharedStorage,
    cache: EntryCache,
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("location", &self.location)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInfo {
    pub path: Location,
    pub basename: String,
    pub last_modified: DateTime<Utc>,
}

/// Filter applied to listed entries.
pub type EntryFilter<'a> = &'a dyn Fn(&Entry) -> bool;

impl Directory {
    fn new(location: Location, storage: SharedStorage) -> Self {
        Self {
            location,
            storage,
            cache: EntryCache::default(),
        }
    }

    pub fn open(location: impl Into<Location>, storage: &SharedStorage) -> Result<Self> {
        let location = location.into();
        if !storage.directory_exists(&location)? {
            return Err(FsError::NoSuchDirectory(location.to_string()));
        }
        Ok(Self::new(location, SharedStorage::clone(storage)))
    }

    /// Open the directory, creating it (and any missing parents) first when
    /// it does not exist.
    pub fn create(location: impl Into<Location>, storage: &SharedStorage) -> Result<Self> {
        let location = location.into();
        match Self::open(location.clone(), storage) {
            Err(e) if e.is_not_found() => {
                storage.create_directory(&location)?;
                tracing::debug!("Created directory {}", location);
                Self::open(location, storage)
            }
            other => other,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn basename(&self) -> &str {
        self.cache
            .basename
            .get_or_init(|| self.location.basename().to_string())
    }

    pub fn parent(&self) -> &Location {
        self.cache.parent.get_or_init(|| self.location.up())
    }

    pub fn is_root(&self) -> bool {
        self.location.is_root()
    }

    /// The containing directory; `None` only for the root. The parent of a
    /// top-level directory such as `/a` is the root itself, not `None`.
    pub fn up(&self) -> Result<Option<Directory>> {
        if self.is_root() {
            return Ok(None);
        }
        Self::open(self.parent().clone(), &self.storage).map(Some)
    }

    pub fn matches(&self, pattern: &str) -> bool {
        self.location.matches(pattern)
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

    pub fn info(&self) -> Result<DirectoryInfo> {
        Ok(DirectoryInfo {
            path: self.location.clone(),
            basename: self.basename().to_string(),
            last_modified: self.last_modified()?,
        })
    }

    // -- Listing ----------------------------------------------------------

    fn entry_for(&self, attrs: StorageAttributes) -> Result<Entry> {
        if attrs.is_dir() {
            Ok(Entry::Directory(Self::new(
                attrs.location,
                SharedStorage::clone(&self.storage),
            )))
        } else {
            File::open(attrs.location, &self.storage).map(Entry::from)
        }
    }

    /// Direct children, lazily wrapped. Order is whatever the storage
    /// reports.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<Entry>> + '_> {
        let listing = self.storage.list_contents(&self.location)?;
        Ok(listing.map(move |attrs| -> Result<Entry> { self.entry_for(attrs?) }))
    }

    pub fn list_contents(&self, filter: Option<EntryFilter<'_>>) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for entry in self.iter()? {
            let entry = entry?;
            if filter.is_none_or(|keep| keep(&entry)) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn files(&self) -> Result<Vec<Entry>> {
        self.list_contents(Some(&|entry: &Entry| entry.is_file()))
    }

    /// Direct subdirectories.
    pub fn children(&self) -> Result<Vec<Directory>> {
        Ok(self
            .list_contents(Some(&|entry: &Entry| entry.is_dir()))?
            .into_iter()
            .filter_map(Entry::into_directory)
            .collect())
    }

    pub fn has_children(&self) -> Result<bool> {
        for attrs in self.storage.list_contents(&self.location)? {
            if attrs?.is_dir() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_empty(&self) -> Result<bool> {
        let first = self.storage.list_contents(&self.location)?.next();
        Ok(first.transpose()?.is_none())
    }

    /// Map every direct entry through `callback`, keeping the `Some` results.
    pub fn walk<T>(&self, mut callback: impl FnMut(Entry) -> Option<T>) -> Result<Vec<T>> {
        let mut results = Vec::new();
        for entry in self.iter()? {
            if let Some(result) = callback(entry?) {
                results.push(result);
            }
        }
        Ok(results)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        self.storage.exists(&self.location.append([path]))
    }

    // -- Aggregates -------------------------------------------------------

    /// Direct entries, or with `recursive` every descendant file and
    /// directory counted once.
    pub fn count(&self, recursive: bool) -> Result<usize> {
        let mut count = 0;
        for attrs in self.storage.list_contents(&self.location)? {
            let attrs = attrs?;
            count += 1;
            if recursive && attrs.is_dir() {
                count += Self::new(attrs.location, SharedStorage::clone(&self.storage))
                    .count(true)?;
            }
        }
        Ok(count)
    }

    /// Total byte size of every file below this directory.
    pub fn size(&self) -> Result<u64> {
        let mut total = 0;
        for attrs in self.storage.list_contents(&self.location)? {
            let attrs = attrs?;
            total += if attrs.is_dir() {
                Self::new(attrs.location, SharedStorage::clone(&self.storage)).size()?
            } else {
                match attrs.size {
                    Some(size) => size,
                    None => self.storage.file_size(&attrs.location)?,
                }
            };
        }
        Ok(total)
    }

    // -- Mutation ---------------------------------------------------------

    /// Copy `entry` into this directory under its own basename. The source
    /// is left in place.
    pub fn add(&self, entry: &Entry) -> Result<()> {
        match entry {
            Entry::Directory(dir) => {
                dir.copy(self.location.join(dir.basename()))?;
            }
            Entry::File(file) => {
                file.copy(self.location.clone(), true)?;
            }
            Entry::Image(image) => {
                image.file().copy(self.location.clone(), true)?;
            }
        }
        tracing::debug!("Added {} to {}", entry.location(), self.location);
        Ok(())
    }

    /// Copy entries whose name is not yet taken in `target`.
    fn copy_entries_into(&self, target: &Directory) -> Result<usize> {
        let mut copied = 0;
        for entry in self.iter()? {
            let entry = entry?;
            if target.exists(entry.basename())? {
                tracing::warn!(
                    "Skipping {}: {} already exists in {}",
                    entry.location(),
                    entry.basename(),
                    target.location
                );
                continue;
            }
            target.add(&entry)?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Recursively copy this directory to `destination`. Names that already
    /// exist in the destination are skipped, not overwritten.
    pub fn copy(&self, destination: impl Into<Location>) -> Result<Directory> {
        let destination = destination.into();
        if destination.starts_with(&self.location) {
            return Err(FsError::InvalidOperation(format!(
                "Cannot copy {} into itself ({})",
                self.location, destination
            )));
        }

        let target = Self::create(destination, &self.storage)?;
        let copied = self.copy_entries_into(&target)?;
        tracing::info!(
            "Copied {} to {} ({} entries)",
            self.location,
            target.location,
            copied
        );
        Ok(target)
    }

    /// Copy to `destination`, then delete this directory. Not atomic: a
    /// failure part way leaves both trees behind.
    pub fn move_to(self, destination: impl Into<Location>) -> Result<Directory> {
        let target = self.copy(destination)?;
        self.storage.delete_directory(&self.location)?;
        tracing::info!("Moved {} to {}", self.location, target.location);
        Ok(target)
    }

    /// Copy the entries of each directory into this one, in order. On a name
    /// collision the entry already present wins, so earlier directories take
    /// precedence over later ones.
    pub fn merge(&self, directories: &[Directory], delete_merged: bool) -> Result<&Self> {
        for dir in directories {
            if dir.location == self.location {
                tracing::warn!("Skipping merge of {} into itself", self.location);
                continue;
            }
            if self.location.starts_with(&dir.location) {
                return Err(FsError::InvalidOperation(format!(
                    "Cannot merge {} into its descendant {}",
                    dir.location, self.location
                )));
            }
            let copied = dir.copy_entries_into(self)?;
            tracing::info!(
                "Merged {} into {} ({} entries)",
                dir.location,
                self.location,
                copied
            );
            if delete_merged {
                self.storage.delete_directory(&dir.location)?;
            }
        }
        Ok(self)
    }

    pub fn add_new_file(&self, name: &str, content: &[u8]) -> Result<FileEntry> {
        File::create(Some(self.location.append([name])), content, &self.storage)
    }

    pub fn add_new_directory(&self, location: &str) -> Result<Directory> {
        Self::create(self.location.append([location]), &self.storage)
    }

    /// Remove the directory and everything below it.
    pub fn delete(self) -> Result<()> {
        self.storage.delete_directory(&self.location)?;
        tracing::debug!("Deleted directory {}", self.location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};

    fn storage_with(files: &[(&str, &[u8])]) -> SharedStorage {
        let storage = MemoryStorage::shared();
        for (path, content) in files {
            storage.write(&Location::new(path), content).unwrap();
        }
        storage
    }

    fn read(storage: &SharedStorage, path: &str) -> Vec<u8> {
        storage.read(&Location::new(path)).unwrap()
    }

    fn names(entries: &[Entry]) -> Vec<String> {
        let mut names: Vec<String> = entries.iter().map(|e| e.basename().to_string()).collect();
        names.sort();
        names
    }

    // -- open / create --

    #[test]
    fn open_missing_directory_fails() {
        let storage = storage_with(&[("/file.txt", b"x")]);
        let err = Directory::open("/nope", &storage).unwrap_err();
        assert!(matches!(err, FsError::NoSuchDirectory(_)));
        assert!(Directory::open("/file.txt", &storage).unwrap_err().is_not_found());
    }

    #[test]
    fn create_is_idempotent() {
        let storage = storage_with(&[]);
        let dir = Directory::create("/a/b", &storage).unwrap();
        dir.add_new_file("keep.txt", b"k").unwrap();
        let again = Directory::create("/a/b", &storage).unwrap();
        assert_eq!(again.location(), dir.location());
        assert_eq!(again.count(false).unwrap(), 1);
        assert!(storage.directory_exists(&Location::new("/a")).unwrap());
    }

    #[test]
    fn up_stops_at_root() {
        let storage = storage_with(&[("/a/b/c.txt", b"c")]);
        let dir = Directory::open("/a/b", &storage).unwrap();
        let parent = dir.up().unwrap().unwrap();
        assert_eq!(parent.location(), &Location::new("/a"));
        let root = parent.up().unwrap().unwrap();
        assert!(root.is_root());
        assert!(root.up().unwrap().is_none());
    }

    // -- listing --

    #[test]
    fn lists_direct_children_only() {
        let storage = storage_with(&[
            ("/d/a.txt", b"a"),
            ("/d/b.txt", b"b"),
            ("/d/sub/c.txt", b"c"),
        ]);
        let dir = Directory::open("/d", &storage).unwrap();
        assert_eq!(names(&dir.list_contents(None).unwrap()), ["a.txt", "b.txt", "sub"]);
        assert_eq!(names(&dir.files().unwrap()), ["a.txt", "b.txt"]);

        let children = dir.children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].basename(), "sub");
        assert!(dir.has_children().unwrap());
        assert!(!children[0].has_children().unwrap());
    }

    #[test]
    fn list_contents_applies_filter() {
        let storage = storage_with(&[("/d/a.txt", b"a"), ("/d/b.md", b"b")]);
        let dir = Directory::open("/d", &storage).unwrap();
        let md = dir
            .list_contents(Some(&|entry: &Entry| entry.matches("*.md")))
            .unwrap();
        assert_eq!(names(&md), ["b.md"]);
    }

    #[test]
    fn walk_keeps_some_results() {
        let storage = storage_with(&[("/d/a.txt", b"aaa"), ("/d/b.txt", b"b"), ("/d/e/f", b"")]);
        let dir = Directory::open("/d", &storage).unwrap();
        let mut big = dir
            .walk(|entry| match entry.size() {
                Ok(size) if entry.is_file() && size > 1 => Some(entry.basename().to_string()),
                _ => None,
            })
            .unwrap();
        big.sort();
        assert_eq!(big, ["a.txt"]);
    }

    #[test]
    fn is_empty_and_exists() {
        let storage = storage_with(&[("/full/x", b"x")]);
        let empty = Directory::create("/empty", &storage).unwrap();
        assert!(empty.is_empty().unwrap());

        let full = Directory::open("/full", &storage).unwrap();
        assert!(!full.is_empty().unwrap());
        assert!(full.exists("x").unwrap());
        assert!(!full.exists("y").unwrap());
        assert!(Directory::open("/", &storage).unwrap().exists("full").unwrap());
    }

    #[test]
    fn listed_images_are_images() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let storage = storage_with(&[("/pics/a.png", &png), ("/pics/b.txt", b"b")]);
        let dir = Directory::open("/pics", &storage).unwrap();
        let entries = dir.list_contents(None).unwrap();
        let images = entries
            .iter()
            .filter(|e| matches!(e, Entry::Image(_)))
            .count();
        assert_eq!(images, 1);
    }

    // -- aggregates --

    #[test]
    fn count_direct_and_recursive() {
        let storage = storage_with(&[
            ("/d/a.txt", b"a"),
            ("/d/b.txt", b"b"),
            ("/d/sub/c.txt", b"c"),
        ]);
        let dir = Directory::open("/d", &storage).unwrap();
        assert_eq!(dir.count(false).unwrap(), 3);
        assert_eq!(dir.count(true).unwrap(), 4);
    }

    #[test]
    fn count_recursive_counts_nested_directories_once() {
        let storage = storage_with(&[("/d/x/y/z.txt", b"z")]);
        let dir = Directory::open("/d", &storage).unwrap();
        // x, y, z.txt
        assert_eq!(dir.count(true).unwrap(), 3);
    }

    #[test]
    fn size_sums_the_tree() {
        let storage = storage_with(&[
            ("/d/a", b"12345"),
            ("/d/sub/b", b"123"),
            ("/d/sub/deeper/c", b"12"),
        ]);
        let dir = Directory::open("/d", &storage).unwrap();
        assert_eq!(dir.size().unwrap(), 10);
        assert_eq!(Directory::create("/e", &storage).unwrap().size().unwrap(), 0);
    }

    // -- copy / move / merge --

    #[test]
    fn copy_skips_names_already_present() {
        let storage = storage_with(&[
            ("/a/x", b"from a"),
            ("/a/y", b"only a"),
            ("/a/sub/z", b"nested"),
            ("/b/x", b"from b"),
        ]);
        let a = Directory::open("/a", &storage).unwrap();
        let b = a.copy("/b").unwrap();

        assert_eq!(read(&storage, "/b/x"), b"from b");
        assert_eq!(read(&storage, "/b/y"), b"only a");
        assert_eq!(read(&storage, "/b/sub/z"), b"nested");
        assert_eq!(b.count(true).unwrap(), 4);
        // Source untouched.
        assert_eq!(a.count(true).unwrap(), 4);
    }

    #[test]
    fn copy_into_itself_is_rejected() {
        let storage = storage_with(&[("/a/x", b"x")]);
        let a = Directory::open("/a", &storage).unwrap();
        assert!(matches!(a.copy("/a/inner"), Err(FsError::InvalidOperation(_))));
        assert!(matches!(a.copy("/a"), Err(FsError::InvalidOperation(_))));
        assert!(!storage.directory_exists(&Location::new("/a/inner")).unwrap());
        // A sibling sharing the name prefix is fine.
        a.copy("/ab").unwrap();
        assert_eq!(read(&storage, "/ab/x"), b"x");
    }

    #[test]
    fn move_copies_then_deletes() {
        let storage = storage_with(&[("/src/a.txt", b"a"), ("/src/deep/b.txt", b"b")]);
        let src = Directory::open("/src", &storage).unwrap();
        let dst = src.move_to("/dst").unwrap();
        assert_eq!(dst.location(), &Location::new("/dst"));
        assert!(!storage.directory_exists(&Location::new("/src")).unwrap());
        assert_eq!(read(&storage, "/dst/deep/b.txt"), b"b");
        assert_eq!(dst.count(true).unwrap(), 3);
    }

    #[test]
    fn merge_first_directory_wins() {
        let storage = storage_with(&[
            ("/one/x", b"1"),
            ("/two/x", b"2"),
            ("/two/z", b"z"),
        ]);
        let target = Directory::create("/target", &storage).unwrap();
        let one = Directory::open("/one", &storage).unwrap();
        let two = Directory::open("/two", &storage).unwrap();

        target.merge(&[one, two], true).unwrap();
        assert_eq!(read(&storage, "/target/x"), b"1");
        assert_eq!(read(&storage, "/target/z"), b"z");
        assert!(!storage.directory_exists(&Location::new("/one")).unwrap());
        assert!(!storage.directory_exists(&Location::new("/two")).unwrap());
    }

    #[test]
    fn merge_keeps_sources_by_default() {
        let storage = storage_with(&[("/one/x", b"1")]);
        let target = Directory::create("/target", &storage).unwrap();
        let one = Directory::open("/one", &storage).unwrap();
        target.merge(std::slice::from_ref(&one), false).unwrap();
        assert!(one.exists("x").unwrap());
        assert!(target.exists("x").unwrap());
    }

    #[test]
    fn merge_rejects_ancestor_and_skips_self() {
        let storage = storage_with(&[("/p/c/x", b"x")]);
        let child = Directory::open("/p/c", &storage).unwrap();
        let parent = Directory::open("/p", &storage).unwrap();
        assert!(matches!(
            child.merge(&[parent], false),
            Err(FsError::InvalidOperation(_))
        ));

        child.merge(&[child.clone()], true).unwrap();
        assert!(child.exists("x").unwrap());
    }

    #[test]
    fn add_copies_files_and_directories() {
        let storage = storage_with(&[("/src/f.txt", b"f"), ("/src/d/g.txt", b"g")]);
        let dst = Directory::create("/dst", &storage).unwrap();
        let src = Directory::open("/src", &storage).unwrap();
        for entry in src.list_contents(None).unwrap() {
            dst.add(&entry).unwrap();
        }
        assert_eq!(read(&storage, "/dst/f.txt"), b"f");
        assert_eq!(read(&storage, "/dst/d/g.txt"), b"g");
        assert!(storage.file_exists(&Location::new("/src/f.txt")).unwrap());
    }

    #[test]
    fn add_new_entries_and_delete() {
        let storage = storage_with(&[]);
        let dir = Directory::create("/work", &storage).unwrap();
        let file = dir.add_new_file("notes/today.txt", b"hi").unwrap();
        assert_eq!(file.location(), &Location::new("/work/notes/today.txt"));
        let sub = dir.add_new_directory("empty").unwrap();
        assert!(sub.is_empty().unwrap());
        // notes, notes/today.txt, empty
        assert_eq!(dir.count(true).unwrap(), 3);

        dir.delete().unwrap();
        assert!(!storage.exists(&Location::new("/work")).unwrap());
    }

    #[test]
    fn info_and_visibility() {
        let storage = storage_with(&[("/d/x", b"x")]);
        let dir = Directory::open("/d", &storage).unwrap();
        let json = serde_json::to_value(dir.info().unwrap()).unwrap();
        assert_eq!(json["path"], "/d");
        assert_eq!(json["basename"], "d");
        assert!(json["lastModified"].is_string());

        assert_eq!(dir.visibility(Some(Visibility::Private)).unwrap(), Visibility::Public);
        assert_eq!(dir.visibility(None).unwrap(), Visibility::Private);
    }
}

// ---------------------------------------------------------------------------
// In-memory storage backend
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::{EntryKind, Listing, SharedStorage, Storage, StorageAttributes, Visibility};
use crate::error::{FsError, Result};
use crate::location::Location;
use crate::mime;
use crate::stream::{StreamHandle, StreamMode};

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Node {
	kind: EntryKind,
	data: Vec<u8>,
	modified_at: DateTime<Utc>,
	visibility: Visibility,
}

impl Node {
	fn directory(ts: DateTime<Utc>) -> Self {
		Self {
			kind: EntryKind::Directory,
			data: Vec::new(),
			modified_at: ts,
			visibility: Visibility::Public,
		}
	}

	fn file(data: Vec<u8>, ts: DateTime<Utc>, visibility: Visibility) -> Self {
		Self {
			kind: EntryKind::File,
			data,
			modified_at: ts,
			visibility,
		}
	}

	fn is_file(&self) -> bool {
		self.kind == EntryKind::File
	}
}

type Tree = BTreeMap<Location, Node>;

fn lock(nodes: &Mutex<Tree>) -> MutexGuard<'_, Tree> {
	nodes.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMetrics {
	pub total_size: u64,
	pub file_count: usize,
	pub directory_count: usize,
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// A storage backend that keeps the whole tree in memory.
///
/// Listings come back sorted by location. Cloning shares the same tree.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
	nodes: Arc<Mutex<Tree>>,
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStorage {
	pub fn new() -> Self {
		let mut nodes = Tree::new();
		nodes.insert(Location::root(), Node::directory(Utc::now()));
		Self {
			nodes: Arc::new(Mutex::new(nodes)),
		}
	}

	pub fn shared() -> SharedStorage {
		Arc::new(Self::new())
	}

	pub fn metrics(&self) -> MemoryMetrics {
		let nodes = lock(&self.nodes);
		let mut metrics = MemoryMetrics {
			total_size: 0,
			file_count: 0,
			directory_count: 0,
		};
		for node in nodes.values() {
			if node.is_file() {
				metrics.file_count += 1;
				metrics.total_size += node.data.len() as u64;
			} else {
				metrics.directory_count += 1;
			}
		}
		metrics
	}

	// -- Helpers (private) ------------------------------------------------

	fn file_node(nodes: &Tree, location: &Location) -> Result<Node> {
		match nodes.get(location) {
			Some(node) if node.is_file() => Ok(node.clone()),
			_ => Err(FsError::NoSuchFile(location.to_string())),
		}
	}

	fn create_parents(nodes: &mut Tree, location: &Location, ts: DateTime<Utc>) -> Result<()> {
		let mut ancestor = Location::root();
		for segment in location.parent_segments() {
			ancestor = ancestor.join(segment);
			match nodes.get(&ancestor) {
				Some(node) if node.is_file() => {
					return Err(FsError::AlreadyExists(format!(
						"Parent is a file: {}",
						ancestor
					)));
				}
				Some(_) => {}
				None => {
					nodes.insert(ancestor.clone(), Node::directory(ts));
				}
			}
		}
		Ok(())
	}

	fn direct_children(nodes: &Tree, dir: &Location) -> Vec<Location> {
		nodes
			.keys()
			.filter(|key| !key.is_root() && key.up() == *dir)
			.cloned()
			.collect()
	}

	fn descendants(nodes: &Tree, dir: &Location) -> Vec<Location> {
		nodes
			.keys()
			.filter(|key| *key != dir && key.starts_with(dir))
			.cloned()
			.collect()
	}

	fn touch_parent(nodes: &mut Tree, location: &Location, ts: DateTime<Utc>) {
		if let Some(parent) = nodes.get_mut(&location.up()) {
			parent.modified_at = ts;
		}
	}
}

impl Storage for MemoryStorage {
	fn file_exists(&self, location: &Location) -> Result<bool> {
		Ok(lock(&self.nodes).get(location).is_some_and(Node::is_file))
	}

	fn directory_exists(&self, location: &Location) -> Result<bool> {
		Ok(lock(&self.nodes)
			.get(location)
			.is_some_and(|node| !node.is_file()))
	}

	fn read(&self, location: &Location) -> Result<Vec<u8>> {
		Ok(Self::file_node(&lock(&self.nodes), location)?.data)
	}

	fn open_stream(&self, location: &Location, mode: StreamMode) -> Result<StreamHandle> {
		let node = Self::file_node(&lock(&self.nodes), location)?;
		if !mode.writable {
			return Ok(StreamHandle::from_bytes(node.data, location.as_str()));
		}
		let writer = MemoryWriter {
			cursor: Cursor::new(node.data),
			nodes: Arc::clone(&self.nodes),
			location: location.clone(),
			dirty: false,
		};
		Ok(StreamHandle::new(writer, mode, location.as_str()))
	}

	fn write(&self, location: &Location, content: &[u8]) -> Result<()> {
		let mut nodes = lock(&self.nodes);
		let existing = nodes.get(location).cloned();
		if let Some(node) = &existing {
			if !node.is_file() {
				return Err(FsError::AlreadyExists(format!(
					"Cannot overwrite directory with file: {}",
					location
				)));
			}
		}

		let ts = Utc::now();
		Self::create_parents(&mut nodes, location, ts)?;
		let visibility = existing.map_or(Visibility::Public, |node| node.visibility);
		nodes.insert(location.clone(), Node::file(content.to_vec(), ts, visibility));
		Self::touch_parent(&mut nodes, location, ts);
		Ok(())
	}

	fn delete(&self, location: &Location) -> Result<()> {
		let mut nodes = lock(&self.nodes);
		match nodes.get(location) {
			None => Ok(()),
			Some(node) if node.is_file() => {
				nodes.remove(location);
				Self::touch_parent(&mut nodes, location, Utc::now());
				Ok(())
			}
			Some(_) => Err(FsError::InvalidOperation(format!(
				"Not a file: {}",
				location
			))),
		}
	}

	fn delete_directory(&self, location: &Location) -> Result<()> {
		if location.is_root() {
			return Err(FsError::InvalidOperation(
				"Cannot delete root directory".to_string(),
			));
		}

		let mut nodes = lock(&self.nodes);
		match nodes.get(location) {
			None => return Ok(()),
			Some(node) if node.is_file() => {
				return Err(FsError::InvalidOperation(format!(
					"Not a directory: {}",
					location
				)));
			}
			Some(_) => {}
		}

		for desc in Self::descendants(&nodes, location) {
			nodes.remove(&desc);
		}
		nodes.remove(location);
		Self::touch_parent(&mut nodes, location, Utc::now());
		Ok(())
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

		let mut nodes = lock(&self.nodes);
		let node = nodes
			.get(from)
			.cloned()
			.ok_or_else(|| FsError::NoSuchFile(from.to_string()))?;

		if !node.is_file() && to.starts_with(from) {
			return Err(FsError::InvalidOperation(format!(
				"Cannot move directory into its own descendant: {} -> {}",
				from, to
			)));
		}
		if nodes.get(to).is_some_and(|dest| !dest.is_file() || !node.is_file()) {
			return Err(FsError::AlreadyExists(format!(
				"Destination already exists: {}",
				to
			)));
		}

		let ts = Utc::now();
		Self::create_parents(&mut nodes, to, ts)?;

		if !node.is_file() {
			let prefix_len = from.as_str().len();
			for desc in Self::descendants(&nodes, from) {
				if let Some(desc_node) = nodes.remove(&desc) {
					let moved = Location::new(&format!("{}{}", to, &desc.as_str()[prefix_len..]));
					nodes.insert(moved, desc_node);
				}
			}
		}

		let mut moved_node = node;
		moved_node.modified_at = ts;
		nodes.remove(from);
		nodes.insert(to.clone(), moved_node);
		Self::touch_parent(&mut nodes, from, ts);
		Self::touch_parent(&mut nodes, to, ts);
		Ok(())
	}

	fn copy_entry(&self, from: &Location, to: &Location) -> Result<()> {
		let mut nodes = lock(&self.nodes);
		let source = Self::file_node(&nodes, from)?;
		if nodes.get(to).is_some_and(|dest| !dest.is_file()) {
			return Err(FsError::AlreadyExists(format!(
				"Cannot overwrite directory with file: {}",
				to
			)));
		}

		let ts = Utc::now();
		Self::create_parents(&mut nodes, to, ts)?;
		nodes.insert(to.clone(), Node::file(source.data, ts, source.visibility));
		Self::touch_parent(&mut nodes, to, ts);
		Ok(())
	}

	fn create_directory(&self, location: &Location) -> Result<()> {
		let mut nodes = lock(&self.nodes);
		match nodes.get(location) {
			Some(node) if node.is_file() => Err(FsError::AlreadyExists(format!(
				"Path exists and is not a directory: {}",
				location
			))),
			Some(_) => Ok(()),
			None => {
				let ts = Utc::now();
				Self::create_parents(&mut nodes, location, ts)?;
				nodes.insert(location.clone(), Node::directory(ts));
				Self::touch_parent(&mut nodes, location, ts);
				Ok(())
			}
		}
	}

	fn list_contents(&self, location: &Location) -> Result<Listing<'_>> {
		let nodes = lock(&self.nodes);
		if !nodes.get(location).is_some_and(|node| !node.is_file()) {
			return Err(FsError::NoSuchDirectory(location.to_string()));
		}

		let entries: Vec<Result<StorageAttributes>> = Self::direct_children(&nodes, location)
			.into_iter()
			.filter_map(|child| {
				nodes.get(&child).map(|node| {
					Ok(StorageAttributes {
						kind: node.kind,
						size: node.is_file().then(|| node.data.len() as u64),
						location: child,
					})
				})
			})
			.collect();
		Ok(Box::new(entries.into_iter()))
	}

	fn file_size(&self, location: &Location) -> Result<u64> {
		Ok(Self::file_node(&lock(&self.nodes), location)?.data.len() as u64)
	}

	fn last_modified(&self, location: &Location) -> Result<DateTime<Utc>> {
		lock(&self.nodes)
			.get(location)
			.map(|node| node.modified_at)
			.ok_or_else(|| FsError::NoSuchFile(location.to_string()))
	}

	fn mime_type(&self, location: &Location) -> Result<String> {
		let nodes = lock(&self.nodes);
		match nodes.get(location) {
			Some(node) if node.is_file() => {
				let head = &node.data[..node.data.len().min(mime::SNIFF_LEN)];
				Ok(mime::detect(location, head))
			}
			Some(_) => Ok(mime::DIRECTORY.to_string()),
			None => Err(FsError::NoSuchFile(location.to_string())),
		}
	}

	fn visibility(&self, location: &Location) -> Result<Visibility> {
		lock(&self.nodes)
			.get(location)
			.map(|node| node.visibility)
			.ok_or_else(|| FsError::NoSuchFile(location.to_string()))
	}

	fn set_visibility(&self, location: &Location, visibility: Visibility) -> Result<()> {
		let mut nodes = lock(&self.nodes);
		let node = nodes
			.get_mut(location)
			.ok_or_else(|| FsError::NoSuchFile(location.to_string()))?;
		node.visibility = visibility;
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Writable streams
// ---------------------------------------------------------------------------

/// Buffers writes and commits them back to the tree on flush and drop.
struct MemoryWriter {
	cursor: Cursor<Vec<u8>>,
	nodes: Arc<Mutex<Tree>>,
	location: Location,
	dirty: bool,
}

impl MemoryWriter {
	fn commit(&mut self) {
		if !self.dirty {
			return;
		}
		let mut nodes = lock(&self.nodes);
		// The entry may have been moved or deleted while the stream was open.
		if let Some(node) = nodes.get_mut(&self.location) {
			if node.is_file() {
				node.data = self.cursor.get_ref().clone();
				node.modified_at = Utc::now();
			}
		}
		self.dirty = false;
	}
}

impl Read for MemoryWriter {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.cursor.read(buf)
	}
}

impl Write for MemoryWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.dirty = true;
		self.cursor.write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.commit();
		Ok(())
	}
}

impl Seek for MemoryWriter {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		self.cursor.seek(pos)
	}
}

impl Drop for MemoryWriter {
	fn drop(&mut self) {
		self.commit();
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

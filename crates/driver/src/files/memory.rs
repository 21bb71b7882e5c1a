//! In-memory backend.
//!
//! Keeps a tree of directories, files and links in a map keyed by absolute
//! path. Permission bits are explicit per node, which makes it the backend of
//! choice for scratch volumes and for exercising permission rules that a
//! privileged process cannot observe on a real disk.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use super::adapter::{absolute_link_target, normalize_path, FileHandle, FileSystemAdapter, OpenMode};

/// Maximum number of links followed when resolving a path.
const MAX_LINK_HOPS: usize = 32;

#[derive(Debug, Clone)]
enum NodeKind {
    Dir,
    File(Vec<u8>),
    Link(PathBuf),
}

#[derive(Debug, Clone)]
struct MemNode {
    kind: NodeKind,
    mtime: SystemTime,
    readable: bool,
    writable: bool,
}

impl MemNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            mtime: SystemTime::now(),
            readable: true,
            writable: true,
        }
    }
}

type Nodes = BTreeMap<PathBuf, MemNode>;

fn poisoned() -> io::Error {
    io::Error::other("memory filesystem lock poisoned")
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display()))
}

/// Follow links in every component of `path`, returning the existing node it names.
fn resolve(nodes: &Nodes, path: &Path) -> Option<PathBuf> {
    let mut hops = 0;
    resolve_with(nodes, path, &mut hops)
}

fn resolve_with(nodes: &Nodes, path: &Path, hops: &mut usize) -> Option<PathBuf> {
    let mut current = PathBuf::new();
    for component in normalize_path(path).components() {
        current.push(component.as_os_str());
        if let Some(NodeKind::Link(target)) = nodes.get(&current).map(|n| &n.kind) {
            *hops += 1;
            if *hops > MAX_LINK_HOPS {
                return None;
            }
            let target = absolute_link_target(&current, target);
            current = resolve_with(nodes, &target, hops)?;
        }
    }
    nodes.contains_key(&current).then_some(current)
}

/// Key of the node `path` names itself: links in the parent are followed, the
/// final component is not.
fn locate(nodes: &Nodes, path: &Path) -> Option<PathBuf> {
    let path = normalize_path(path);
    match (path.parent(), path.file_name()) {
        // Ancestors above the volume root are not nodes; keep them as they are
        (Some(parent), Some(name)) => Some(
            resolve(nodes, parent)
                .unwrap_or_else(|| parent.to_path_buf())
                .join(name),
        ),
        _ => Some(path),
    }
}

/// Thread-safe in-memory filesystem.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    nodes: Arc<RwLock<Nodes>>,
}

impl MemoryFileSystem {
    /// Create a filesystem containing only the directory `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut nodes = Nodes::new();
        nodes.insert(normalize_path(root.as_ref()), MemNode::new(NodeKind::Dir));
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    fn with_nodes<T>(&self, f: impl FnOnce(&Nodes) -> T) -> io::Result<T> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        Ok(f(&nodes))
    }

    fn with_nodes_mut<T>(&self, f: impl FnOnce(&mut Nodes) -> io::Result<T>) -> io::Result<T> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        f(&mut nodes)
    }

    /// Look at the resolved node behind `path`.
    fn inspect(&self, path: &Path, f: impl FnOnce(&MemNode) -> bool) -> bool {
        self.with_nodes(|nodes| {
            resolve(nodes, path)
                .and_then(|p| nodes.get(&p))
                .map(f)
                .unwrap_or(false)
        })
        .unwrap_or(false)
    }

    /// Look at the node `path` names itself, without following a final link.
    fn own<T>(&self, path: &Path, f: impl FnOnce(&MemNode) -> T) -> Option<T> {
        self.with_nodes(|nodes| {
            locate(nodes, path)
                .and_then(|key| nodes.get(&key))
                .map(f)
        })
        .ok()
        .flatten()
    }

    /// Key for a new node: the parent must resolve to a directory.
    fn new_key(nodes: &Nodes, path: &Path) -> io::Result<PathBuf> {
        let path = normalize_path(path);
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(not_found(&path));
        };
        let parent = resolve(nodes, parent)
            .filter(|p| nodes.get(p).is_some_and(|n| matches!(n.kind, NodeKind::Dir)))
            .ok_or_else(|| not_found(parent))?;
        Ok(parent.join(name))
    }

    /// Insert a node whose parent must be an existing directory.
    fn insert(&self, path: &Path, kind: NodeKind) -> io::Result<()> {
        self.with_nodes_mut(|nodes| {
            let key = Self::new_key(nodes, path)?;
            if nodes.contains_key(&key) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}", key.display()),
                ));
            }
            nodes.insert(key, MemNode::new(kind));
            Ok(())
        })
    }

    /// Add a directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) -> io::Result<()> {
        self.insert(path.as_ref(), NodeKind::Dir)
    }

    /// Add a file with the given contents.
    pub fn add_file(&self, path: impl AsRef<Path>, data: &[u8]) -> io::Result<()> {
        self.insert(path.as_ref(), NodeKind::File(data.to_vec()))
    }

    /// Add a symbolic link. The target is stored as given.
    pub fn add_link(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) -> io::Result<()> {
        self.insert(link.as_ref(), NodeKind::Link(target.as_ref().to_path_buf()))
    }

    fn update(&self, path: &Path, f: impl FnOnce(&mut MemNode)) -> io::Result<()> {
        self.with_nodes_mut(|nodes| {
            let key = locate(nodes, path).ok_or_else(|| not_found(path))?;
            let node = nodes.get_mut(&key).ok_or_else(|| not_found(path))?;
            f(node);
            Ok(())
        })
    }

    /// Set the permission bits of a node (not following a final link).
    pub fn set_permissions(
        &self,
        path: impl AsRef<Path>,
        readable: bool,
        writable: bool,
    ) -> io::Result<()> {
        self.update(path.as_ref(), |node| {
            node.readable = readable;
            node.writable = writable;
        })
    }

    /// Set the modification time of a node (not following a final link).
    pub fn set_mtime(&self, path: impl AsRef<Path>, mtime: SystemTime) -> io::Result<()> {
        self.update(path.as_ref(), |node| node.mtime = mtime)
    }

    fn remove(&self, path: &Path, want_dir: bool) -> io::Result<()> {
        self.with_nodes_mut(|nodes| {
            let key = locate(nodes, path).ok_or_else(|| not_found(path))?;
            let node = nodes.get(&key).ok_or_else(|| not_found(path))?;
            let is_dir = matches!(node.kind, NodeKind::Dir);
            if is_dir != want_dir {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{}: wrong node kind", path.display()),
                ));
            }
            if is_dir && nodes.keys().any(|k| k.parent() == Some(key.as_path())) {
                return Err(io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("{}", path.display()),
                ));
            }
            nodes.remove(&key);
            Ok(())
        })
    }

    fn store(&self, path: &Path, data: Vec<u8>) -> io::Result<()> {
        self.with_nodes_mut(|nodes| {
            let key = match resolve(nodes, path) {
                Some(key) => key,
                None => Self::new_key(nodes, path)?,
            };
            match nodes.get_mut(&key) {
                Some(node) => match node.kind {
                    NodeKind::File(_) => {
                        node.kind = NodeKind::File(data);
                        node.mtime = SystemTime::now();
                        Ok(())
                    }
                    _ => Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("{}: not a file", key.display()),
                    )),
                },
                None => {
                    nodes.insert(key, MemNode::new(NodeKind::File(data)));
                    Ok(())
                }
            }
        })
    }
}

/// Stream over an in-memory file. Writes are committed on flush or close.
struct MemoryHandle {
    fs: MemoryFileSystem,
    path: PathBuf,
    buffer: Cursor<Vec<u8>>,
    writable: bool,
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "handle opened for reading",
            ));
        }
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.writable {
            self.fs.store(&self.path, self.buffer.get_ref().clone())?;
        }
        Ok(())
    }
}

impl FileSystemAdapter for MemoryFileSystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn exists(&self, path: &Path) -> bool {
        self.own(path, |_| ()).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inspect(path, |n| matches!(n.kind, NodeKind::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inspect(path, |n| matches!(n.kind, NodeKind::Dir))
    }

    fn is_link(&self, path: &Path) -> bool {
        self.own(path, |n| matches!(n.kind, NodeKind::Link(_)))
            .unwrap_or(false)
    }

    fn is_readable(&self, path: &Path) -> bool {
        self.inspect(path, |n| n.readable)
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.inspect(path, |n| n.writable)
    }

    fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
        self.own(path, |n| n.mtime).ok_or_else(|| not_found(path))
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        self.with_nodes(|nodes| {
            let node = resolve(nodes, path).and_then(|p| nodes.get(&p));
            match node.map(|n| &n.kind) {
                Some(NodeKind::File(data)) => Some(data.len() as u64),
                Some(_) => Some(0),
                None => None,
            }
        })?
        .ok_or_else(|| not_found(path))
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        // Relative targets hang off the directory that really holds the link
        let link = self.with_nodes(|nodes| {
            let key = locate(nodes, path)?;
            match &nodes.get(&key)?.kind {
                NodeKind::Link(target) => Some(Some(absolute_link_target(&key, target))),
                _ => Some(None),
            }
        })?;
        match link {
            Some(Some(target)) => Ok(target),
            Some(None) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}: not a link", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.insert(path, NodeKind::Dir)
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        if self.exists(path) {
            return Ok(());
        }
        self.insert(path, NodeKind::File(Vec::new()))
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.insert(link, NodeKind::Link(target.to_path_buf()))
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        self.remove(path, true)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        self.remove(path, false)
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        let data = match mode {
            OpenMode::Read => self.read_all(path)?,
            OpenMode::Write => {
                self.store(path, Vec::new())?;
                Vec::new()
            }
        };
        Ok(Box::new(MemoryHandle {
            fs: self.clone(),
            path: path.to_path_buf(),
            buffer: Cursor::new(data),
            writable: mode == OpenMode::Write,
        }))
    }

    fn scandir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.with_nodes(|nodes| {
            let dir = resolve(nodes, path)
                .filter(|p| nodes.get(p).is_some_and(|n| matches!(n.kind, NodeKind::Dir)))
                .ok_or_else(|| not_found(path))?;
            // Children are listed under the link's own path, not the target's
            let base = normalize_path(path);
            Ok(nodes
                .keys()
                .filter(|k| k.parent() == Some(dir.as_path()))
                .filter_map(|k| k.file_name().map(|name| base.join(name)))
                .collect())
        })?
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let data = self.read_all(from)?;
        self.store(to, data)
    }

    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.with_nodes(|nodes| {
            let node = resolve(nodes, path).and_then(|p| nodes.get(&p));
            match node.map(|n| &n.kind) {
                Some(NodeKind::File(data)) => Ok(data.clone()),
                Some(_) => Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{}: not a file", path.display()),
                )),
                None => Err(not_found(path)),
            }
        })?
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.store(path, data.to_vec())
    }
}

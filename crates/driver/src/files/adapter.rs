//! Backend capability contract.
//!
//! Every storage backend (local disk, in-memory, remote protocols, object
//! stores) implements [`FileSystemAdapter`]. The driver is written once against
//! this trait and never asks which backend it is talking to.
//!
//! Adapters perform raw I/O only. They do not check root containment,
//! exclusion patterns or configured permissions; that is the job of
//! [`AccessPolicy`](super::policy::AccessPolicy), which the driver consults
//! before any adapter call.

use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use protocol::DIRECTORY_MIME;
use url::Url;

use super::mime;

/// A readable and writable stream returned by [`FileSystemAdapter::open`].
pub trait FileHandle: Read + Write + Send {}

impl<T: Read + Write + Send> FileHandle for T {}

/// Mode for [`FileSystemAdapter::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for reading.
    Read,
    /// Create or truncate a file for writing.
    Write,
}

/// Primitive operations a storage backend must provide.
///
/// Predicates (`is_file`, `is_dir`, `is_readable`, ...) follow symbolic links,
/// except [`exists`](Self::exists) and [`is_link`](Self::is_link) which look
/// at the node itself so that a dangling link still exists.
pub trait FileSystemAdapter: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Check if a node (file, directory or link, even a dangling one) exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if the path resolves to a regular file.
    fn is_file(&self, path: &Path) -> bool;

    /// Check if the path resolves to a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if the path itself is a symbolic link.
    fn is_link(&self, path: &Path) -> bool;

    /// Native read permission.
    fn is_readable(&self, path: &Path) -> bool;

    /// Native write permission.
    fn is_writable(&self, path: &Path) -> bool;

    /// Native permission to remove the node (usually: parent is writable).
    fn is_removable(&self, path: &Path) -> bool {
        self.dirname(path)
            .map(|parent| self.is_writable(&parent))
            .unwrap_or(false)
    }

    /// Check if `path` is `parent` or lies beneath it.
    fn in_path(&self, path: &Path, parent: &Path) -> bool {
        path.starts_with(parent)
    }

    /// Path of `path` relative to `root`, `/`-separated, empty for the root itself.
    fn rel_path(&self, root: &Path, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Externally reachable URL of a root-relative path under `base`.
    ///
    /// Segments are percent-encoded; directories get a trailing slash.
    fn path_to_url(&self, base: &Url, rel: &str, is_dir: bool) -> Option<String> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().ok()?;
            segments.pop_if_empty();
            segments.extend(rel.split('/').filter(|s| !s.is_empty()));
            if is_dir {
                segments.push("");
            }
        }
        Some(url.to_string())
    }

    /// Backend-specific name filter, applied on top of the volume's exclusion patterns.
    fn accepted(&self, _path: &Path) -> bool {
        true
    }

    /// Parent directory of a path.
    fn dirname(&self, path: &Path) -> Option<PathBuf> {
        path.parent().map(Path::to_path_buf)
    }

    /// Final component of a path.
    fn basename(&self, path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Modification time of the node itself (links are not followed).
    fn mtime(&self, path: &Path) -> io::Result<SystemTime>;

    /// Size in bytes of the resolved file.
    fn size(&self, path: &Path) -> io::Result<u64>;

    /// MIME type of the resolved node, `directory` for directories.
    fn mimetype(&self, path: &Path) -> String {
        if self.is_dir(path) {
            DIRECTORY_MIME.to_string()
        } else {
            mime::from_path(path).to_string()
        }
    }

    /// One hop of link resolution, returned as a normalized absolute path.
    ///
    /// A relative target is joined to the parent of `path` as given, so
    /// callers pass paths without linked ancestors.
    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create a directory. The parent must exist.
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Create an empty file, or leave an existing one untouched.
    fn touch(&self, path: &Path) -> io::Result<()>;

    /// Create a symbolic link at `link` pointing to `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or link.
    fn unlink(&self, path: &Path) -> io::Result<()>;

    /// Open a stream on a file.
    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>>;

    /// Close a stream, committing buffered writes.
    fn close(&self, mut handle: Box<dyn FileHandle>) -> io::Result<()> {
        handle.flush()
    }

    /// Full paths of the direct children of a directory.
    fn scandir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Sub-directories of `path` down to `depth` levels, parents before children.
    ///
    /// Links are not descended into, so cycles cannot occur.
    fn tree(&self, path: &Path, depth: u32) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        if depth == 0 {
            return Ok(dirs);
        }
        for child in self.scandir(path)? {
            if self.is_link(&child) || !self.is_dir(&child) {
                continue;
            }
            dirs.push(child.clone());
            if depth > 1 {
                // Unreadable sub-trees are skipped, not fatal
                dirs.extend(self.tree(&child, depth - 1).unwrap_or_default());
            }
        }
        Ok(dirs)
    }

    /// Copy a single file.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Read a whole file.
    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of a file, creating it if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the root stays at the root, so the result of normalizing an
/// absolute path is always absolute.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Turn a raw link target into a normalized absolute path.
pub(crate) fn absolute_link_target(link: &Path, target: &Path) -> PathBuf {
    let joined = if target.is_relative() {
        link.parent()
            .map(|p| p.join(target))
            .unwrap_or_else(|| target.to_path_buf())
    } else {
        target.to_path_buf()
    };
    normalize_path(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize_path(Path::new("/srv//files/")), PathBuf::from("/srv/files"));
    }

    #[test]
    fn test_absolute_link_target() {
        assert_eq!(
            absolute_link_target(Path::new("/srv/files/link"), Path::new("docs/a.txt")),
            PathBuf::from("/srv/files/docs/a.txt")
        );
        assert_eq!(
            absolute_link_target(Path::new("/srv/files/sub/link"), Path::new("../a.txt")),
            PathBuf::from("/srv/files/a.txt")
        );
        assert_eq!(
            absolute_link_target(Path::new("/srv/files/link"), Path::new("/etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
    }
}

//! Host filesystem backend.
//!
//! Thin mapping of the adapter contract onto `std::fs`. Whole-file writes go
//! through a temporary sibling and an atomic rename, so readers never observe
//! a half-written file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::SystemTime;

use tracing::warn;

use super::adapter::{absolute_link_target, normalize_path, FileHandle, FileSystemAdapter, OpenMode};

/// Adapter over the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a local filesystem adapter.
    pub fn new() -> Self {
        Self
    }

    /// Temporary sibling used for atomic writes. Dot-prefixed so the default
    /// exclusion pattern hides it from listings.
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", name, process::id()))
    }
}

impl FileSystemAdapter for LocalFileSystem {
    fn name(&self) -> &'static str {
        "local"
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn is_link(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn is_readable(&self, path: &Path) -> bool {
        if self.is_dir(path) {
            fs::read_dir(path).is_ok()
        } else {
            File::open(path).is_ok()
        }
    }

    fn is_writable(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false)
    }

    fn accepted(&self, path: &Path) -> bool {
        // Names that are not valid UTF-8 cannot be hashed reversibly
        path.to_str().is_some()
    }

    fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
        fs::symlink_metadata(path)?.modified()
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        let target = fs::read_link(path)?;
        Ok(absolute_link_target(&normalize_path(path), &target))
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => File::create(path)?,
        };
        Ok(Box::new(file))
    }

    fn scandir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn read_all(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let temp = Self::temp_path(path);
        let result = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(data)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp, path));

        if result.is_err() && temp.exists() {
            if let Err(e) = fs::remove_file(&temp) {
                warn!(path = ?temp, error = %e, "Failed to clean up temp file after write error");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_basic_predicates() {
        let temp = TempDir::new().unwrap();
        let file = create_test_file(temp.path(), "a.txt", b"alpha");
        let fs = LocalFileSystem::new();

        assert!(fs.exists(&file));
        assert!(fs.is_file(&file));
        assert!(!fs.is_dir(&file));
        assert!(fs.is_dir(temp.path()));
        assert!(fs.is_readable(&file));
        assert!(fs.is_readable(temp.path()));
        assert!(fs.is_writable(&file));
        assert_eq!(fs.size(&file).unwrap(), 5);
        assert!(!fs.exists(&temp.path().join("missing")));
    }

    #[test]
    fn test_mkdir_touch_and_remove() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let dir = temp.path().join("sub");
        let file = dir.join("empty.txt");

        fs.mkdir(&dir).unwrap();
        assert!(fs.mkdir(&dir).is_err());
        fs.touch(&file).unwrap();
        assert_eq!(fs.size(&file).unwrap(), 0);

        // touch leaves existing contents alone
        fs::write(&file, b"kept").unwrap();
        fs.touch(&file).unwrap();
        assert_eq!(fs.read_all(&file).unwrap(), b"kept");

        assert!(fs.rmdir(&dir).is_err());
        fs.unlink(&file).unwrap();
        fs.rmdir(&dir).unwrap();
        assert!(!fs.exists(&dir));
    }

    #[test]
    fn test_scandir() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.txt", b"a");
        create_test_file(temp.path(), "b.txt", b"b");
        fs::create_dir(temp.path().join("sub")).unwrap();
        let fs = LocalFileSystem::new();

        let mut children = fs.scandir(temp.path()).unwrap();
        children.sort();
        assert_eq!(
            children,
            vec![
                temp.path().join("a.txt"),
                temp.path().join("b.txt"),
                temp.path().join("sub"),
            ]
        );
        assert!(fs.scandir(&temp.path().join("a.txt")).is_err());
    }

    #[test]
    fn test_write_all_is_atomic() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let file = temp.path().join("out.txt");

        fs.write_all(&file, b"first").unwrap();
        fs.write_all(&file, b"second").unwrap();
        assert_eq!(fs.read_all(&file).unwrap(), b"second");

        // No temp files left behind
        let children = fs.scandir(temp.path()).unwrap();
        assert_eq!(children, vec![file]);
    }

    #[test]
    fn test_open_handles() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFileSystem::new();
        let file = temp.path().join("stream.bin");

        let mut handle = fs.open(&file, OpenMode::Write).unwrap();
        handle.write_all(b"streamed").unwrap();
        fs.close(handle).unwrap();

        let mut handle = fs.open(&file, OpenMode::Read).unwrap();
        let mut out = Vec::new();
        handle.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"streamed");
    }

    #[test]
    fn test_copy() {
        let temp = TempDir::new().unwrap();
        let src = create_test_file(temp.path(), "src.txt", b"payload");
        let fs = LocalFileSystem::new();
        let dst = temp.path().join("dst.txt");

        fs.copy(&src, &dst).unwrap();
        assert_eq!(fs.read_all(&dst).unwrap(), b"payload");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = create_test_file(temp.path(), "target.txt", b"t");
        let fs = LocalFileSystem::new();
        let link = temp.path().join("link");
        let dangling = temp.path().join("dangling");

        fs.symlink(Path::new("target.txt"), &link).unwrap();
        fs.symlink(Path::new("/nonexistent/path"), &dangling).unwrap();

        assert!(fs.is_link(&link));
        assert!(fs.is_file(&link));
        assert!(!fs.is_link(&target));
        assert_eq!(fs.readlink(&link).unwrap(), target);

        assert!(fs.exists(&dangling));
        assert!(!fs.is_file(&dangling));
        assert!(!fs.is_readable(&dangling));

        fs.unlink(&link).unwrap();
        assert!(fs.exists(&target));
    }

    #[test]
    fn test_tree_depth() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b/c")).unwrap();
        create_test_file(temp.path(), "file.txt", b"");
        let fs = LocalFileSystem::new();

        let tree = fs.tree(temp.path(), 2).unwrap();
        assert_eq!(tree, vec![temp.path().join("a"), temp.path().join("a/b")]);
    }
}

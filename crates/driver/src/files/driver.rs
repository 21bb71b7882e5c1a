//! Storage driver.
//!
//! A [`StorageDriver`] wires a backend adapter to the codec, the access
//! policy and the metadata assembler. Every public operation follows the same
//! path: check availability, decode the hash, make sure the path is visible,
//! then touch the backend. Hashes that fail any of those steps are
//! indistinguishable from hashes of missing files.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use protocol::{DirectoryNode, FileNode, RootParams, SortKey};
use tracing::{debug, info, warn};
use url::Url;

use super::adapter::{normalize_path, FileHandle, FileSystemAdapter, OpenMode};
use super::codec::PathCodec;
use super::local::LocalFileSystem;
use super::memory::MemoryFileSystem;
use super::metadata::MetadataAssembler;
use super::policy::{ops, AccessPolicy, UploadFilter};
use super::sort::{compare, sort_nodes};
use crate::config::{Backend, ConfigError, StorageConfig};
use crate::error::{Result, StorageError};

/// One mounted volume.
pub struct StorageDriver {
    config: StorageConfig,
    codec: PathCodec,
    policy: AccessPolicy,
    fs: Box<dyn FileSystemAdapter>,
    root: PathBuf,
    start: Option<PathBuf>,
    url: Option<Url>,
    display_root: String,
    params: RootParams,
    available: bool,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for StorageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDriver")
            .field("id", &self.config.id)
            .field("backend", &self.fs.name())
            .field("root", &self.root)
            .field("available", &self.available)
            .finish()
    }
}

impl StorageDriver {
    /// Mount a volume on the backend named in its configuration.
    pub fn from_config(config: StorageConfig) -> std::result::Result<Self, ConfigError> {
        let fs: Box<dyn FileSystemAdapter> = match config.backend {
            Backend::Local => Box::new(LocalFileSystem::new()),
            Backend::Memory => Box::new(MemoryFileSystem::new(normalize_path(&config.path))),
        };
        Self::new(config, fs)
    }

    /// Mount a volume on an explicit backend.
    ///
    /// Invalid settings are a configuration error. A root that is missing,
    /// not a directory, or neither readable nor writable yields a driver that
    /// answers every call with [`StorageError::Unavailable`].
    pub fn new(
        config: StorageConfig,
        fs: Box<dyn FileSystemAdapter>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let root = normalize_path(&config.path);
        let exclude = AccessPolicy::compile_exclusions(&config.exclude).map_err(|e| {
            ConfigError::InvalidPattern {
                id: config.id.clone(),
                pattern: config.exclude.join(", "),
                reason: e.to_string(),
            }
        })?;

        let is_dir = fs.is_dir(&root);
        let readable = is_dir && fs.is_readable(&root);
        let writable = is_dir && fs.is_writable(&root);
        let available = is_dir && (readable || writable);
        if !is_dir {
            warn!(volume = %config.id, root = ?root, "Volume root is not a directory");
        } else if !available {
            warn!(volume = %config.id, root = ?root, "Volume root is neither readable nor writable");
        }

        let policy = AccessPolicy::new(root.clone(), readable)
            .with_disabled(config.disabled.clone())
            .with_upload_filter(UploadFilter::new(
                config.upload_allow.clone(),
                config.upload_deny.clone(),
                config.upload_order,
            ))
            .with_exclusions(exclude)
            .read_only(config.read_only);

        // An unreadable root keeps no entry point and no public URLs
        let (url, tmb_url) = if readable {
            (
                Some(config.url.as_str())
                    .filter(|u| !u.is_empty())
                    .and_then(|u| Url::parse(u).ok()),
                config.tmb_url.clone(),
            )
        } else {
            (None, String::new())
        };

        let display_root = if config.alias.is_empty() {
            fs.basename(&root)
        } else {
            config.alias.clone()
        };

        let params = RootParams {
            disabled: config.disabled.clone(),
            copy_from: config.copy_from,
            copy_to: config.copy_to,
            tmb_url,
            tree_deep: config.tree_deep,
            upload_allow: config.upload_allow.clone(),
            upload_deny: config.upload_deny.clone(),
            upload_order: config.upload_order,
        };

        let mut driver = Self {
            codec: PathCodec::new(config.id.clone(), root.clone()),
            config,
            policy,
            fs,
            root,
            start: None,
            url,
            display_root,
            params,
            available,
            last_error: Mutex::new(None),
        };

        if driver.available && readable {
            driver.start = driver.start_path();
        }

        if driver.available {
            info!(
                volume = %driver.config.id,
                backend = driver.fs.name(),
                root = ?driver.root,
                "Mounted volume"
            );
        }
        Ok(driver)
    }

    /// Configured start directory, if it is a readable directory inside the volume.
    fn start_path(&self) -> Option<PathBuf> {
        let configured = self.config.start_path.trim();
        if configured.is_empty() {
            return None;
        }
        let path = Path::new(configured);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let meta = self.assembler();
        let usable = meta.visible(&path)
            && self.fs.exists(&path)
            && meta.directory(&path).is_ok();
        if usable {
            Some(path)
        } else {
            debug!(volume = %self.config.id, start = configured, "Discarding start path");
            None
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn assembler(&self) -> MetadataAssembler<'_> {
        MetadataAssembler {
            fs: self.fs.as_ref(),
            codec: &self.codec,
            policy: &self.policy,
            display_root: &self.display_root,
            date_format: &self.config.date_format,
            url: self.url.as_ref(),
            params: &self.params,
            now: Local::now(),
        }
    }

    /// Remember the error of a failed call.
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if let Ok(mut slot) = self.last_error.lock() {
                *slot = Some(e.to_string());
            }
        }
        result
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }

    fn ensure_enabled(&self, operation: &str) -> Result<()> {
        if self.policy.is_disabled(operation) {
            debug!(volume = %self.config.id, operation, "Operation disabled");
            Err(StorageError::AccessDenied)
        } else {
            Ok(())
        }
    }

    /// Decode a hash into a visible path, without checking existence.
    fn lookup(&self, hash: &str) -> Option<PathBuf> {
        let path = self.codec.decode(hash)?;
        if self.assembler().visible(&path) {
            Some(path)
        } else {
            debug!(volume = %self.config.id, hash, "Rejected hash");
            None
        }
    }

    /// Decode a hash into a visible, existing path.
    fn resolve(&self, hash: &str) -> Result<PathBuf> {
        self.ensure_available()?;
        self.lookup(hash)
            .filter(|path| self.fs.exists(path))
            .ok_or(StorageError::NotFound)
    }

    /// Resolve a hash and answer a yes/no question about it.
    fn predicate(&self, hash: &str, check: impl FnOnce(&Path) -> bool) -> Result<bool> {
        self.ensure_available()?;
        Ok(match self.resolve(hash) {
            Ok(path) => check(&path),
            Err(_) => false,
        })
    }

    /// Path a link leads to, or the path itself. `None` for broken links.
    fn effective(&self, path: &Path) -> Option<PathBuf> {
        self.assembler().effective(path).ok()
    }

    /// Validate a new entry name inside `dir`.
    fn child_path(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidParameters);
        }
        let path = dir.join(name);
        if !self.assembler().visible(&path) {
            return Err(StorageError::InvalidParameters);
        }
        Ok(path)
    }

    /// Resolve `parent` to a writable directory and `name` to a free entry in it.
    fn prepare_create(&self, parent: &str, name: &str) -> Result<PathBuf> {
        let dir = self.assembler().directory(&self.resolve(parent)?)?;
        let path = self.child_path(&dir, name)?;
        if !self.policy.is_writable(self.fs.as_ref(), &dir) {
            return Err(StorageError::AccessDenied);
        }
        if self.fs.exists(&path) {
            return Err(StorageError::AlreadyExists);
        }
        Ok(path)
    }

    /// Resolve a hash to a readable regular file, following links.
    fn readable_file(&self, hash: &str) -> Result<PathBuf> {
        let path = self.resolve(hash)?;
        let target = self.assembler().effective(&path)?;
        if !self.fs.is_file(&target) {
            return Err(StorageError::InvalidParameters);
        }
        if !self.policy.is_readable(self.fs.as_ref(), &target) {
            return Err(StorageError::AccessDenied);
        }
        Ok(target)
    }

    // ========================================================================
    // Identity and state
    // ========================================================================

    /// Storage id of this volume.
    pub fn id(&self) -> &str {
        self.codec.id()
    }

    /// Configuration the volume was mounted with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Check if the volume passed its mount-time validation.
    pub fn available(&self) -> bool {
        self.available
    }

    /// Volume-scoped client options.
    pub fn params(&self) -> &RootParams {
        &self.params
    }

    /// Message of the most recent failed call, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    /// Hash of the volume root.
    pub fn root(&self) -> Result<String> {
        self.record(self.ensure_available().map(|_| self.codec.encode(&self.root)))
    }

    /// Hash of the directory a client should open first.
    pub fn start(&self) -> Result<String> {
        self.record(self.ensure_available().map(|_| {
            self.codec
                .encode(self.start.as_deref().unwrap_or(&self.root))
        }))
    }

    /// Hash of a filesystem path inside the volume.
    pub fn hash_of(&self, path: &Path) -> Result<String> {
        let result = self.ensure_available().and_then(|_| {
            let path = normalize_path(path);
            if self.assembler().visible(&path) && self.fs.exists(&path) {
                Ok(self.codec.encode(&path))
            } else {
                Err(StorageError::NotFound)
            }
        });
        self.record(result)
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Check if a hash names an existing node.
    pub fn file_exists(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |_| true))
    }

    /// Check if a hash names a regular file (following links).
    pub fn is_file(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| {
            self.effective(path).is_some_and(|p| self.fs.is_file(&p))
        }))
    }

    /// Check if a hash names a directory (following links).
    pub fn is_dir(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| {
            self.effective(path).is_some_and(|p| self.fs.is_dir(&p))
        }))
    }

    /// Check if a hash names a symbolic link.
    pub fn is_link(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| self.fs.is_link(path)))
    }

    /// Check if a node may be read.
    pub fn is_readable(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| {
            self.effective(path)
                .is_some_and(|p| self.policy.is_readable(self.fs.as_ref(), &p))
        }))
    }

    /// Check if a node may be written.
    pub fn is_writable(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| {
            self.effective(path)
                .is_some_and(|p| self.policy.is_writable(self.fs.as_ref(), &p))
        }))
    }

    /// Check if a node may be removed.
    pub fn is_removable(&self, hash: &str) -> Result<bool> {
        self.record(self.predicate(hash, |path| {
            self.policy.is_removable(self.fs.as_ref(), path)
        }))
    }

    /// Check if a MIME type may be uploaded to this volume.
    pub fn upload_allowed(&self, mime: &str) -> Result<bool> {
        self.record(
            self.ensure_available()
                .map(|_| self.policy.is_upload_allowed(mime)),
        )
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Describe a node.
    pub fn info(&self, hash: &str) -> Result<FileNode> {
        let result = self.resolve(hash).map(|path| self.assembler().info(&path));
        self.record(result)
    }

    /// Describe a directory with its navigation context.
    pub fn dir(&self, hash: &str) -> Result<DirectoryNode> {
        let result = self
            .resolve(hash)
            .and_then(|path| self.assembler().dir(&path));
        self.record(result)
    }

    /// Visible children of a directory, sorted.
    pub fn ls(&self, hash: &str, sort: SortKey) -> Result<Vec<FileNode>> {
        let result = (|| -> Result<Vec<FileNode>> {
            let meta = self.assembler();
            let dir = meta.directory(&self.resolve(hash)?)?;
            let mut nodes: Vec<FileNode> = self
                .fs
                .scandir(&dir)?
                .into_iter()
                .filter(|child| meta.visible(child))
                .map(|child| meta.info(&child))
                .collect();
            sort_nodes(&mut nodes, sort);
            Ok(nodes)
        })();
        self.record(result)
    }

    /// Readable sub-directories down to `tree_deep` levels, sorted by name.
    pub fn tree(&self, hash: &str) -> Result<Vec<DirectoryNode>> {
        let result = (|| -> Result<Vec<DirectoryNode>> {
            let dir = self.assembler().directory(&self.resolve(hash)?)?;
            self.subdirs(&dir, self.params.tree_deep)
        })();
        self.record(result)
    }

    fn subdirs(&self, dir: &Path, depth: u32) -> Result<Vec<DirectoryNode>> {
        let meta = self.assembler();
        let mut dirs: Vec<DirectoryNode> = self
            .fs
            .tree(dir, depth)?
            .into_iter()
            .filter(|path| meta.visible(path))
            .filter_map(|path| meta.dir(&path).ok())
            .collect();
        dirs.sort_by(|a, b| compare(&a.node, &b.node, SortKey::Name));
        Ok(dirs)
    }

    /// Directories from the root down to `hash`, each followed by its
    /// direct sub-directories.
    pub fn parents(&self, hash: &str) -> Result<Vec<DirectoryNode>> {
        let result = (|| -> Result<Vec<DirectoryNode>> {
            let meta = self.assembler();
            let dir = meta.directory(&self.resolve(hash)?)?;

            let mut chain = vec![dir.clone()];
            let mut current = dir;
            while current != self.root {
                current = match self.fs.dirname(&current) {
                    Some(parent) if parent.starts_with(&self.root) => parent,
                    _ => return Err(StorageError::NotFound),
                };
                chain.push(current.clone());
            }
            chain.reverse();

            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for ancestor in chain {
                let records = std::iter::once(meta.dir(&ancestor)?)
                    .chain(self.subdirs(&ancestor, 1).unwrap_or_default());
                for record in records {
                    if seen.insert(record.node.hash.clone()) {
                        out.push(record);
                    }
                }
            }
            Ok(out)
        })();
        self.record(result)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a directory `name` inside `parent`.
    pub fn mkdir(&self, parent: &str, name: &str) -> Result<FileNode> {
        let result = (|| -> Result<FileNode> {
            self.ensure_available()?;
            self.ensure_enabled(ops::MKDIR)?;
            let path = self.prepare_create(parent, name)?;
            self.fs.mkdir(&path)?;
            debug!(volume = %self.config.id, path = ?path, "Created directory");
            Ok(self.assembler().info(&path))
        })();
        self.record(result)
    }

    /// Create an empty file `name` inside `parent`.
    pub fn mkfile(&self, parent: &str, name: &str) -> Result<FileNode> {
        let result = (|| -> Result<FileNode> {
            self.ensure_available()?;
            self.ensure_enabled(ops::MKFILE)?;
            let path = self.prepare_create(parent, name)?;
            self.fs.touch(&path)?;
            debug!(volume = %self.config.id, path = ?path, "Created file");
            Ok(self.assembler().info(&path))
        })();
        self.record(result)
    }

    /// Remove a file, a link, or an empty directory.
    pub fn rm(&self, hash: &str) -> Result<()> {
        let result = (|| -> Result<()> {
            self.ensure_available()?;
            self.ensure_enabled(ops::RM)?;
            let path = self.resolve(hash)?;
            if !self.policy.is_removable(self.fs.as_ref(), &path) {
                return Err(StorageError::AccessDenied);
            }
            if !self.fs.is_link(&path) && self.fs.is_dir(&path) {
                self.fs.rmdir(&path)?;
            } else {
                self.fs.unlink(&path)?;
            }
            debug!(volume = %self.config.id, path = ?path, "Removed");
            Ok(())
        })();
        self.record(result)
    }

    /// Read a whole file.
    pub fn get_contents(&self, hash: &str) -> Result<Vec<u8>> {
        let result = (|| -> Result<Vec<u8>> {
            self.ensure_available()?;
            self.ensure_enabled(ops::GET)?;
            let path = self.readable_file(hash)?;
            Ok(self.fs.read_all(&path)?)
        })();
        self.record(result)
    }

    /// Replace the contents of an existing file.
    pub fn put_contents(&self, hash: &str, data: &[u8]) -> Result<FileNode> {
        let result = (|| -> Result<FileNode> {
            self.ensure_available()?;
            self.ensure_enabled(ops::PUT)?;
            let path = self.resolve(hash)?;
            let target = self.assembler().effective(&path)?;
            if !self.fs.is_file(&target) {
                return Err(StorageError::InvalidParameters);
            }
            if !self.policy.is_writable(self.fs.as_ref(), &target) {
                return Err(StorageError::AccessDenied);
            }
            self.fs.write_all(&target, data)?;
            Ok(self.assembler().info(&path))
        })();
        self.record(result)
    }

    /// Open a file for streaming reads.
    pub fn open(&self, hash: &str) -> Result<Box<dyn FileHandle>> {
        let result = (|| -> Result<Box<dyn FileHandle>> {
            self.ensure_available()?;
            self.ensure_enabled(ops::OPEN)?;
            let path = self.readable_file(hash)?;
            Ok(self.fs.open(&path, OpenMode::Read)?)
        })();
        self.record(result)
    }

    /// Close a handle returned by [`open`](Self::open).
    pub fn close(&self, handle: Box<dyn FileHandle>) -> Result<()> {
        let result = self
            .ensure_available()
            .and_then(|_| self.fs.close(handle).map_err(StorageError::from));
        self.record(result)
    }

    /// Store a stream as a new file `name` inside `parent`.
    ///
    /// Used for copies between volumes; the name's MIME type must pass the
    /// upload filter.
    pub fn store(&self, parent: &str, name: &str, reader: &mut dyn Read) -> Result<FileNode> {
        let result = (|| -> Result<FileNode> {
            self.ensure_available()?;
            self.ensure_enabled(ops::UPLOAD)?;
            let path = self.prepare_create(parent, name)?;
            if !self.policy.is_upload_allowed(&self.fs.mimetype(&path)) {
                return Err(StorageError::AccessDenied);
            }
            let mut handle = self.fs.open(&path, OpenMode::Write)?;
            std::io::copy(reader, &mut handle)?;
            self.fs.close(handle)?;
            Ok(self.assembler().info(&path))
        })();
        self.record(result)
    }

    /// Copy a file or directory tree into `dst_dir`, keeping its name.
    pub fn copy(&self, src: &str, dst_dir: &str) -> Result<FileNode> {
        let result = (|| -> Result<FileNode> {
            self.ensure_available()?;
            self.ensure_enabled(ops::COPY)?;
            if !self.params.copy_from || !self.params.copy_to {
                return Err(StorageError::AccessDenied);
            }
            let meta = self.assembler();
            let source = self.resolve(src)?;
            let from = meta.effective(&source)?;
            if !self.policy.is_readable(self.fs.as_ref(), &from) {
                return Err(StorageError::AccessDenied);
            }

            let name = self.fs.basename(&source);
            let to = self.prepare_create(dst_dir, &name)?;
            if to.starts_with(&from) {
                // Copying a directory into itself
                return Err(StorageError::InvalidParameters);
            }
            self.copy_tree(&from, &to, &mut HashSet::new())?;
            debug!(volume = %self.config.id, from = ?from, to = ?to, "Copied");
            Ok(meta.info(&to))
        })();
        self.record(result)
    }

    /// `ancestors` holds the source directories being copied above `from`;
    /// a link back to one of them is skipped.
    fn copy_tree(&self, from: &Path, to: &Path, ancestors: &mut HashSet<PathBuf>) -> Result<()> {
        if !self.fs.is_dir(from) {
            self.fs.copy(from, to)?;
            return Ok(());
        }
        self.fs.mkdir(to)?;
        ancestors.insert(from.to_path_buf());
        let meta = self.assembler();
        for child in self.fs.scandir(from)? {
            if !meta.visible(&child) {
                continue;
            }
            // Broken links are left behind
            let Some(source) = self.effective(&child) else {
                continue;
            };
            let cyclic = source.starts_with(to) || to.starts_with(&source);
            if cyclic || ancestors.contains(&source) {
                debug!(volume = %self.config.id, path = ?child, "Skipping cyclic link");
                continue;
            }
            self.copy_tree(&source, &to.join(self.fs.basename(&child)), ancestors)?;
        }
        ancestors.remove(from);
        Ok(())
    }
}

//! Node and directory descriptors.
//!
//! The assembler turns paths into the records clients consume. It owns symlink
//! resolution: a link is followed through its whole chain, and every hop (and
//! every linked ancestor on the way) must stay visible inside the volume.
//! Anything else is reported as a broken link, never followed.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone};
use protocol::{DirectoryNode, FileNode, RootParams, BROKEN_LINK_MIME, DIRECTORY_MIME};
use url::Url;

use super::adapter::FileSystemAdapter;
use super::codec::PathCodec;
use super::policy::AccessPolicy;
use crate::error::{Result, StorageError};

/// Maximum number of links followed while resolving one path.
pub const MAX_LINK_HOPS: usize = 32;

/// Date template used when a volume does not configure one.
pub const DEFAULT_DATE_FORMAT: &str = "%-d %b %Y %H:%M";

/// What a resolved node looks like, computed once and copied into records.
struct Target {
    mime: String,
    size: u64,
    read: bool,
    write: bool,
}

/// Builds [`FileNode`] and [`DirectoryNode`] records for one volume.
pub struct MetadataAssembler<'a> {
    pub fs: &'a dyn FileSystemAdapter,
    pub codec: &'a PathCodec,
    pub policy: &'a AccessPolicy,
    /// Name shown for the root (alias or root base name).
    pub display_root: &'a str,
    pub date_format: &'a str,
    pub url: Option<&'a Url>,
    pub params: &'a RootParams,
    /// Reference instant for `Today`/`Yesterday` bucketing.
    pub now: DateTime<Local>,
}

impl<'a> MetadataAssembler<'a> {
    /// Check if a path may be exposed: accepted by the policy and the
    /// backend, and every linked ancestor below the root resolves inside the
    /// volume.
    pub fn visible(&self, path: &Path) -> bool {
        self.physical(path).is_some()
    }

    /// Where the backend will actually find `path`: every linked ancestor
    /// below the root replaced by its resolved target.
    ///
    /// The final component is kept as is, even when it is a link. `None` if
    /// the path is not accepted or an ancestor is a broken link.
    pub fn physical(&self, path: &Path) -> Option<PathBuf> {
        let mut hops = 0;
        self.physical_with(path, &mut hops)
    }

    fn physical_with(&self, path: &Path, hops: &mut usize) -> Option<PathBuf> {
        if !self.policy.accepted(path) || !self.fs.accepted(path) {
            return None;
        }
        let root = self.policy.root();
        let rel = path.strip_prefix(root).ok()?;

        let mut current = root.to_path_buf();
        let mut components = rel.components().peekable();
        while let Some(component) = components.next() {
            current.push(component);
            if components.peek().is_some() && self.fs.is_link(&current) {
                // Later components hang off the target, not the link
                current = self.resolve_with(&current, hops)?;
            }
        }
        (self.policy.accepted(&current) && self.fs.accepted(&current)).then_some(current)
    }

    /// Follow a link to its final, existing, visible target.
    ///
    /// Returns `None` for dangling links, cycles, chains longer than
    /// [`MAX_LINK_HOPS`] and targets outside the volume. The target is
    /// returned as a physical path.
    pub fn resolve_link(&self, path: &Path) -> Option<PathBuf> {
        let mut hops = 0;
        let link = self.physical_with(path, &mut hops)?;
        self.resolve_with(&link, &mut hops)
    }

    /// `link` must already be physical, so that a relative target is read
    /// against the directory the backend really holds it in.
    fn resolve_with(&self, link: &Path, hops: &mut usize) -> Option<PathBuf> {
        let mut current = link.to_path_buf();
        loop {
            *hops += 1;
            if *hops > MAX_LINK_HOPS {
                return None;
            }
            let raw = self.fs.readlink(&current).ok()?;
            let target = self.physical_with(&raw, hops)?;
            if !self.fs.exists(&target) {
                return None;
            }
            if !self.fs.is_link(&target) {
                return Some(target);
            }
            current = target;
        }
    }

    fn target(&self, path: &Path) -> Target {
        let mime = self.fs.mimetype(path);
        let size = if mime == DIRECTORY_MIME {
            0
        } else {
            self.fs.size(path).unwrap_or(0)
        };
        Target {
            mime,
            size,
            read: self.policy.is_readable(self.fs, path),
            write: self.policy.is_writable(self.fs, path),
        }
    }

    /// Describe a node. The path must already be visible and exist.
    pub fn info(&self, path: &Path) -> FileNode {
        let name = if path == self.policy.root() {
            self.display_root.to_string()
        } else {
            self.fs.basename(path)
        };
        let ts = self.fs.mtime(path).map(unix_seconds).unwrap_or(0);

        let (target, link, link_to) = if self.fs.is_link(path) {
            match self.resolve_link(path) {
                Some(resolved) => (
                    self.target(&resolved),
                    Some(self.codec.encode(&resolved)),
                    Some(self.display_path(&resolved)),
                ),
                None => (
                    Target {
                        mime: BROKEN_LINK_MIME.to_string(),
                        size: 0,
                        read: false,
                        write: false,
                    },
                    None,
                    None,
                ),
            }
        } else {
            (self.target(path), None, None)
        };

        FileNode {
            name,
            hash: self.codec.encode(path),
            mime: target.mime,
            ts,
            date: format_date(ts, self.now, self.date_format),
            size: target.size,
            read: target.read,
            write: target.write,
            rm: self.policy.is_removable(self.fs, path),
            link,
            link_to,
        }
    }

    /// Physical path of the node a path designates, following a final link.
    pub fn effective(&self, path: &Path) -> Result<PathBuf> {
        if self.fs.is_link(path) {
            self.resolve_link(path).ok_or(StorageError::BrokenLink)
        } else {
            self.physical(path).ok_or(StorageError::NotFound)
        }
    }

    /// The readable directory a path designates, following links.
    pub fn directory(&self, path: &Path) -> Result<PathBuf> {
        let path = self.effective(path)?;
        if !self.policy.is_readable(self.fs, &path) {
            return Err(StorageError::AccessDenied);
        }
        if !self.fs.is_dir(&path) {
            return Err(StorageError::InvalidParameters);
        }
        Ok(path)
    }

    /// Describe a directory with its navigation context.
    ///
    /// Links are resolved and the record describes the target directory. The
    /// path must already be visible and exist.
    pub fn dir(&self, path: &Path) -> Result<DirectoryNode> {
        let path = self.directory(path)?;
        let root = self.policy.root();
        let phash = if path == root {
            None
        } else {
            self.fs.dirname(&path).map(|parent| self.codec.encode(&parent))
        };
        Ok(DirectoryNode {
            node: self.info(&path),
            phash,
            url: self.url_for(&path),
            rel: self.display_path(&path),
            params: self.params.clone(),
        })
    }

    /// Client display path: `/<alias>` followed by the root-relative path.
    pub fn display_path(&self, path: &Path) -> String {
        let rel = self
            .fs
            .rel_path(self.policy.root(), path)
            .unwrap_or_else(|| self.fs.basename(path));
        if rel.is_empty() {
            format!("/{}", self.display_root)
        } else {
            format!("/{}/{}", self.display_root, rel)
        }
    }

    fn url_for(&self, path: &Path) -> String {
        let Some(base) = self.url else {
            return String::new();
        };
        self.fs
            .rel_path(self.policy.root(), path)
            .and_then(|rel| self.fs.path_to_url(base, &rel, true))
            .unwrap_or_default()
    }
}

/// Seconds since the Unix epoch, negative before it.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Render a timestamp relative to `now`.
///
/// Times on the local calendar day of `now` (or later) render as
/// `Today HH:MM`, the day before as `Yesterday HH:MM`, anything older with
/// `template`. An unusable template falls back to [`DEFAULT_DATE_FORMAT`].
pub fn format_date(ts: i64, now: DateTime<Local>, template: &str) -> String {
    let Some(time) = Local.timestamp_opt(ts, 0).earliest() else {
        return String::new();
    };
    let today = now.date_naive();
    let day = time.date_naive();

    if day >= today {
        return format!("Today {}", time.format("%H:%M"));
    }
    if today.pred_opt() == Some(day) {
        return format!("Yesterday {}", time.format("%H:%M"));
    }

    let mut out = String::new();
    if write!(out, "{}", time.format(template)).is_err() {
        out.clear();
        let _ = write!(out, "{}", time.format(DEFAULT_DATE_FORMAT));
    }
    out
}

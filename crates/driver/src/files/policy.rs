//! Volume access policy.
//!
//! Combines lexical root containment, name exclusion patterns, native
//! permission bits reported by the backend, and the declarative restrictions
//! from configuration (disabled operations, read-only volumes, upload MIME
//! filters). Every driver operation passes through [`AccessPolicy::accepted`]
//! before the backend is touched.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use protocol::UploadOrder;
use regex::Regex;

use super::adapter::FileSystemAdapter;

/// Operation names that can be listed in a volume's `disabled` setting.
pub mod ops {
    pub const MKDIR: &str = "mkdir";
    pub const MKFILE: &str = "mkfile";
    /// Also makes every node unremovable.
    pub const RM: &str = "rm";
    pub const PUT: &str = "put";
    pub const COPY: &str = "copy";
    /// Also rejects every MIME type.
    pub const UPLOAD: &str = "upload";
    pub const OPEN: &str = "open";
    pub const GET: &str = "get";
}

/// Upload MIME filter built from the allow and deny lists.
#[derive(Debug, Clone, Default)]
pub struct UploadFilter {
    allow: Vec<String>,
    deny: Vec<String>,
    order: UploadOrder,
}

impl UploadFilter {
    /// Create a filter from configured lists.
    pub fn new(allow: Vec<String>, deny: Vec<String>, order: UploadOrder) -> Self {
        Self { allow, deny, order }
    }

    /// Check if a MIME type may be uploaded.
    ///
    /// `deny,allow` lets an explicit allow entry override a broader deny;
    /// `allow,deny` lets deny win on overlap. A type on neither list is allowed.
    pub fn allows(&self, mime: &str) -> bool {
        let allowed = self.allow.iter().any(|p| mime_matches(p, mime));
        let denied = self.deny.iter().any(|p| mime_matches(p, mime));
        match self.order {
            UploadOrder::DenyAllow => allowed || !denied,
            UploadOrder::AllowDeny => !denied,
        }
    }
}

/// Match a filter entry against a MIME type.
///
/// Entries are `all`/`*` (everything), `type/*` or a bare `type` (every
/// subtype), or an exact `type/subtype`. Comparison ignores case.
pub fn mime_matches(pattern: &str, mime: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime = mime.trim().to_ascii_lowercase();
    let major = mime.split('/').next().unwrap_or_default();

    if matches!(pattern.as_str(), "all" | "*" | "*/*") {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return major == prefix;
    }
    if !pattern.contains('/') {
        return major == pattern;
    }
    pattern == mime
}

/// Access rules for one volume.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    /// Normalized absolute volume root.
    root: PathBuf,
    /// Whether the root was readable when the driver was built.
    root_readable: bool,
    /// Force every node unwritable.
    read_only: bool,
    /// Disabled operation names.
    disabled: Vec<String>,
    /// Upload MIME filter.
    upload: UploadFilter,
    /// Name patterns hidden from clients.
    exclude: Vec<Regex>,
}

impl AccessPolicy {
    /// Create a policy for `root` with no restrictions beyond containment.
    pub fn new(root: impl Into<PathBuf>, root_readable: bool) -> Self {
        Self {
            root: root.into(),
            root_readable,
            read_only: false,
            disabled: Vec::new(),
            upload: UploadFilter::default(),
            exclude: Vec::new(),
        }
    }

    /// Set the disabled operation names.
    pub fn with_disabled(mut self, disabled: Vec<String>) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set the upload filter.
    pub fn with_upload_filter(mut self, upload: UploadFilter) -> Self {
        self.upload = upload;
        self
    }

    /// Set the exclusion patterns.
    pub fn with_exclusions(mut self, exclude: Vec<Regex>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Force every node unwritable and unremovable.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Compile exclusion pattern strings.
    pub fn compile_exclusions(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
        patterns.iter().map(|p| Regex::new(p)).collect()
    }

    /// The volume root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a path may be seen at all.
    ///
    /// The path must be absolute, free of `.`/`..` components, equal to or
    /// beneath the root (component-wise), and no component below the root may
    /// match an exclusion pattern.
    pub fn accepted(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return false;
        }
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        rel.components().all(|c| match c {
            Component::Normal(name) => !self.is_excluded(name),
            _ => false,
        })
    }

    fn is_excluded(&self, name: &OsStr) -> bool {
        match name.to_str() {
            Some(name) => self.exclude.iter().any(|re| re.is_match(name)),
            None => true,
        }
    }

    /// Check if an operation is disabled on this volume.
    pub fn is_disabled(&self, operation: &str) -> bool {
        self.disabled
            .iter()
            .any(|d| d.eq_ignore_ascii_case(operation))
    }

    /// Disabled operation names, as configured.
    pub fn disabled(&self) -> &[String] {
        &self.disabled
    }

    /// Readable if natively readable and the root itself was readable.
    pub fn is_readable(&self, fs: &dyn FileSystemAdapter, path: &Path) -> bool {
        self.root_readable && fs.is_readable(path)
    }

    /// Writable if natively writable and the volume is not read-only.
    pub fn is_writable(&self, fs: &dyn FileSystemAdapter, path: &Path) -> bool {
        !self.read_only && fs.is_writable(path)
    }

    /// Removable if natively removable, not the root, and removal is allowed.
    pub fn is_removable(&self, fs: &dyn FileSystemAdapter, path: &Path) -> bool {
        path != self.root
            && !self.read_only
            && !self.is_disabled(ops::RM)
            && fs.is_removable(path)
    }

    /// Check if a MIME type may be uploaded to this volume.
    pub fn is_upload_allowed(&self, mime: &str) -> bool {
        !self.is_disabled(ops::UPLOAD) && self.upload.allows(mime)
    }
}

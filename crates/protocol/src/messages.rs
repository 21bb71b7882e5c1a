//! Record definitions shared between storage drivers and listing clients.
//!
//! Every record here is produced by a driver and consumed verbatim by a
//! client. Field names follow the client wire contract (`linkTo`, `phash`,
//! `copyFrom`, ...), so renames are explicit on every struct.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// MIME type reported for directories.
pub const DIRECTORY_MIME: &str = "directory";

/// MIME type reported for symbolic links whose target cannot be resolved.
pub const BROKEN_LINK_MIME: &str = "symlink-broken";

// ============================================================================
// Node Records
// ============================================================================

/// Descriptor of a single file, directory or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Display name (the volume alias for the root).
    pub name: String,
    /// Opaque hash identifying this node.
    pub hash: String,
    /// MIME type, `directory`, or `symlink-broken`.
    pub mime: String,
    /// Last modified timestamp (Unix epoch seconds).
    pub ts: i64,
    /// Pre-rendered modification date.
    pub date: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the node can be read.
    pub read: bool,
    /// Whether the node can be written.
    pub write: bool,
    /// Whether the node can be removed.
    pub rm: bool,
    /// Hash of the symlink target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Display path of the symlink target.
    #[serde(rename = "linkTo", default, skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
}

impl FileNode {
    /// Check if this node describes a directory.
    pub fn is_dir(&self) -> bool {
        self.mime == DIRECTORY_MIME
    }

    /// Check if this node describes a link with an unresolvable target.
    pub fn is_broken_link(&self) -> bool {
        self.mime == BROKEN_LINK_MIME
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Descriptor of a directory with its navigation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// The plain node fields.
    #[serde(flatten)]
    pub node: FileNode,
    /// Hash of the parent directory, absent for the volume root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    /// Externally reachable URL, empty when the volume has no base URL.
    pub url: String,
    /// Display path relative to the volume, starting with `/<alias>`.
    pub rel: String,
    /// Volume-scoped client options.
    pub params: RootParams,
}

impl DirectoryNode {
    /// Check if this directory is a volume root.
    pub fn is_root(&self) -> bool {
        self.phash.is_none()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options a client needs to drive a volume (disabled commands, copy ability, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RootParams {
    /// Operation names disabled on this volume.
    pub disabled: Vec<String>,
    /// Whether files may be copied out of this volume.
    pub copy_from: bool,
    /// Whether files may be copied into this volume.
    pub copy_to: bool,
    /// Base URL for thumbnails, empty when unset.
    pub tmb_url: String,
    /// Number of sub-directory levels returned by tree requests.
    pub tree_deep: u32,
    /// MIME types explicitly allowed for upload.
    pub upload_allow: Vec<String>,
    /// MIME types explicitly denied for upload.
    pub upload_deny: Vec<String>,
    /// Evaluation order of the upload lists.
    pub upload_order: UploadOrder,
}

/// A directory together with its sorted contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// The listed directory.
    pub cwd: DirectoryNode,
    /// Its accepted children.
    pub files: Vec<FileNode>,
}

// ============================================================================
// Client-Visible Enums
// ============================================================================

/// Sort order for directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// By name, directories first.
    #[default]
    NameDirsFirst,
    /// By MIME type, directories first.
    KindDirsFirst,
    /// By size, directories first.
    SizeDirsFirst,
    /// By name only.
    Name,
    /// By MIME type only.
    Kind,
    /// By size only.
    Size,
}

impl SortKey {
    /// All sort keys in their conventional numbering order.
    pub const ALL: [SortKey; 6] = [
        SortKey::NameDirsFirst,
        SortKey::KindDirsFirst,
        SortKey::SizeDirsFirst,
        SortKey::Name,
        SortKey::Kind,
        SortKey::Size,
    ];

    /// Check if directories sort before files under this key.
    pub fn dirs_first(self) -> bool {
        matches!(
            self,
            SortKey::NameDirsFirst | SortKey::KindDirsFirst | SortKey::SizeDirsFirst
        )
    }

    /// Check if MIME type is a sort criterion.
    pub fn by_kind(self) -> bool {
        matches!(self, SortKey::KindDirsFirst | SortKey::Kind)
    }

    /// Check if size is a sort criterion.
    pub fn by_size(self) -> bool {
        matches!(self, SortKey::SizeDirsFirst | SortKey::Size)
    }

    /// Wire name of this key.
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::NameDirsFirst => "name-dirs-first",
            SortKey::KindDirsFirst => "kind-dirs-first",
            SortKey::SizeDirsFirst => "size-dirs-first",
            SortKey::Name => "name",
            SortKey::Kind => "kind",
            SortKey::Size => "size",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        SortKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownSortKey(s.to_string()))
    }
}

/// Evaluation order of the upload allow and deny lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UploadOrder {
    /// Deny list first; an explicit allow entry overrides a broader deny.
    #[default]
    #[serde(rename = "deny,allow")]
    DenyAllow,
    /// Allow list first; deny wins on overlap.
    #[serde(rename = "allow,deny")]
    AllowDeny,
}

impl UploadOrder {
    /// Wire name of this order.
    pub fn as_str(self) -> &'static str {
        match self {
            UploadOrder::DenyAllow => "deny,allow",
            UploadOrder::AllowDeny => "allow,deny",
        }
    }
}

impl fmt::Display for UploadOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadOrder {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match normalized.to_ascii_lowercase().as_str() {
            "deny,allow" => Ok(UploadOrder::DenyAllow),
            "allow,deny" => Ok(UploadOrder::AllowDeny),
            _ => Err(ProtocolError::UnknownUploadOrder(s.to_string())),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error record returned to clients in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorMessage {
    /// Create an error record using the kind's default message.
    pub fn new(code: ErrorKind) -> Self {
        Self {
            code,
            message: code.message().to_string(),
        }
    }
}

/// Failure kinds a storage operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The hash does not name an accepted, existing node.
    NotFound,
    /// The node exists but fails a permission check.
    AccessDenied,
    /// A symbolic link target cannot be resolved.
    BrokenLink,
    /// The node has the wrong kind for the operation.
    InvalidParameters,
    /// The volume failed its construction-time validation.
    Unavailable,
    /// The target of a create or copy already exists.
    AlreadyExists,
    /// The backend failed while performing I/O.
    Io,
}

impl ErrorKind {
    /// Default client-facing message for this kind.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "File not found",
            ErrorKind::AccessDenied => "Access denied",
            ErrorKind::BrokenLink => "Broken link",
            ErrorKind::InvalidParameters => "Invalid parameters",
            ErrorKind::Unavailable => "Storage unavailable",
            ErrorKind::AlreadyExists => "File already exists",
            ErrorKind::Io => "Storage backend error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node() -> FileNode {
        FileNode {
            name: "report.pdf".to_string(),
            hash: "l1_ZG9jcy9yZXBvcnQucGRm".to_string(),
            mime: "application/pdf".to_string(),
            ts: 1704067200,
            date: "1 Jan 2024 00:00".to_string(),
            size: 2048,
            read: true,
            write: true,
            rm: false,
            link: None,
            link_to: None,
        }
    }

    #[test]
    fn test_file_node_wire_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&sample_node().to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "report.pdf");
        assert_eq!(json["mime"], "application/pdf");
        assert_eq!(json["size"], 2048);
        assert_eq!(json["read"], true);
        assert_eq!(json["rm"], false);
        // Optional link fields are omitted entirely
        assert!(json.get("link").is_none());
        assert!(json.get("linkTo").is_none());
    }

    #[test]
    fn test_file_node_link_fields_renamed() {
        let mut node = sample_node();
        node.link = Some("l1_dGFyZ2V0".to_string());
        node.link_to = Some("/Files/target".to_string());

        let json: serde_json::Value = serde_json::from_str(&node.to_json().unwrap()).unwrap();
        assert_eq!(json["link"], "l1_dGFyZ2V0");
        assert_eq!(json["linkTo"], "/Files/target");

        let restored = FileNode::from_json(&node.to_json().unwrap()).unwrap();
        assert_eq!(restored, node);
    }

    #[test]
    fn test_directory_node_flattens_and_omits_root_phash() {
        let mut node = sample_node();
        node.mime = DIRECTORY_MIME.to_string();
        node.size = 0;
        let dir = DirectoryNode {
            node,
            phash: None,
            url: String::new(),
            rel: "/Files".to_string(),
            params: RootParams {
                disabled: vec!["rm".to_string()],
                copy_from: true,
                copy_to: false,
                tree_deep: 1,
                ..Default::default()
            },
        };

        assert!(dir.is_root());
        assert!(dir.node.is_dir());

        let json: serde_json::Value = serde_json::from_str(&dir.to_json().unwrap()).unwrap();
        assert_eq!(json["mime"], "directory");
        assert_eq!(json["rel"], "/Files");
        assert!(json.get("phash").is_none());
        assert_eq!(json["params"]["copyFrom"], true);
        assert_eq!(json["params"]["copyTo"], false);
        assert_eq!(json["params"]["treeDeep"], 1);
        assert_eq!(json["params"]["uploadOrder"], "deny,allow");
    }

    #[test]
    fn test_sort_key_parse_and_display() {
        for key in SortKey::ALL {
            assert_eq!(key.as_str().parse::<SortKey>().unwrap(), key);
            assert_eq!(key.to_string(), key.as_str());
        }
        assert!(matches!(
            "by-colour".parse::<SortKey>(),
            Err(ProtocolError::UnknownSortKey(_))
        ));
    }

    #[test]
    fn test_sort_key_flags() {
        assert!(SortKey::NameDirsFirst.dirs_first());
        assert!(SortKey::SizeDirsFirst.by_size());
        assert!(SortKey::Kind.by_kind());
        assert!(!SortKey::Kind.dirs_first());
        assert!(!SortKey::Name.by_kind());
        assert!(!SortKey::Name.by_size());
    }

    #[test]
    fn test_sort_key_serde_names() {
        let json = serde_json::to_string(&SortKey::KindDirsFirst).unwrap();
        assert_eq!(json, "\"kind-dirs-first\"");
    }

    #[test]
    fn test_upload_order_parse() {
        assert_eq!("deny,allow".parse::<UploadOrder>().unwrap(), UploadOrder::DenyAllow);
        assert_eq!("Allow, Deny".parse::<UploadOrder>().unwrap(), UploadOrder::AllowDeny);
        assert!("allow".parse::<UploadOrder>().is_err());
        assert_eq!(UploadOrder::default(), UploadOrder::DenyAllow);
    }

    #[test]
    fn test_upload_order_serde_names() {
        let json = serde_json::to_string(&UploadOrder::AllowDeny).unwrap();
        assert_eq!(json, "\"allow,deny\"");
        let order: UploadOrder = serde_json::from_str("\"deny,allow\"").unwrap();
        assert_eq!(order, UploadOrder::DenyAllow);
    }

    #[test]
    fn test_error_message_defaults() {
        let err = ErrorMessage::new(ErrorKind::BrokenLink);
        assert_eq!(err.message, "Broken link");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"broken_link\""));
        assert_eq!(ErrorKind::NotFound.to_string(), "File not found");
    }
}

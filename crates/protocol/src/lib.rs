//! # Volume Protocol Library
//!
//! Records and enums exchanged between volume storage drivers and the
//! listing clients that consume them.
//!
//! ## Overview
//!
//! - **Node Records**: [`FileNode`] and [`DirectoryNode`], the descriptors a
//!   driver returns for every file and directory
//! - **Client Options**: [`RootParams`], the volume-scoped settings sent along
//!   with directory records
//! - **Enums**: [`SortKey`], [`UploadOrder`] and [`ErrorKind`]
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{SortKey, UploadOrder};
//!
//! let key: SortKey = "size-dirs-first".parse().unwrap();
//! assert!(key.dirs_first());
//!
//! let order: UploadOrder = "allow,deny".parse().unwrap();
//! assert_eq!(order.to_string(), "allow,deny");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Record and enum definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    DirectoryNode, ErrorKind, ErrorMessage, FileNode, Listing, RootParams, SortKey, UploadOrder,
    BROKEN_LINK_MIME, DIRECTORY_MIME,
};

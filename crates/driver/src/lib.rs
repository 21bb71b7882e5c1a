//! # Volume Driver Library
//!
//! Exposes directories as sandboxed volumes: clients address files by opaque
//! hashes, and every request is checked against the volume root, its
//! exclusion patterns and its configured permissions before the storage
//! backend is touched.
//!
//! ## Overview
//!
//! - **Storage Drivers**: One [`StorageDriver`] per volume, built over any
//!   [`FileSystemAdapter`] backend
//! - **Backends**: Local disk and an in-memory tree
//! - **Records**: File and directory descriptors ready for listing clients
//! - **Registry**: Several volumes side by side, hashes routed by storage id
//! - **Configuration**: TOML volumes file with environment overrides
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Volumes                         │
//! ├────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────────┐  │
//! │  │                 StorageDriver                    │  │
//! │  │  PathCodec → AccessPolicy → MetadataAssembler    │  │
//! │  └──────────────────────────────────────────────────┘  │
//! │  ┌──────────────────────┐  ┌────────────────────────┐  │
//! │  │   LocalFileSystem    │  │   MemoryFileSystem     │  │
//! │  └──────────────────────┘  └────────────────────────┘  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use driver::config::StorageConfig;
//! use driver::files::{MemoryFileSystem, StorageDriver};
//! use protocol::SortKey;
//!
//! let fs = MemoryFileSystem::new("/srv");
//! fs.add_file("/srv/readme.txt", b"hello").unwrap();
//!
//! let volume = StorageDriver::new(
//!     StorageConfig::memory("m1", "/srv"),
//!     Box::new(fs),
//! )
//! .unwrap();
//!
//! let root = volume.root().unwrap();
//! let files = volume.ls(&root, SortKey::NameDirsFirst).unwrap();
//! assert_eq!(files[0].name, "readme.txt");
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Storage error type
//! - [`files`]: Drivers, backends, hashing, policy and records
//! - [`volumes`]: Multi-volume registry

pub mod config;
pub mod error;
pub mod files;
pub mod volumes;

pub use config::{Config, StorageConfig};
pub use error::StorageError;
pub use files::{FileSystemAdapter, StorageDriver};
pub use volumes::{VolumeError, Volumes};

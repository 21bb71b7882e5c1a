//! Storage drivers over pluggable backends.
//!
//! This module provides the pieces a volume is built from:
//! - Backend adapters ([`LocalFileSystem`], [`MemoryFileSystem`]) behind the
//!   [`FileSystemAdapter`] contract
//! - Reversible path hashing scoped to a storage id
//! - Access policy combining native permissions with configured restrictions
//! - Node and directory records, and their listing order
//!
//! # Security
//!
//! Clients only ever see hashes. A hash is decoded, checked for root
//! containment and exclusion patterns, and every symlink on the way is
//! resolved inside the volume before any backend call is made. Links that
//! point anywhere else are reported as broken and never followed.

pub mod adapter;
pub mod codec;
pub mod driver;
pub mod local;
pub mod memory;
pub mod metadata;
pub mod mime;
pub mod policy;
pub mod sort;

pub use adapter::{FileHandle, FileSystemAdapter, OpenMode};
pub use codec::PathCodec;
pub use driver::StorageDriver;
pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;
pub use metadata::MetadataAssembler;
pub use policy::{AccessPolicy, UploadFilter};
pub use sort::{compare, sort_nodes};

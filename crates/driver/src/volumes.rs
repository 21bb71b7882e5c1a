//! Registry of mounted volumes.
//!
//! Several drivers can be mounted side by side. Hashes carry their storage id
//! as a prefix, so the registry routes every request to the driver that
//! minted the hash.

use protocol::DirectoryNode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, ConfigError};
use crate::error::StorageError;
use crate::files::codec::storage_id_of;
use crate::files::StorageDriver;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Two volumes claim the same storage id.
    #[error("volume id {0} is already mounted")]
    DuplicateId(String),

    /// No mounted volume owns this hash.
    #[error("no volume for hash {0:?}")]
    UnknownVolume(String),

    /// A volume failed configuration validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The owning volume rejected the operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, VolumeError>;

/// Mounted volumes, in mount order.
#[derive(Debug, Default)]
pub struct Volumes {
    drivers: Vec<StorageDriver>,
}

impl Volumes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount every volume of a configuration.
    ///
    /// Volumes whose root is unavailable are still mounted; they answer every
    /// call with `Unavailable`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut volumes = Self::new();
        for storage in &config.volumes {
            let driver = StorageDriver::from_config(storage.clone())?;
            if !driver.available() {
                warn!(volume = %storage.id, "Volume mounted but unavailable");
            }
            volumes.mount(driver)?;
        }
        Ok(volumes)
    }

    /// Add a driver to the registry.
    pub fn mount(&mut self, driver: StorageDriver) -> Result<()> {
        if self.get(driver.id()).is_some() {
            return Err(VolumeError::DuplicateId(driver.id().to_string()));
        }
        self.drivers.push(driver);
        Ok(())
    }

    /// Driver with the given storage id.
    pub fn get(&self, id: &str) -> Option<&StorageDriver> {
        self.drivers.iter().find(|d| d.id() == id)
    }

    /// Driver that minted `hash`.
    pub fn driver_for(&self, hash: &str) -> Result<&StorageDriver> {
        storage_id_of(hash)
            .and_then(|id| self.get(id))
            .ok_or_else(|| {
                debug!(hash, "Hash does not belong to any mounted volume");
                VolumeError::UnknownVolume(hash.to_string())
            })
    }

    /// Mounted drivers, in mount order.
    pub fn iter(&self) -> impl Iterator<Item = &StorageDriver> {
        self.drivers.iter()
    }

    /// Number of mounted volumes.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Check if no volume is mounted.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Root records of every available volume.
    pub fn roots(&self) -> Vec<DirectoryNode> {
        self.drivers
            .iter()
            .filter(|d| d.available())
            .filter_map(|d| d.root().and_then(|hash| d.dir(&hash)).ok())
            .collect()
    }

    /// Copy a node into a directory, possibly on another volume.
    ///
    /// Within one volume this is a recursive copy. Between volumes only files
    /// are copied; the source must allow `copy_from` and the destination
    /// `copy_to`.
    pub fn copy(&self, src: &str, dst_dir: &str) -> Result<protocol::FileNode> {
        let source = self.driver_for(src)?;
        let target = self.driver_for(dst_dir)?;
        if source.id() == target.id() {
            return Ok(source.copy(src, dst_dir)?);
        }

        if !source.params().copy_from || !target.params().copy_to {
            return Err(StorageError::AccessDenied.into());
        }
        if !source.is_file(src)? {
            return Err(StorageError::InvalidParameters.into());
        }
        let name = source.info(src)?.name;

        let mut handle = source.open(src)?;
        let stored = target.store(dst_dir, &name, &mut handle);
        source.close(handle)?;
        let node = stored?;
        debug!(from = source.id(), to = target.id(), name = %name, "Copied across volumes");
        Ok(node)
    }
}

use std::path::Path;

use log::info;

use super::entry::{DirHandle, DirRecord, Tree};
use super::fat::{FatFs, VolumeIdentity};
use super::fdpool::DescriptorPool;
use super::import::import_tree;
use crate::config::FatblockConfig;
use crate::error::{FatblockError, Result};

/// A synthesized read-only FAT32 volume.
///
/// Built once by [`Volume::import`] and immutable afterwards apart from the
/// descriptor cache used by [`Volume::read`]. Callers serving reads from
/// several threads must serialize access themselves.
pub struct Volume {
    pub(crate) fs: FatFs,
    pub(crate) tree: Tree,
    pub(crate) pool: DescriptorPool,
    root: DirHandle,
}

impl Volume {
    /// Import `root` into a volume with a data region of `size_mb` MiB.
    pub fn import(root: &Path, size_mb: u64, config: &FatblockConfig) -> Result<Self> {
        let data_size = size_mb.checked_mul(1 << 20).ok_or_else(|| {
            FatblockError::InvalidGeometry(format!("{size_mb} MiB is too large"))
        })?;
        Self::import_with_data_size(root, data_size, config)
    }

    /// Import `root` into a volume with a data region of `data_size` bytes.
    pub fn import_with_data_size(
        root: &Path,
        data_size: u64,
        config: &FatblockConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut fs = FatFs::new(config.cluster_size, data_size)?;
        fs.set_identity(VolumeIdentity {
            oem_name: config.oem_bytes(),
            label: config.label_bytes(),
            volume_id: config.volume_id,
        });

        let mut tree = Tree::new();
        let root_dir = import_tree(&mut fs, &mut tree, root)?;
        info!(
            "volume ready: {} bytes, root directory at cluster {}",
            fs.total_size(),
            root_dir.first_cluster
        );

        Ok(Self {
            fs,
            tree,
            pool: DescriptorPool::new(config.descriptor_cache_size),
            root: root_dir.handle,
        })
    }

    /// Total volume length in bytes.
    pub fn size(&self) -> u64 {
        self.fs.total_size()
    }

    /// Writes are always rejected.
    pub fn write(&mut self, _buf: &[u8], _offset: u64) -> Result<()> {
        Err(FatblockError::ReadOnly)
    }

    pub fn fs(&self) -> &FatFs {
        &self.fs
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> &DirRecord {
        self.tree.dir(self.root)
    }

    /// Number of backing files currently held open.
    pub fn open_descriptors(&self) -> usize {
        self.pool.len()
    }
}

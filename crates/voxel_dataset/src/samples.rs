//! `VoxelSamples`: ordered shape collection backed by one shard.

use crate::shard::{check_against_manifest, ShardBuffer};
use crate::types::{
    DatasetResult, ShapePoints, StoreMode, VoxelDatasetError, VoxelGrid, VoxelManifest,
    MANIFEST_FILE, POINT_STRIDE,
};
use std::path::{Path, PathBuf};

#[cfg(feature = "burn-runtime")]
use burn::tensor::{backend::Backend, Tensor, TensorData};

pub struct VoxelSamples {
    root: PathBuf,
    manifest: VoxelManifest,
    shard: ShardBuffer,
}

impl std::fmt::Debug for VoxelSamples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelSamples")
            .field("root", &self.root)
            .field("shapes", &self.manifest.names.len())
            .field("voxel_resolution", &self.manifest.voxel_resolution)
            .field("points_per_shape", &self.manifest.points_per_shape)
            .finish()
    }
}

impl VoxelSamples {
    pub fn open(root: impl AsRef<Path>) -> DatasetResult<Self> {
        Self::open_with_mode(root, StoreMode::from_env())
    }

    pub fn open_with_mode(root: impl AsRef<Path>, mode: StoreMode) -> DatasetResult<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest = VoxelManifest::load(&root.join(MANIFEST_FILE))?;
        let shard_path = root.join(&manifest.shard);
        let shard = match mode {
            StoreMode::InMemory => ShardBuffer::load_owned(&shard_path)?,
            StoreMode::Mmap => ShardBuffer::load_mmap(&shard_path)?,
        };
        check_against_manifest(&shard.header, &manifest, &shard_path)?;
        tracing::info!(
            root = %root.display(),
            shapes = shard.shapes(),
            resolution = manifest.voxel_resolution,
            ?mode,
            "opened voxel dataset"
        );
        Ok(Self {
            root,
            manifest,
            shard,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.manifest.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.manifest.names
    }

    pub fn voxel_resolution(&self) -> usize {
        self.manifest.voxel_resolution
    }

    pub fn points_per_shape(&self) -> usize {
        self.manifest.points_per_shape
    }

    pub fn name(&self, index: usize) -> DatasetResult<&str> {
        self.check_index(index)?;
        Ok(&self.manifest.names[index])
    }

    /// First index whose name equals `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.manifest.names.iter().position(|n| n == name)
    }

    pub fn points(&self, index: usize) -> DatasetResult<ShapePoints> {
        self.check_index(index)?;
        let values = self.shard.points(index);
        let count = values.len() / POINT_STRIDE;
        Ok(ShapePoints { values, count })
    }

    pub fn voxels(&self, index: usize) -> DatasetResult<VoxelGrid> {
        self.check_index(index)?;
        Ok(VoxelGrid {
            values: self.shard.voxels(index),
            resolution: self.manifest.voxel_resolution,
        })
    }

    /// Sample points as `[1, N, 4]`.
    #[cfg(feature = "burn-runtime")]
    pub fn points_tensor<B: Backend>(
        &self,
        index: usize,
        device: &B::Device,
    ) -> DatasetResult<Tensor<B, 3>> {
        let points = self.points(index)?;
        Ok(Tensor::<B, 3>::from_data(
            TensorData::new(points.values, [1, points.count, POINT_STRIDE]),
            device,
        ))
    }

    /// Flattened voxel grid as `[1, R³]`.
    #[cfg(feature = "burn-runtime")]
    pub fn voxels_tensor<B: Backend>(
        &self,
        index: usize,
        device: &B::Device,
    ) -> DatasetResult<Tensor<B, 2>> {
        let grid = self.voxels(index)?;
        let len = grid.values.len();
        Ok(Tensor::<B, 2>::from_data(
            TensorData::new(grid.values, [1, len]),
            device,
        ))
    }

    fn check_index(&self, index: usize) -> DatasetResult<()> {
        if index >= self.len() {
            return Err(VoxelDatasetError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }
}

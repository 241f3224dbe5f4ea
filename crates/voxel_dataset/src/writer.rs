//! Builds a data source directory (manifest + shard) from in-memory shapes.

use crate::shard::{ShardHeader, SHARD_VERSION};
use crate::types::{
    DatasetResult, Endianness, ShardDType, VoxelDatasetError, VoxelManifest, MANIFEST_FILE,
    POINT_STRIDE,
};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_SHARD_NAME: &str = "shapes.vox";

#[derive(Debug, Clone)]
pub struct VoxelShardWriter {
    voxel_resolution: usize,
    points_per_shape: usize,
    names: Vec<String>,
    points: Vec<f32>,
    voxels: Vec<f32>,
}

impl VoxelShardWriter {
    pub fn new(voxel_resolution: usize, points_per_shape: usize) -> Self {
        Self {
            voxel_resolution,
            points_per_shape,
            names: Vec::new(),
            points: Vec::new(),
            voxels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Append one shape. `points` is `[points_per_shape, 4]`, `voxels` is `resolution³`.
    pub fn push(&mut self, name: &str, points: &[f32], voxels: &[f32]) -> DatasetResult<()> {
        let expected_points = self.points_per_shape * POINT_STRIDE;
        if points.len() != expected_points {
            return Err(VoxelDatasetError::Mismatch(format!(
                "shape {name}: {} point floats, expected {expected_points}",
                points.len()
            )));
        }
        let expected_voxels = self.voxel_resolution.pow(3);
        if voxels.len() != expected_voxels {
            return Err(VoxelDatasetError::Mismatch(format!(
                "shape {name}: {} voxels, expected {expected_voxels}",
                voxels.len()
            )));
        }
        self.names.push(name.to_string());
        self.points.extend_from_slice(points);
        self.voxels.extend_from_slice(voxels);
        Ok(())
    }

    /// Write the shard and manifest under `root`, returning the manifest.
    pub fn finish(self, root: &Path) -> DatasetResult<VoxelManifest> {
        fs::create_dir_all(root).map_err(|e| VoxelDatasetError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let shard_path = root.join(DEFAULT_SHARD_NAME);
        let header = ShardHeader::new(self.voxel_resolution, self.points_per_shape, self.len());

        let io_err = |e: std::io::Error| VoxelDatasetError::Io {
            path: shard_path.clone(),
            source: e,
        };
        let mut out = BufWriter::new(File::create(&shard_path).map_err(io_err)?);
        out.write_all(&header.encode()).map_err(io_err)?;
        for v in self.points.iter().chain(self.voxels.iter()) {
            out.write_all(&v.to_le_bytes()).map_err(io_err)?;
        }
        out.flush().map_err(io_err)?;

        let manifest = VoxelManifest {
            version: SHARD_VERSION,
            names: self.names,
            voxel_resolution: self.voxel_resolution,
            points_per_shape: self.points_per_shape,
            shard: DEFAULT_SHARD_NAME.to_string(),
            dtype: ShardDType::F32,
            endianness: Endianness::Little,
        };
        manifest.save(&root.join(MANIFEST_FILE))?;
        tracing::debug!(
            shapes = manifest.names.len(),
            root = %root.display(),
            "wrote voxel shard"
        );
        Ok(manifest)
    }
}

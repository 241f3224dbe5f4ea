//! Core types, error definitions, and the manifest for voxel_dataset.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type DatasetResult<T> = Result<T, VoxelDatasetError>;

/// Floats stored per sample point: x, y, z, occupancy.
pub const POINT_STRIDE: usize = 4;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum VoxelDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("bad magic in shard {path}")]
    BadMagic { path: PathBuf },
    #[error("shard version mismatch in {path}: {found} vs {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("shard {path} truncated")]
    Truncated { path: PathBuf },
    #[error("manifest/shard mismatch: {0}")]
    Mismatch(String),
    #[error("shape index {index} out of range for {len} shapes")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardDType {
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMode {
    /// Whole shard decoded into memory on open.
    InMemory,
    /// Shard memory-mapped; samples decoded on access.
    Mmap,
}

impl StoreMode {
    pub fn from_env() -> Self {
        match std::env::var("VOXEL_STORE_MODE").as_deref() {
            Ok("mmap") => StoreMode::Mmap,
            _ => StoreMode::InMemory,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxelManifest {
    pub version: u32,
    /// Shape names in dataset order; the position is the shape index.
    pub names: Vec<String>,
    pub voxel_resolution: usize,
    pub points_per_shape: usize,
    /// Shard path relative to the data source root (UTF-8).
    pub shard: String,
    pub dtype: ShardDType,
    pub endianness: Endianness,
}

impl VoxelManifest {
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| VoxelDatasetError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| VoxelDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| VoxelDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|e| VoxelDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&raw).map_err(|e| VoxelDatasetError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Occupancy samples of one shape, row-major `[count, 4]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePoints {
    pub values: Vec<f32>,
    pub count: usize,
}

impl ShapePoints {
    pub fn xyz(&self, i: usize) -> [f32; 3] {
        let base = i * POINT_STRIDE;
        [self.values[base], self.values[base + 1], self.values[base + 2]]
    }

    pub fn occupancy(&self, i: usize) -> f32 {
        self.values[i * POINT_STRIDE + 3]
    }
}

/// Dense occupancy grid of one shape, `resolution³` values in x-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    pub values: Vec<f32>,
    pub resolution: usize,
}

impl VoxelGrid {
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        let r = self.resolution;
        self.values[(x * r + y) * r + z]
    }

    pub fn occupied(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.5).count()
    }
}

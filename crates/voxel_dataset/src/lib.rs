//! Voxel occupancy dataset for the shape autoencoder tools.
//!
//! A data source directory holds a `manifest.json` (shape names and grid
//! dimensions) and a single binary shard with every shape's occupancy sample
//! points followed by every shape's voxel grid. `VoxelSamples` opens it either
//! fully in memory or memory-mapped and hands out per-shape slices or Burn
//! tensors with a leading batch dimension of one.

pub mod samples;
pub mod shard;
pub mod types;
pub mod writer;

pub use samples::VoxelSamples;
pub use shard::{SHARD_HEADER_LEN, SHARD_MAGIC, SHARD_VERSION};
pub use types::*;
pub use writer::VoxelShardWriter;

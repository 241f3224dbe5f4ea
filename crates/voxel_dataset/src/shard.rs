//! Binary shard layout and the owned / memory-mapped backings.

use crate::types::{DatasetResult, VoxelDatasetError, VoxelManifest, POINT_STRIDE};
use memmap2::MmapOptions;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

pub const SHARD_MAGIC: &[u8; 4] = b"VOX1";
pub const SHARD_VERSION: u32 = 1;
pub const SHARD_HEADER_LEN: usize = 64;

/// Fixed 64-byte little-endian shard header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardHeader {
    pub version: u32,
    pub dtype: u32,
    pub voxel_resolution: u32,
    pub points_per_shape: u32,
    pub shapes: u64,
    pub points_offset: u64,
    pub voxels_offset: u64,
}

impl ShardHeader {
    pub fn new(voxel_resolution: usize, points_per_shape: usize, shapes: usize) -> Self {
        let points_bytes = shapes * points_per_shape * POINT_STRIDE * std::mem::size_of::<f32>();
        Self {
            version: SHARD_VERSION,
            dtype: 0,
            voxel_resolution: voxel_resolution as u32,
            points_per_shape: points_per_shape as u32,
            shapes: shapes as u64,
            points_offset: SHARD_HEADER_LEN as u64,
            voxels_offset: (SHARD_HEADER_LEN + points_bytes) as u64,
        }
    }

    pub fn encode(&self) -> [u8; SHARD_HEADER_LEN] {
        let mut out = [0u8; SHARD_HEADER_LEN];
        out[0..4].copy_from_slice(SHARD_MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.dtype.to_le_bytes());
        out[16..20].copy_from_slice(&self.voxel_resolution.to_le_bytes());
        out[20..24].copy_from_slice(&self.points_per_shape.to_le_bytes());
        out[24..32].copy_from_slice(&self.shapes.to_le_bytes());
        out[32..40].copy_from_slice(&self.points_offset.to_le_bytes());
        out[40..48].copy_from_slice(&self.voxels_offset.to_le_bytes());
        out
    }

    pub fn decode(data: &[u8], path: &Path) -> DatasetResult<Self> {
        if data.len() < SHARD_HEADER_LEN {
            return Err(VoxelDatasetError::Truncated {
                path: path.to_path_buf(),
            });
        }
        if &data[0..4] != SHARD_MAGIC {
            return Err(VoxelDatasetError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = read_u32_le(&data[4..8]);
        if version != SHARD_VERSION {
            return Err(VoxelDatasetError::VersionMismatch {
                path: path.to_path_buf(),
                found: version,
                expected: SHARD_VERSION,
            });
        }
        let dtype = read_u32_le(&data[8..12]);
        if dtype != 0 {
            return Err(VoxelDatasetError::Other(format!(
                "unsupported dtype {} in {}",
                dtype,
                path.display()
            )));
        }
        Ok(Self {
            version,
            dtype,
            voxel_resolution: read_u32_le(&data[16..20]),
            points_per_shape: read_u32_le(&data[20..24]),
            shapes: read_u64_le(&data[24..32]),
            points_offset: read_u64_le(&data[32..40]),
            voxels_offset: read_u64_le(&data[40..48]),
        })
    }

    fn point_elems(&self) -> usize {
        self.points_per_shape as usize * POINT_STRIDE
    }

    fn voxel_elems(&self) -> Option<usize> {
        (self.voxel_resolution as usize).checked_pow(3)
    }

    /// Validate block offsets against a shard of `len` bytes; returns the voxel count per shape.
    fn check_extent(&self, len: usize, path: &Path) -> DatasetResult<usize> {
        let truncated = || VoxelDatasetError::Truncated {
            path: path.to_path_buf(),
        };
        let shapes = usize::try_from(self.shapes).map_err(|_| truncated())?;
        let points_bytes = shapes
            .checked_mul(self.point_elems())
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| VoxelDatasetError::Other("overflow computing points bytes".into()))?;
        let voxel_elems = self
            .voxel_elems()
            .ok_or_else(|| VoxelDatasetError::Other("overflow computing voxel size".into()))?;
        let voxel_bytes = voxel_elems
            .checked_mul(shapes)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| VoxelDatasetError::Other("overflow computing voxel bytes".into()))?;
        let header = SHARD_HEADER_LEN as u64;
        if self.points_offset < header || self.voxels_offset < header {
            return Err(VoxelDatasetError::Other(format!(
                "block offset inside the header in {}",
                path.display()
            )));
        }
        let end = |offset: u64, bytes: usize| {
            usize::try_from(offset)
                .ok()
                .and_then(|o| o.checked_add(bytes))
        };
        match (
            end(self.points_offset, points_bytes),
            end(self.voxels_offset, voxel_bytes),
        ) {
            (Some(p), Some(v)) if p <= len && v <= len => Ok(voxel_elems),
            _ => Err(truncated()),
        }
    }
}

fn read_u32_le(data: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(data);
    u32::from_le_bytes(arr)
}

fn read_u64_le(data: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(data);
    u64::from_le_bytes(arr)
}

fn decode_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(c);
            f32::from_le_bytes(arr)
        })
        .collect()
}

enum ShardBacking {
    Owned {
        points: Vec<f32>,
        voxels: Vec<f32>,
    },
    Mmap {
        mmap: Arc<memmap2::Mmap>,
    },
}

pub(crate) struct ShardBuffer {
    pub(crate) header: ShardHeader,
    voxel_elems: usize,
    backing: ShardBacking,
}

impl ShardBuffer {
    pub(crate) fn shapes(&self) -> usize {
        self.header.shapes as usize
    }

    pub(crate) fn load_owned(path: &Path) -> DatasetResult<Self> {
        let data = fs::read(path).map_err(|e| VoxelDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let header = ShardHeader::decode(&data, path)?;
        let voxel_elems = header.check_extent(data.len(), path)?;

        let shapes = header.shapes as usize;
        let p_start = header.points_offset as usize;
        let p_end = p_start + shapes * header.point_elems() * 4;
        let v_start = header.voxels_offset as usize;
        let v_end = v_start + shapes * voxel_elems * 4;

        Ok(Self {
            header,
            voxel_elems,
            backing: ShardBacking::Owned {
                points: decode_f32s(&data[p_start..p_end]),
                voxels: decode_f32s(&data[v_start..v_end]),
            },
        })
    }

    pub(crate) fn load_mmap(path: &Path) -> DatasetResult<Self> {
        let file = File::open(path).map_err(|e| VoxelDatasetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        // Shards are written once and treated as read-only afterwards.
        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|e| VoxelDatasetError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?
        };
        let header = ShardHeader::decode(&mmap, path)?;
        let voxel_elems = header.check_extent(mmap.len(), path)?;
        Ok(Self {
            header,
            voxel_elems,
            backing: ShardBacking::Mmap {
                mmap: Arc::new(mmap),
            },
        })
    }

    pub(crate) fn points(&self, index: usize) -> Vec<f32> {
        let elems = self.header.point_elems();
        match &self.backing {
            ShardBacking::Owned { points, .. } => {
                points[index * elems..(index + 1) * elems].to_vec()
            }
            ShardBacking::Mmap { mmap } => {
                let start = self.header.points_offset as usize + index * elems * 4;
                decode_f32s(&mmap[start..start + elems * 4])
            }
        }
    }

    pub(crate) fn voxels(&self, index: usize) -> Vec<f32> {
        let elems = self.voxel_elems;
        match &self.backing {
            ShardBacking::Owned { voxels, .. } => {
                voxels[index * elems..(index + 1) * elems].to_vec()
            }
            ShardBacking::Mmap { mmap } => {
                let start = self.header.voxels_offset as usize + index * elems * 4;
                decode_f32s(&mmap[start..start + elems * 4])
            }
        }
    }
}

pub(crate) fn check_against_manifest(
    header: &ShardHeader,
    manifest: &VoxelManifest,
    path: &Path,
) -> DatasetResult<()> {
    if header.shapes as usize != manifest.names.len() {
        return Err(VoxelDatasetError::Mismatch(format!(
            "{} lists {} names but shard {} holds {} shapes",
            crate::types::MANIFEST_FILE,
            manifest.names.len(),
            path.display(),
            header.shapes
        )));
    }
    if header.voxel_resolution as usize != manifest.voxel_resolution {
        return Err(VoxelDatasetError::Mismatch(format!(
            "voxel resolution {} in manifest vs {} in shard",
            manifest.voxel_resolution, header.voxel_resolution
        )));
    }
    if header.points_per_shape as usize != manifest.points_per_shape {
        return Err(VoxelDatasetError::Mismatch(format!(
            "points per shape {} in manifest vs {} in shard",
            manifest.points_per_shape, header.points_per_shape
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encode_decode_keeps_fields() {
        let header = ShardHeader::new(16, 100, 3);
        let bytes = header.encode();
        let decoded = ShardHeader::decode(&bytes, Path::new("mem")).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.voxels_offset, (64 + 3 * 100 * 4 * 4) as u64);
    }

    #[test]
    fn header_rejects_bad_magic_and_version() {
        let mut bytes = ShardHeader::new(4, 1, 1).encode();
        bytes[0] = b'X';
        assert!(matches!(
            ShardHeader::decode(&bytes, Path::new("mem")),
            Err(VoxelDatasetError::BadMagic { .. })
        ));

        let mut bytes = ShardHeader::new(4, 1, 1).encode();
        bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            ShardHeader::decode(&bytes, Path::new("mem")),
            Err(VoxelDatasetError::VersionMismatch { found: 9, .. })
        ));
    }

    #[test]
    fn extent_check_detects_truncation() {
        let header = ShardHeader::new(2, 2, 1);
        let full = SHARD_HEADER_LEN + (2 * 4 + 8) * 4;
        assert_eq!(header.check_extent(full, Path::new("mem")).unwrap(), 8);
        assert!(matches!(
            header.check_extent(full - 1, Path::new("mem")),
            Err(VoxelDatasetError::Truncated { .. })
        ));
    }

    #[test]
    fn extent_check_rejects_oversized_headers() {
        let mut header = ShardHeader::new(2, 2, 1);
        header.voxel_resolution = u32::MAX;
        assert!(header.check_extent(1 << 20, Path::new("mem")).is_err());

        let mut header = ShardHeader::new(2, 2, 1);
        header.voxels_offset = u64::MAX;
        assert!(matches!(
            header.check_extent(1 << 20, Path::new("mem")),
            Err(VoxelDatasetError::Truncated { .. })
        ));

        let mut header = ShardHeader::new(2, 2, 1);
        header.points_offset = 8;
        assert!(header.check_extent(1 << 20, Path::new("mem")).is_err());
    }
}

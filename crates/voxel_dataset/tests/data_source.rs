//! Integration tests for writing and opening voxel data sources.

use burn_ndarray::NdArray;
use std::fs;
use std::path::Path;
use voxel_dataset::{
    StoreMode, VoxelDatasetError, VoxelManifest, VoxelSamples, VoxelShardWriter, MANIFEST_FILE,
};

const RES: usize = 4;
const POINTS: usize = 6;

/// Shape `i` fills the first `i + 1` x-slabs and marks point `j` inside when `j <= i`.
fn write_slabs(root: &Path, names: &[&str]) -> anyhow::Result<VoxelManifest> {
    let mut writer = VoxelShardWriter::new(RES, POINTS);
    for (i, name) in names.iter().enumerate() {
        let mut voxels = vec![0.0f32; RES * RES * RES];
        for x in 0..(i + 1).min(RES) {
            for y in 0..RES {
                for z in 0..RES {
                    voxels[(x * RES + y) * RES + z] = 1.0;
                }
            }
        }
        let mut points = Vec::with_capacity(POINTS * 4);
        for j in 0..POINTS {
            let t = j as f32 / POINTS as f32 - 0.5;
            points.extend_from_slice(&[t, -t, i as f32, if j <= i { 1.0 } else { 0.0 }]);
        }
        writer.push(name, &points, &voxels)?;
    }
    Ok(writer.finish(root)?)
}

#[test]
fn open_reads_names_points_and_voxels() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_slabs(dir.path(), &["chair_a", "chair_b", "table_c"])?;

    for mode in [StoreMode::InMemory, StoreMode::Mmap] {
        let ds = VoxelSamples::open_with_mode(dir.path(), mode)?;
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.names(), &["chair_a", "chair_b", "table_c"]);
        assert_eq!(ds.name(2)?, "table_c");

        let pts = ds.points(1)?;
        assert_eq!(pts.count, POINTS);
        assert_eq!(pts.xyz(0)[2], 1.0);
        assert_eq!(pts.occupancy(1), 1.0);
        assert_eq!(pts.occupancy(2), 0.0);

        let grid = ds.voxels(2)?;
        assert_eq!(grid.resolution, RES);
        assert_eq!(grid.occupied(), 3 * RES * RES);
        assert_eq!(grid.get(2, 3, 3), 1.0);
        assert_eq!(grid.get(3, 0, 0), 0.0);
    }
    Ok(())
}

#[test]
fn index_of_returns_first_match() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_slabs(dir.path(), &["a", "dup", "dup"])?;
    let ds = VoxelSamples::open_with_mode(dir.path(), StoreMode::InMemory)?;
    assert_eq!(ds.index_of("dup"), Some(1));
    assert_eq!(ds.index_of("missing"), None);
    Ok(())
}

#[test]
fn out_of_range_index_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_slabs(dir.path(), &["only"])?;
    let ds = VoxelSamples::open_with_mode(dir.path(), StoreMode::InMemory)?;
    assert!(matches!(
        ds.points(1),
        Err(VoxelDatasetError::IndexOutOfRange { index: 1, len: 1 })
    ));
    Ok(())
}

#[test]
fn tensors_carry_a_unit_batch_dimension() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_slabs(dir.path(), &["a", "b"])?;
    let ds = VoxelSamples::open_with_mode(dir.path(), StoreMode::InMemory)?;
    let device = Default::default();

    let points = ds.points_tensor::<NdArray<f32>>(1, &device)?;
    assert_eq!(points.dims(), [1, POINTS, 4]);
    let voxels = ds.voxels_tensor::<NdArray<f32>>(1, &device)?;
    assert_eq!(voxels.dims(), [1, RES * RES * RES]);
    let sum: f32 = voxels.sum().into_scalar();
    assert_eq!(sum, (2 * RES * RES) as f32);
    Ok(())
}

#[test]
fn manifest_name_count_must_match_shard() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut manifest = write_slabs(dir.path(), &["a", "b"])?;
    manifest.names.push("ghost".into());
    manifest.save(&dir.path().join(MANIFEST_FILE))?;
    let err = VoxelSamples::open_with_mode(dir.path(), StoreMode::InMemory).unwrap_err();
    assert!(matches!(err, VoxelDatasetError::Mismatch(_)));
    Ok(())
}

#[test]
fn truncated_shard_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manifest = write_slabs(dir.path(), &["a", "b"])?;
    let shard = dir.path().join(&manifest.shard);
    let bytes = fs::read(&shard)?;
    fs::write(&shard, &bytes[..bytes.len() - 4])?;
    for mode in [StoreMode::InMemory, StoreMode::Mmap] {
        let err = VoxelSamples::open_with_mode(dir.path(), mode).unwrap_err();
        assert!(matches!(err, VoxelDatasetError::Truncated { .. }));
    }
    Ok(())
}

#[test]
fn corrupt_header_sizes_are_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let manifest = write_slabs(dir.path(), &["a", "b"])?;
    let shard = dir.path().join(&manifest.shard);
    let pristine = fs::read(&shard)?;

    // Resolution field, then the voxel block offset.
    for (range, value) in [(16..20, u32::MAX as u64), (40..48, u64::MAX)] {
        let mut bytes = pristine.clone();
        let width = range.len();
        bytes[range].copy_from_slice(&value.to_le_bytes()[..width]);
        fs::write(&shard, &bytes)?;
        for mode in [StoreMode::InMemory, StoreMode::Mmap] {
            assert!(VoxelSamples::open_with_mode(dir.path(), mode).is_err());
        }
    }
    Ok(())
}

#[test]
fn writer_rejects_wrong_sizes() {
    let mut writer = VoxelShardWriter::new(RES, POINTS);
    let err = writer
        .push("bad", &[0.0; 3], &vec![0.0; RES * RES * RES])
        .unwrap_err();
    assert!(matches!(err, VoxelDatasetError::Mismatch(_)));
    assert!(writer.is_empty());
}

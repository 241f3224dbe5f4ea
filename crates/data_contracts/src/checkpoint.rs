use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Sidecar written next to a base model checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Completed epochs at save time; resuming starts from this epoch.
    pub epoch: usize,
    pub loss: f32,
    pub code_length: usize,
    pub voxel_resolution: usize,
    pub created_at_ms: u64,
}

/// Sidecar written next to a per-shape fine-tuned model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeModelMeta {
    pub shape_name: String,
    pub source_checkpoint: String,
    pub epoch: usize,
    pub loss: f32,
    pub created_at_ms: u64,
}

pub fn unix_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> io::Result<T> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, data)
}

impl CheckpointMeta {
    pub fn load(path: &Path) -> io::Result<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        write_json(self, path)
    }
}

impl ShapeModelMeta {
    pub fn load(path: &Path) -> io::Result<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        write_json(self, path)
    }
}

//! Experiment directory layout and checkpoint persistence.
//!
//! ```text
//! <exp_root>/<experiment>/
//!     specs.json
//!     checkpoints/<name>.bin, <name>.json
//!     finetune/<shape_name>/best.bin, best.json
//! ```

use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use data_contracts::ExperimentSpecs;
use std::fs;
use std::path::{Path, PathBuf};

pub const SPECS_FILE: &str = "specs.json";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const FINETUNE_DIR: &str = "finetune";
pub const LATEST_CHECKPOINT: &str = "latest";
pub const BEST_CHECKPOINT: &str = "best";

pub fn experiment_dir(exp_root: &Path, name: &str) -> PathBuf {
    exp_root.join(name)
}

pub fn load_experiment_specifications(dir: &Path) -> Result<ExperimentSpecs> {
    let path = dir.join(SPECS_FILE);
    if !path.is_file() {
        anyhow::bail!(
            "experiment directory {} does not include specifications file \"{}\"",
            dir.display(),
            SPECS_FILE
        );
    }
    ExperimentSpecs::load(&path)
        .with_context(|| format!("failed to load experiment specs from {}", path.display()))
}

/// An experiment directory together with its loaded specs.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub dir: PathBuf,
    pub specs: ExperimentSpecs,
}

impl Experiment {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let specs = load_experiment_specifications(&dir)?;
        tracing::info!(
            dir = %dir.display(),
            data_source = %specs.data_source.display(),
            "loaded experiment"
        );
        Ok(Self { dir, specs })
    }

    /// Recorder path (the recorder appends `.bin`).
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.dir.join(CHECKPOINTS_DIR).join(name)
    }

    pub fn checkpoint_meta_path(&self, name: &str) -> PathBuf {
        self.checkpoint_path(name).with_extension("json")
    }

    pub fn optimizer_path(&self, name: &str) -> PathBuf {
        self.dir.join(CHECKPOINTS_DIR).join(format!("{name}_optim"))
    }

    pub fn checkpoint_exists(&self, name: &str) -> bool {
        self.checkpoint_path(name).with_extension("bin").is_file()
            && self.checkpoint_meta_path(name).is_file()
    }

    /// Per-shape model path; the shape name must be a single plain path component.
    pub fn shape_model_path(&self, shape_name: &str) -> Result<PathBuf> {
        let plain = !shape_name.is_empty()
            && shape_name != "."
            && shape_name != ".."
            && !shape_name.contains(['/', '\\']);
        if !plain {
            anyhow::bail!("shape name {shape_name:?} cannot be used as a directory name");
        }
        Ok(self.dir.join(FINETUNE_DIR).join(shape_name).join("best"))
    }

    pub fn shape_meta_path(&self, shape_name: &str) -> Result<PathBuf> {
        Ok(self.shape_model_path(shape_name)?.with_extension("json"))
    }

    pub fn shape_model_exists(&self, shape_name: &str) -> Result<bool> {
        Ok(self
            .shape_model_path(shape_name)?
            .with_extension("bin")
            .is_file())
    }
}

pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    module
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))
}

pub fn load_module<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    module
        .load_file(path, &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_specs_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_experiment_specifications(dir.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&dir.path().display().to_string()));
        assert!(msg.contains(SPECS_FILE));
    }

    #[test]
    fn layout_paths() {
        let exp = Experiment {
            dir: experiment_dir(Path::new("exp_log"), "chairs"),
            specs: ExperimentSpecs::new("d", 4),
        };
        assert_eq!(
            exp.checkpoint_path("best"),
            PathBuf::from("exp_log/chairs/checkpoints/best")
        );
        assert_eq!(
            exp.checkpoint_meta_path("300"),
            PathBuf::from("exp_log/chairs/checkpoints/300.json")
        );
        assert_eq!(
            exp.shape_meta_path("chair_01").unwrap(),
            PathBuf::from("exp_log/chairs/finetune/chair_01/best.json")
        );
        assert!(!exp.checkpoint_exists("best"));
    }

    #[test]
    fn shape_names_cannot_escape_finetune_dir() {
        let exp = Experiment {
            dir: PathBuf::from("exp_log/chairs"),
            specs: ExperimentSpecs::new("d", 4),
        };
        for bad in ["", ".", "..", "../evil", "a/b", "a\\b"] {
            assert!(exp.shape_model_path(bad).is_err(), "accepted {bad:?}");
        }
        assert!(exp.shape_model_path("chair.v2").is_ok());
        assert!(!exp.shape_model_exists("chair.v2").unwrap());
    }

    #[test]
    fn open_reads_specs() {
        let dir = tempfile::tempdir().unwrap();
        ExperimentSpecs::new("voxels", 16)
            .save(&dir.path().join(SPECS_FILE))
            .unwrap();
        let exp = Experiment::open(dir.path()).unwrap();
        assert_eq!(exp.specs.code_length, 16);
        assert_eq!(exp.dir, dir.path());
    }
}

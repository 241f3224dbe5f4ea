use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecsError {
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
    #[error("CodeLength must be positive")]
    ZeroCodeLength,
    #[error("NetworkSpecs.DecoderDims must not be empty")]
    EmptyDecoderDims,
    #[error("{name} must be positive and finite: {value}")]
    InvalidLearningRate { name: &'static str, value: f64 },
    #[error("{0} must be positive")]
    ZeroCount(&'static str),
}

/// Experiment record stored as `specs.json` in an experiment directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExperimentSpecs {
    #[serde(default)]
    pub description: Option<String>,
    pub data_source: PathBuf,
    pub code_length: usize,
    #[serde(default)]
    pub network_specs: NetworkSpecs,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Random subset of sample points used per step; `None` uses every point.
    #[serde(default)]
    pub points_per_step: Option<usize>,
    #[serde(default = "default_snapshot_frequency")]
    pub snapshot_frequency: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub fine_tune: FineTuneSpecs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSpecs {
    #[serde(default = "default_encoder_hidden")]
    pub encoder_hidden: usize,
    #[serde(default = "default_decoder_dims")]
    pub decoder_dims: Vec<usize>,
    #[serde(default = "default_leaky_slope")]
    pub leaky_slope: f64,
}

impl Default for NetworkSpecs {
    fn default() -> Self {
        Self {
            encoder_hidden: default_encoder_hidden(),
            decoder_dims: default_decoder_dims(),
            leaky_slope: default_leaky_slope(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FineTuneSpecs {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_code_learning_rate")]
    pub code_learning_rate: f64,
    #[serde(default = "default_steps_per_epoch")]
    pub steps_per_epoch: usize,
    /// When false only the shape code is optimized; the decoder stays frozen.
    #[serde(default = "default_true")]
    pub optimize_decoder: bool,
}

impl Default for FineTuneSpecs {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            code_learning_rate: default_code_learning_rate(),
            steps_per_epoch: default_steps_per_epoch(),
            optimize_decoder: true,
        }
    }
}

fn default_learning_rate() -> f64 {
    1e-4
}
fn default_code_learning_rate() -> f64 {
    1e-3
}
fn default_num_epochs() -> usize {
    100
}
fn default_batch_size() -> usize {
    8
}
fn default_snapshot_frequency() -> usize {
    10
}
fn default_steps_per_epoch() -> usize {
    40
}
fn default_encoder_hidden() -> usize {
    256
}
fn default_decoder_dims() -> Vec<usize> {
    vec![256, 256, 128]
}
fn default_leaky_slope() -> f64 {
    0.02
}
fn default_true() -> bool {
    true
}

impl ExperimentSpecs {
    /// Build a spec with defaults for everything except the data source and code length.
    pub fn new(data_source: impl Into<PathBuf>, code_length: usize) -> Self {
        Self {
            description: None,
            data_source: data_source.into(),
            code_length,
            network_specs: NetworkSpecs::default(),
            learning_rate: default_learning_rate(),
            num_epochs: default_num_epochs(),
            batch_size: default_batch_size(),
            points_per_step: None,
            snapshot_frequency: default_snapshot_frequency(),
            seed: 0,
            fine_tune: FineTuneSpecs::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SpecsError> {
        let raw = fs::read(path).map_err(|e| SpecsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let specs: ExperimentSpecs =
            serde_json::from_slice(&raw).map_err(|e| SpecsError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        specs.validate()?;
        Ok(specs)
    }

    pub fn save(&self, path: &Path) -> Result<(), SpecsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SpecsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|e| SpecsError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, data).map_err(|e| SpecsError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), SpecsError> {
        if self.code_length == 0 {
            return Err(SpecsError::ZeroCodeLength);
        }
        if self.network_specs.decoder_dims.is_empty() {
            return Err(SpecsError::EmptyDecoderDims);
        }
        if self.network_specs.encoder_hidden == 0 {
            return Err(SpecsError::ZeroCount("NetworkSpecs.EncoderHidden"));
        }
        if self.network_specs.decoder_dims.contains(&0) {
            return Err(SpecsError::ZeroCount("NetworkSpecs.DecoderDims entries"));
        }
        for (name, value) in [
            ("LearningRate", self.learning_rate),
            ("FineTune.LearningRate", self.fine_tune.learning_rate),
            ("FineTune.CodeLearningRate", self.fine_tune.code_learning_rate),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SpecsError::InvalidLearningRate { name, value });
            }
        }
        if self.batch_size == 0 {
            return Err(SpecsError::ZeroCount("BatchSize"));
        }
        if self.fine_tune.steps_per_epoch == 0 {
            return Err(SpecsError::ZeroCount("FineTune.StepsPerEpoch"));
        }
        if self.points_per_step == Some(0) {
            return Err(SpecsError::ZeroCount("PointsPerStep"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_specs_fill_defaults() {
        let raw = r#"{ "DataSource": "data/chairs", "CodeLength": 128 }"#;
        let specs: ExperimentSpecs = serde_json::from_str(raw).unwrap();
        assert_eq!(specs.data_source, PathBuf::from("data/chairs"));
        assert_eq!(specs.network_specs.decoder_dims, vec![256, 256, 128]);
        assert_eq!(specs.fine_tune.steps_per_epoch, 40);
        assert!(specs.fine_tune.optimize_decoder);
        assert_eq!(specs.points_per_step, None);
        assert!(specs.validate().is_ok());
    }

    #[test]
    fn pascal_case_overrides_are_read() {
        let raw = r#"{
            "DataSource": "d",
            "CodeLength": 16,
            "NetworkSpecs": { "EncoderHidden": 32, "DecoderDims": [64, 32] },
            "FineTune": { "StepsPerEpoch": 5, "OptimizeDecoder": false },
            "PointsPerStep": 512,
            "Seed": 7
        }"#;
        let specs: ExperimentSpecs = serde_json::from_str(raw).unwrap();
        assert_eq!(specs.network_specs.encoder_hidden, 32);
        assert_eq!(specs.network_specs.leaky_slope, 0.02);
        assert_eq!(specs.fine_tune.steps_per_epoch, 5);
        assert!(!specs.fine_tune.optimize_decoder);
        assert_eq!(specs.fine_tune.code_learning_rate, 1e-3);
        assert_eq!(specs.points_per_step, Some(512));
        assert_eq!(specs.seed, 7);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut specs = ExperimentSpecs::new("d", 0);
        assert!(matches!(specs.validate(), Err(SpecsError::ZeroCodeLength)));

        specs.code_length = 8;
        specs.network_specs.decoder_dims.clear();
        assert!(matches!(specs.validate(), Err(SpecsError::EmptyDecoderDims)));

        specs.network_specs.decoder_dims = vec![8];
        specs.fine_tune.learning_rate = 0.0;
        assert!(matches!(
            specs.validate(),
            Err(SpecsError::InvalidLearningRate {
                name: "FineTune.LearningRate",
                ..
            })
        ));

        specs.fine_tune.learning_rate = 1e-4;
        specs.fine_tune.steps_per_epoch = 0;
        assert!(matches!(
            specs.validate(),
            Err(SpecsError::ZeroCount("FineTune.StepsPerEpoch"))
        ));
    }
}

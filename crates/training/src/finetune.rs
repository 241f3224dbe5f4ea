//! Per-shape fine-tuning agent.
//!
//! A `FineTuner` resumes a pretrained `ShapeAutoencoder` checkpoint, encodes
//! one shape's voxel grid into a latent code, and then optimizes that code
//! (and, unless frozen, the decoder) against the shape's occupancy samples.
//! After each epoch the caller asks it to persist the per-shape model, which
//! only happens when the epoch's mean loss beats the best seen for that shape.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Int, Tensor, TensorData};
use data_contracts::{unix_time_ms, CheckpointMeta, ShapeModelMeta};
use models::{ImplicitDecoder, ShapeAutoencoder, ShapeAutoencoderConfig, ShapeCode, ShapeCodeModel};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::clock::TrainClock;
use crate::workspace::{load_module, save_module, Experiment};

type CodeOptim<B> =
    OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, ShapeCode<B>, B>;
type DecoderOptim<B> =
    OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, ImplicitDecoder<B>, B>;

/// Host-side summary of one training step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepInfo {
    pub loss: f32,
    pub points: usize,
}

impl fmt::Display for StepInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss={:.6} points={}", self.loss, self.points)
    }
}

pub struct FineTuner<B: AutodiffBackend> {
    experiment: Experiment,
    device: B::Device,
    model: Option<ShapeCodeModel<B>>,
    code_optim: CodeOptim<B>,
    decoder_optim: DecoderOptim<B>,
    clock: TrainClock,
    rng: StdRng,
    checkpoint: Option<String>,
    epoch_losses: Vec<f32>,
    best_losses: HashMap<String, f32>,
}

impl<B: AutodiffBackend> FineTuner<B> {
    pub fn new(experiment: &Experiment, device: B::Device, rng: StdRng) -> Self {
        Self {
            experiment: experiment.clone(),
            device,
            model: None,
            code_optim: AdamConfig::new().init(),
            decoder_optim: AdamConfig::new().init(),
            clock: TrainClock::default(),
            rng,
            checkpoint: None,
            epoch_losses: Vec::new(),
            best_losses: HashMap::new(),
        }
    }

    pub fn clock_mut(&mut self) -> &mut TrainClock {
        &mut self.clock
    }

    /// Best mean epoch loss recorded for `shape_name` during this agent's lifetime.
    pub fn best_loss(&self, shape_name: &str) -> Option<f32> {
        self.best_losses
            .get(shape_name)
            .copied()
            .filter(|l| l.is_finite())
    }

    /// Load `checkpoint`, encode `voxels` (`[1, R³]`) into the shape code, and
    /// return the epoch fine-tuning resumes from.
    pub fn load_shape_code(&mut self, voxels: Tensor<B, 2>, checkpoint: &str) -> Result<usize> {
        let specs = &self.experiment.specs;
        let meta_path = self.experiment.checkpoint_meta_path(checkpoint);
        let meta = CheckpointMeta::load(&meta_path).with_context(|| {
            format!(
                "checkpoint {checkpoint} has no readable metadata at {}",
                meta_path.display()
            )
        })?;
        if meta.code_length != specs.code_length {
            anyhow::bail!(
                "checkpoint {checkpoint} was trained with CodeLength {} but specs request {}",
                meta.code_length,
                specs.code_length
            );
        }
        let cfg = ShapeAutoencoderConfig::from_specs(specs, meta.voxel_resolution);
        let [batch, voxel_len] = voxels.dims();
        if batch != 1 || voxel_len != cfg.voxel_len() {
            anyhow::bail!(
                "expected voxels of shape [1, {}], got [{batch}, {voxel_len}]",
                cfg.voxel_len()
            );
        }

        let autoencoder = load_module(
            ShapeAutoencoder::<B>::new(&cfg, &self.device),
            &self.experiment.checkpoint_path(checkpoint),
            &self.device,
        )?;
        let code = autoencoder.encode(voxels).detach().require_grad();
        let decoder = if specs.fine_tune.optimize_decoder {
            autoencoder.decoder
        } else {
            autoencoder.decoder.no_grad()
        };

        self.model = Some(ShapeCodeModel::from_parts(ShapeCode::new(code), decoder));
        self.code_optim = AdamConfig::new().init();
        self.decoder_optim = AdamConfig::new().init();
        self.clock = TrainClock::starting_at(meta.epoch);
        self.checkpoint = Some(checkpoint.to_string());
        self.epoch_losses.clear();
        tracing::debug!(checkpoint, epoch = meta.epoch, "loaded shape code");
        Ok(meta.epoch)
    }

    /// One optimizer step on `occ_data` (`[1, N, 4]`: xyz + occupancy).
    pub fn train_func(&mut self, occ_data: Tensor<B, 3>) -> Result<(Tensor<B, 3>, StepInfo)> {
        let model = self
            .model
            .take()
            .ok_or_else(|| anyhow::anyhow!("load_shape_code must run before train_func"))?;
        let points = self.sample_points(occ_data);
        let [_, n, _] = points.dims();
        let xyz = points.clone().slice([0..1, 0..n, 0..3]);
        let target = points.slice([0..1, 0..n, 3..4]);

        let ft = &self.experiment.specs.fine_tune;
        let pred = model.forward(xyz.clone());
        let loss = MseLoss::new().forward(pred.clone(), target.clone(), Reduction::Mean);
        let loss_value = scalar(loss.clone().detach())?;
        let code_grads = GradientsParams::from_grads(loss.backward(), &model.code);
        // Gradients are consumed per module, so the decoder gets its own pass.
        let decoder_grads = if ft.optimize_decoder {
            let loss = MseLoss::new().forward(model.forward(xyz), target, Reduction::Mean);
            Some(GradientsParams::from_grads(loss.backward(), &model.decoder))
        } else {
            None
        };

        let ShapeCodeModel { code, decoder } = model;
        let code = self.code_optim.step(ft.code_learning_rate, code, code_grads);
        let decoder = match decoder_grads {
            Some(grads) => self.decoder_optim.step(ft.learning_rate, decoder, grads),
            None => decoder,
        };
        self.model = Some(ShapeCodeModel::from_parts(code, decoder));
        self.epoch_losses.push(loss_value);

        Ok((
            pred.detach(),
            StepInfo {
                loss: loss_value,
                points: n,
            },
        ))
    }

    /// Persist the per-shape model when this epoch's mean loss beats the best so far.
    pub fn save_model_if_best_per_shape(&mut self, shape_name: &str) -> Result<bool> {
        if self.epoch_losses.is_empty() {
            return Ok(false);
        }
        let mean = self.epoch_losses.iter().sum::<f32>() / self.epoch_losses.len() as f32;
        self.epoch_losses.clear();

        if !mean.is_finite() {
            tracing::warn!(shape = shape_name, mean, "non-finite epoch loss; keeping saved model");
            return Ok(false);
        }
        let best = self.recorded_best(shape_name)?;
        if mean >= best {
            tracing::debug!(shape = shape_name, mean, best, "no improvement");
            return Ok(false);
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no shape model loaded"))?;
        save_module(model, &self.experiment.shape_model_path(shape_name)?)?;
        let meta = ShapeModelMeta {
            shape_name: shape_name.to_string(),
            source_checkpoint: self.checkpoint.clone().unwrap_or_default(),
            epoch: self.clock.epoch + 1,
            loss: mean,
            created_at_ms: unix_time_ms(),
        };
        let meta_path = self.experiment.shape_meta_path(shape_name)?;
        meta.save(&meta_path)
            .with_context(|| format!("failed to write {}", meta_path.display()))?;
        self.best_losses.insert(shape_name.to_string(), mean);
        tracing::info!(
            shape = shape_name,
            epoch = meta.epoch,
            loss = mean,
            "saved improved shape model"
        );
        Ok(true)
    }

    /// Best loss on record, seeded from a model saved by an earlier run.
    fn recorded_best(&mut self, shape_name: &str) -> Result<f32> {
        if let Some(best) = self.best_losses.get(shape_name) {
            return Ok(*best);
        }
        let meta_path = self.experiment.shape_meta_path(shape_name)?;
        let best = if meta_path.is_file() {
            ShapeModelMeta::load(&meta_path)
                .with_context(|| format!("unreadable shape record {}", meta_path.display()))?
                .loss
        } else {
            f32::INFINITY
        };
        self.best_losses.insert(shape_name.to_string(), best);
        Ok(best)
    }

    fn sample_points(&mut self, occ_data: Tensor<B, 3>) -> Tensor<B, 3> {
        let n = occ_data.dims()[1];
        match self.experiment.specs.points_per_step {
            Some(k) if k < n => {
                let picked: Vec<i64> = rand::seq::index::sample(&mut self.rng, n, k)
                    .into_iter()
                    .map(|i| i as i64)
                    .collect();
                let indices =
                    Tensor::<B, 1, Int>::from_data(TensorData::new(picked, [k]), &self.device);
                occ_data.select(1, indices)
            }
            _ => occ_data,
        }
    }
}

pub(crate) fn scalar<B: burn::tensor::backend::Backend>(t: Tensor<B, 1>) -> Result<f32> {
    let values = t
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read loss value: {e:?}"))?;
    values
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("loss tensor is empty"))
}

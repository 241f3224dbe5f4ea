//! Dataset-wide pretraining of the shape autoencoder.

use anyhow::{Context, Result};
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};
use data_contracts::{unix_time_ms, CheckpointMeta};
use models::{ShapeAutoencoder, ShapeAutoencoderConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use voxel_dataset::{VoxelSamples, POINT_STRIDE};

use crate::clock::TrainClock;
use crate::finetune::scalar;
use crate::workspace::{load_module, save_module, Experiment, BEST_CHECKPOINT, LATEST_CHECKPOINT};

type AutoencoderOptim<B> =
    OptimizerAdaptor<Adam<<B as AutodiffBackend>::InnerBackend>, ShapeAutoencoder<B>, B>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PretrainSummary {
    pub start_epoch: usize,
    pub end_epoch: usize,
    pub epoch_losses: Vec<f32>,
    pub best_loss: Option<f32>,
}

pub struct Pretrainer<B: AutodiffBackend> {
    experiment: Experiment,
    device: B::Device,
    cfg: ShapeAutoencoderConfig,
    model: ShapeAutoencoder<B>,
    optim: AutoencoderOptim<B>,
    clock: TrainClock,
    rng: StdRng,
    best_loss: f32,
}

impl<B: AutodiffBackend> Pretrainer<B> {
    pub fn new(
        experiment: &Experiment,
        voxel_resolution: usize,
        device: B::Device,
        rng: StdRng,
    ) -> Self {
        let cfg = ShapeAutoencoderConfig::from_specs(&experiment.specs, voxel_resolution);
        let model = ShapeAutoencoder::new(&cfg, &device);
        Self {
            experiment: experiment.clone(),
            device,
            cfg,
            model,
            optim: AdamConfig::new().init(),
            clock: TrainClock::default(),
            rng,
            best_loss: f32::INFINITY,
        }
    }

    /// Resume model, optimizer, and clock from `checkpoint` if it exists.
    pub fn resume(&mut self, checkpoint: &str) -> Result<bool> {
        if !self.experiment.checkpoint_exists(checkpoint) {
            tracing::info!(checkpoint, "no checkpoint to resume; starting fresh");
            return Ok(false);
        }
        let meta = CheckpointMeta::load(&self.experiment.checkpoint_meta_path(checkpoint))?;
        if meta.voxel_resolution != self.cfg.voxel_resolution
            || meta.code_length != self.cfg.code_length
        {
            anyhow::bail!(
                "checkpoint {checkpoint} shape (R={}, code={}) does not match dataset/specs (R={}, code={})",
                meta.voxel_resolution,
                meta.code_length,
                self.cfg.voxel_resolution,
                self.cfg.code_length
            );
        }
        self.model = load_module(
            self.model.clone(),
            &self.experiment.checkpoint_path(checkpoint),
            &self.device,
        )?;

        let optim_path = self.experiment.optimizer_path(checkpoint);
        if optim_path.with_extension("bin").exists() {
            let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
            match Recorder::<B>::load(&recorder, optim_path, &self.device) {
                Ok(record) => {
                    let optim = std::mem::replace(&mut self.optim, AdamConfig::new().init());
                    self.optim = optim.load_record(record);
                    tracing::info!("loaded optimizer state");
                }
                Err(err) => tracing::warn!(?err, "failed to load optimizer state"),
            }
        }

        if self.experiment.checkpoint_exists(BEST_CHECKPOINT) {
            let best = CheckpointMeta::load(&self.experiment.checkpoint_meta_path(BEST_CHECKPOINT))?;
            self.best_loss = best.loss;
        }
        self.clock = TrainClock::starting_at(meta.epoch);
        tracing::info!(checkpoint, epoch = meta.epoch, "resumed pretraining");
        Ok(true)
    }

    /// One pass over every shape in shuffled batches; returns the mean batch loss.
    pub fn train_epoch(&mut self, dataset: &VoxelSamples) -> Result<f32> {
        let specs = &self.experiment.specs;
        let batch_size = specs.batch_size.max(1);
        let points_per_shape = dataset.points_per_shape();
        let take = specs
            .points_per_step
            .map_or(points_per_shape, |k| k.min(points_per_shape));

        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut self.rng);

        let mut losses = Vec::new();
        for chunk in order.chunks(batch_size) {
            let (voxels, points) = self.collate(dataset, chunk, take)?;
            let b = chunk.len();
            let xyz = points.clone().slice([0..b, 0..take, 0..3]);
            let target = points.slice([0..b, 0..take, 3..4]);

            let pred = self.model.forward(voxels, xyz);
            let loss = MseLoss::new().forward(pred, target, Reduction::Mean);
            let loss_value = scalar(loss.clone().detach())?;
            if !loss_value.is_finite() {
                anyhow::bail!(
                    "pretraining diverged at epoch {} (loss {loss_value})",
                    self.clock.epoch
                );
            }
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optim
                .step(self.experiment.specs.learning_rate, self.model.clone(), grads);
            self.clock.tick();
            losses.push(loss_value);
        }
        Ok(if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f32>() / losses.len() as f32
        })
    }

    /// Train until `target_epochs` total epochs have completed.
    pub fn run(&mut self, dataset: &VoxelSamples, target_epochs: usize) -> Result<PretrainSummary> {
        if dataset.is_empty() {
            anyhow::bail!("dataset at {} has no shapes", dataset.root().display());
        }
        let mut summary = PretrainSummary {
            start_epoch: self.clock.epoch,
            ..Default::default()
        };
        let snapshot_every = self.experiment.specs.snapshot_frequency;
        while self.clock.epoch < target_epochs {
            let loss = self.train_epoch(dataset)?;
            self.clock.tock();
            let epoch = self.clock.epoch;
            tracing::info!(epoch, target_epochs, loss, "epoch complete");
            summary.epoch_losses.push(loss);

            self.save_checkpoint(LATEST_CHECKPOINT, loss)?;
            self.save_optimizer(LATEST_CHECKPOINT)?;
            if loss < self.best_loss {
                self.best_loss = loss;
                self.save_checkpoint(BEST_CHECKPOINT, loss)?;
            }
            if snapshot_every > 0 && epoch % snapshot_every == 0 {
                self.save_checkpoint(&epoch.to_string(), loss)?;
            }
        }
        summary.end_epoch = self.clock.epoch;
        summary.best_loss = Some(self.best_loss).filter(|l| l.is_finite());
        Ok(summary)
    }

    pub fn save_checkpoint(&self, name: &str, loss: f32) -> Result<()> {
        save_module(&self.model, &self.experiment.checkpoint_path(name))?;
        let meta = CheckpointMeta {
            epoch: self.clock.epoch,
            loss,
            code_length: self.cfg.code_length,
            voxel_resolution: self.cfg.voxel_resolution,
            created_at_ms: unix_time_ms(),
        };
        let path = self.experiment.checkpoint_meta_path(name);
        meta.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(checkpoint = name, epoch = meta.epoch, "saved checkpoint");
        Ok(())
    }

    fn save_optimizer(&self, name: &str) -> Result<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(
            &recorder,
            self.optim.to_record(),
            self.experiment.optimizer_path(name),
        )
        .map_err(|e| anyhow::anyhow!("failed to save optimizer state: {e}"))?;
        Ok(())
    }

    /// Stack voxels `[b, R³]` and the first `take` points of each shape `[b, take, 4]`.
    fn collate(
        &mut self,
        dataset: &VoxelSamples,
        indices: &[usize],
        take: usize,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 3>)> {
        let voxel_len = self.cfg.voxel_len();
        let mut voxel_buf = Vec::with_capacity(indices.len() * voxel_len);
        let mut point_buf = Vec::with_capacity(indices.len() * take * POINT_STRIDE);
        for &index in indices {
            voxel_buf.extend_from_slice(&dataset.voxels(index)?.values);
            let points = dataset.points(index)?;
            if take < points.count {
                for i in rand::seq::index::sample(&mut self.rng, points.count, take) {
                    let base = i * POINT_STRIDE;
                    point_buf.extend_from_slice(&points.values[base..base + POINT_STRIDE]);
                }
            } else {
                point_buf.extend_from_slice(&points.values);
            }
        }
        let b = indices.len();
        let voxels = Tensor::<B, 2>::from_data(TensorData::new(voxel_buf, [b, voxel_len]), &self.device);
        let points = Tensor::<B, 3>::from_data(
            TensorData::new(point_buf, [b, take, POINT_STRIDE]),
            &self.device,
        );
        Ok((voxels, points))
    }
}

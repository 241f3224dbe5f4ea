//! Drivers behind the `train`, `finetune` and `eval` binaries.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use clap::Parser;
use cli_support::{ExperimentArgs, ShapeRangeArgs};
use data_contracts::{CheckpointMeta, ShapeModelMeta};
use indicatif::{ProgressBar, ProgressStyle};
use models::{ShapeAutoencoder, ShapeAutoencoderConfig, ShapeCode, ShapeCodeModel};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use voxel_dataset::VoxelSamples;

use crate::device::{select_device, TrainDevice};
use crate::evaluate::{evaluate_shape, OccupancyMetrics};
use crate::finetune::FineTuner;
use crate::pretrain::{PretrainSummary, Pretrainer};
use crate::seed::init_seeds;
use crate::selection::ShapeSelection;
use crate::workspace::{load_module, Experiment, LATEST_CHECKPOINT};
use crate::{ADBackend, TrainBackend};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "finetune",
    about = "Fine-tune a pretrained shape autoencoder on individual shapes"
)]
pub struct FinetuneArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,
    #[command(flatten)]
    pub shapes: ShapeRangeArgs,
    /// Base checkpoint to resume each shape from.
    #[arg(long, short = 'c', default_value = "best")]
    pub checkpoint: String,
    /// Fine-tuning epochs per shape.
    #[arg(long, alias = "epoches", default_value_t = 300)]
    pub epochs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapeOutcome {
    pub index: usize,
    pub name: String,
    pub start_epoch: usize,
    pub best_loss: Option<f32>,
    pub saved: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FinetuneSummary {
    pub shapes: Vec<ShapeOutcome>,
}

struct RunContext {
    experiment: Experiment,
    dataset: VoxelSamples,
    device: TrainDevice,
    rng: StdRng,
}

fn open_run(args: &ExperimentArgs) -> Result<RunContext> {
    let experiment = Experiment::open(args.experiment_dir())?;
    let rng = init_seeds::<ADBackend>(experiment.specs.seed);
    let device = select_device(args.gpu);
    let source = &experiment.specs.data_source;
    let dataset = VoxelSamples::open(source)
        .with_context(|| format!("failed to open data source {}", source.display()))?;
    tracing::info!(
        shapes = dataset.len(),
        resolution = dataset.voxel_resolution(),
        points = dataset.points_per_shape(),
        "opened voxel samples"
    );
    Ok(RunContext {
        experiment,
        dataset,
        device,
        rng,
    })
}

fn resolve_shapes(args: &ShapeRangeArgs, dataset: &VoxelSamples) -> Result<Vec<usize>> {
    let indexes =
        ShapeSelection::from(args).resolve(dataset.len(), |name| dataset.index_of(name))?;
    tracing::info!(?indexes, "shape indexes selected");
    Ok(indexes)
}

fn epoch_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {prefix}")?
            .progress_chars("=>-"),
    );
    Ok(bar)
}

pub fn run_finetune(args: FinetuneArgs) -> Result<FinetuneSummary> {
    let RunContext {
        experiment,
        dataset,
        device,
        mut rng,
    } = open_run(&args.experiment)?;
    let indexes = resolve_shapes(&args.shapes, &dataset)?;
    let steps = experiment.specs.fine_tune.steps_per_epoch;

    let mut summary = FinetuneSummary::default();
    for index in indexes {
        let name = dataset.name(index)?.to_string();
        tracing::info!(index, shape = %name, "fine-tuning shape");
        let occ_data = dataset.points_tensor::<ADBackend>(index, &device)?;
        let voxels = dataset.voxels_tensor::<ADBackend>(index, &device)?;

        let mut agent =
            FineTuner::<ADBackend>::new(&experiment, device.clone(), StdRng::from_rng(&mut rng));
        let start_epoch = agent
            .load_shape_code(voxels, &args.checkpoint)
            .with_context(|| format!("failed to resume shape {name} from {}", args.checkpoint))?;

        let Some(end_epoch) = start_epoch.checked_add(args.epochs) else {
            anyhow::bail!(
                "--epochs {} overflows from checkpoint epoch {start_epoch}",
                args.epochs
            );
        };
        let bar = epoch_bar(args.epochs)?;
        let mut saved = false;
        for e in start_epoch..end_epoch {
            bar.set_message(format!("EPOCH[{e}][{}]", args.epochs));
            let mut last = None;
            for _ in 0..steps {
                let (_outputs, info) = agent.train_func(occ_data.clone())?;
                last = Some(info);
                agent.clock_mut().tick();
            }
            if let Some(info) = last {
                bar.set_prefix(info.to_string());
            }
            saved |= agent.save_model_if_best_per_shape(&name)?;
            agent.clock_mut().tock();
            bar.inc(1);
        }
        bar.finish_and_clear();

        let outcome = ShapeOutcome {
            index,
            best_loss: agent.best_loss(&name),
            name,
            start_epoch,
            saved,
        };
        tracing::info!(
            index,
            shape = %outcome.name,
            best_loss = ?outcome.best_loss,
            saved,
            "finished shape"
        );
        summary.shapes.push(outcome);
    }
    Ok(summary)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "train", about = "Pretrain the shape autoencoder over a voxel dataset")]
pub struct TrainArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,
    /// Total epochs to reach (defaults to NumEpochs from specs.json).
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Ignore an existing `latest` checkpoint and start from scratch.
    #[arg(long, default_value_t = false)]
    pub no_resume: bool,
}

pub fn run_train(args: TrainArgs) -> Result<PretrainSummary> {
    let RunContext {
        experiment,
        dataset,
        device,
        rng,
    } = open_run(&args.experiment)?;
    let mut trainer =
        Pretrainer::<ADBackend>::new(&experiment, dataset.voxel_resolution(), device, rng);
    if !args.no_resume {
        trainer.resume(LATEST_CHECKPOINT)?;
    }
    let target = args.epochs.unwrap_or(experiment.specs.num_epochs);
    trainer.run(&dataset, target)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "eval",
    about = "Score per-shape models (or the base checkpoint) on sample occupancy"
)]
pub struct EvalArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,
    #[command(flatten)]
    pub shapes: ShapeRangeArgs,
    /// Base checkpoint used for shapes without a fine-tuned model.
    #[arg(long, short = 'c', default_value = "best")]
    pub checkpoint: String,
    /// Append one JSON line per shape to this file.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapeEvaluation {
    pub index: usize,
    pub name: String,
    /// `finetuned` or `checkpoint`.
    pub model_source: String,
    pub epoch: usize,
    #[serde(flatten)]
    pub metrics: OccupancyMetrics,
}

pub fn run_eval(args: EvalArgs) -> Result<Vec<ShapeEvaluation>> {
    let RunContext {
        experiment,
        dataset,
        device,
        ..
    } = open_run(&args.experiment)?;
    let indexes = resolve_shapes(&args.shapes, &dataset)?;
    let cfg = ShapeAutoencoderConfig::from_specs(&experiment.specs, dataset.voxel_resolution());

    let mut base: Option<(ShapeAutoencoder<TrainBackend>, CheckpointMeta)> = None;
    let mut results = Vec::with_capacity(indexes.len());
    for index in indexes {
        let name = dataset.name(index)?.to_string();
        let points = dataset.points_tensor::<TrainBackend>(index, &device)?;

        let (model, model_source, epoch) = if experiment.shape_model_exists(&name)? {
            let meta = ShapeModelMeta::load(&experiment.shape_meta_path(&name)?)
                .with_context(|| format!("failed to read fine-tuned meta for {name}"))?;
            let model = load_module(
                ShapeCodeModel::<TrainBackend>::init(&cfg, &device),
                &experiment.shape_model_path(&name)?,
                &device,
            )?;
            (model, "finetuned", meta.epoch)
        } else {
            if base.is_none() {
                base = Some(load_base(&experiment, &cfg, &args.checkpoint, &device)?);
            }
            let Some((autoencoder, meta)) = base.as_ref() else {
                anyhow::bail!("base checkpoint {} unavailable", args.checkpoint);
            };
            let voxels = dataset.voxels_tensor::<TrainBackend>(index, &device)?;
            let code = ShapeCode::new(autoencoder.encode(voxels));
            let model = ShapeCodeModel::from_parts(code, autoencoder.decoder.clone());
            (model, "checkpoint", meta.epoch)
        };

        let metrics = evaluate_shape(&model, points)?;
        tracing::info!(
            index,
            shape = %name,
            source = model_source,
            mse = metrics.mse,
            accuracy = metrics.accuracy,
            iou = metrics.iou,
            "evaluated shape"
        );
        results.push(ShapeEvaluation {
            index,
            name,
            model_source: model_source.to_string(),
            epoch,
            metrics,
        });
    }

    if let Some(path) = &args.metrics_out {
        append_jsonl(path, &results)?;
    }
    Ok(results)
}

fn load_base<B: Backend>(
    experiment: &Experiment,
    cfg: &ShapeAutoencoderConfig,
    checkpoint: &str,
    device: &B::Device,
) -> Result<(ShapeAutoencoder<B>, CheckpointMeta)> {
    let meta_path = experiment.checkpoint_meta_path(checkpoint);
    let meta = CheckpointMeta::load(&meta_path)
        .with_context(|| format!("failed to read {}", meta_path.display()))?;
    let model = load_module(
        ShapeAutoencoder::new(cfg, device),
        &experiment.checkpoint_path(checkpoint),
        device,
    )?;
    Ok((model, meta))
}

fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finetune_args_accept_legacy_epoches_flag() {
        let args = FinetuneArgs::parse_from(["finetune", "-e", "chairs", "--epoches", "5"]);
        assert_eq!(args.epochs, 5);
        assert_eq!(args.checkpoint, "best");
        assert_eq!(args.shapes.end, 1);
    }

    #[test]
    fn finetune_defaults() {
        let args = FinetuneArgs::parse_from(["finetune", "--experiment", "chairs", "-c", "300"]);
        assert_eq!(args.epochs, 300);
        assert_eq!(args.checkpoint, "300");
        assert_eq!(args.experiment.exp_root, PathBuf::from("exp_log"));
    }

    #[test]
    fn train_args_default_to_resume() {
        let args = TrainArgs::parse_from(["train", "-e", "chairs"]);
        assert!(!args.no_resume);
        assert!(args.epochs.is_none());
    }
}

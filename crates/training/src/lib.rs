#![recursion_limit = "256"]

pub mod clock;
pub mod device;
pub mod evaluate;
pub mod finetune;
pub mod pretrain;
pub mod runner;
pub mod seed;
pub mod selection;
pub mod workspace;

pub use clock::TrainClock;
pub use device::{select_device, TrainDevice};
pub use evaluate::{evaluate_shape, occupancy_metrics, OccupancyMetrics};
pub use finetune::{FineTuner, StepInfo};
pub use pretrain::{PretrainSummary, Pretrainer};
pub use runner::{
    run_eval, run_finetune, run_train, EvalArgs, FinetuneArgs, FinetuneSummary, ShapeEvaluation,
    ShapeOutcome, TrainArgs,
};
pub use seed::init_seeds;
pub use selection::{ShapeSelection, SelectionError};
pub use workspace::{experiment_dir, load_experiment_specifications, Experiment};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Autodiff wrapper used by the optimizing agents.
pub type ADBackend = burn::backend::Autodiff<TrainBackend>;

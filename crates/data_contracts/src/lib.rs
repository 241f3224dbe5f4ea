//! Shared data contracts for experiment specs and checkpoint sidecars.

pub mod checkpoint;
pub mod specs;

pub use checkpoint::{unix_time_ms, CheckpointMeta, ShapeModelMeta};
pub use specs::{ExperimentSpecs, FineTuneSpecs, NetworkSpecs, SpecsError};

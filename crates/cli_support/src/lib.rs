//! Shared CLI argument groups and logging setup for the shape tools.

pub mod common;
pub mod logging;

pub use common::{ExperimentArgs, ShapeRangeArgs};
pub use logging::init_logging;

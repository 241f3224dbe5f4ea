use clap::Args;
use std::path::PathBuf;

/// Experiment location and device options shared by train/finetune/eval.
#[derive(Debug, Clone, Args)]
pub struct ExperimentArgs {
    /// Experiment name, resolved under the experiment root.
    #[arg(long = "experiment", short = 'e')]
    pub experiment: String,
    /// Root directory holding experiment directories.
    #[arg(long, default_value = "exp_log")]
    pub exp_root: PathBuf,
    /// Device ordinal for GPU backends (ignored on the CPU backend).
    #[arg(long, short = 'g', default_value_t = 0)]
    pub gpu: usize,
    /// Enable debug-level logging.
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}

impl ExperimentArgs {
    pub fn experiment_dir(&self) -> PathBuf {
        self.exp_root.join(&self.experiment)
    }
}

/// Which shapes to process: an index range, or a file of shape names.
#[derive(Debug, Clone, Args)]
pub struct ShapeRangeArgs {
    /// File with one shape name per line; takes precedence over --start/--end.
    #[arg(long)]
    pub subset: Option<PathBuf>,
    /// First shape index (inclusive).
    #[arg(long, default_value_t = 0)]
    pub start: usize,
    /// Last shape index (exclusive).
    #[arg(long, default_value_t = 1)]
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(flatten)]
        exp: ExperimentArgs,
        #[command(flatten)]
        shapes: ShapeRangeArgs,
    }

    #[test]
    fn short_flags_and_defaults() {
        let parsed = Harness::parse_from(["harness", "-e", "chairs", "-g", "2"]);
        assert_eq!(parsed.exp.experiment, "chairs");
        assert_eq!(parsed.exp.gpu, 2);
        assert_eq!(parsed.exp.experiment_dir(), PathBuf::from("exp_log/chairs"));
        assert_eq!(parsed.shapes.start, 0);
        assert_eq!(parsed.shapes.end, 1);
        assert!(parsed.shapes.subset.is_none());
    }

    #[test]
    fn experiment_is_required() {
        assert!(Harness::try_parse_from(["harness", "--start", "3"]).is_err());
    }
}

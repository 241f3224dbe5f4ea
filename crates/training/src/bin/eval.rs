use clap::Parser;
use training::{run_eval, EvalArgs};

fn main() -> anyhow::Result<()> {
    let args = EvalArgs::parse();
    cli_support::init_logging(args.experiment.verbose)?;
    let results = run_eval(args)?;
    if !results.is_empty() {
        let n = results.len() as f32;
        let mean_iou = results.iter().map(|r| r.metrics.iou).sum::<f32>() / n;
        let mean_mse = results.iter().map(|r| r.metrics.mse).sum::<f32>() / n;
        tracing::info!(shapes = results.len(), mean_iou, mean_mse, "evaluation finished");
    }
    Ok(())
}

use clap::Parser;
use training::{run_finetune, FinetuneArgs};

fn main() -> anyhow::Result<()> {
    let args = FinetuneArgs::parse();
    cli_support::init_logging(args.experiment.verbose)?;
    let summary = run_finetune(args)?;
    let saved = summary.shapes.iter().filter(|s| s.saved).count();
    tracing::info!(shapes = summary.shapes.len(), saved, "fine-tuning finished");
    Ok(())
}

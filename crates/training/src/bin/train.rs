use clap::Parser;
use training::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    cli_support::init_logging(args.experiment.verbose)?;
    let summary = run_train(args)?;
    tracing::info!(
        start_epoch = summary.start_epoch,
        end_epoch = summary.end_epoch,
        best_loss = ?summary.best_loss,
        "pretraining finished"
    );
    Ok(())
}

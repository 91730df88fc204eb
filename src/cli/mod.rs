// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train` — trains the HDR generator into experiments/<name>
//   2. `eval`  — scores the latest checkpoint on validation scenes
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, TrainArgs};

use crate::domain::options::Options;

#[derive(Parser, Debug)]
#[command(
    name = "hdr-generation",
    version = "0.1.0",
    about = "Train a multi-exposure HDR generator with a tonemapped pixel loss, then evaluate it."
)]
pub struct Cli {
    /// The subcommand to run (train or eval)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let opts = Options::try_from(args)?;
    tracing::info!("Starting experiment '{}' for {} iterations", opts.name, opts.train.niter);

    let summary = TrainUseCase::new(opts).execute()?;

    println!("Training complete after {} iterations.", summary.iterations);
    if let Some(v) = summary.last_validation {
        println!(
            "Last validation (iter {}): PSNR-L {:.2} dB | PSNR-mu {:.2} dB | best PSNR-mu {:.2} dB",
            v.iter, v.psnr_l, v.psnr_mu, summary.best_psnr_mu
        );
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::EvalUseCase;

    let report = EvalUseCase::new(&args.experiment_dir).execute()?;
    println!(
        "\n{} scenes | PSNR-L {:.2} dB | PSNR-mu {:.2} dB",
        report.scenes, report.psnr_l, report.psnr_mu
    );
    Ok(())
}

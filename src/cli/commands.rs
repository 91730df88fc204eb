// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `eval`
// and all their configurable flags.
//
// `train` starts from the defaults, or from an options JSON
// file given with --opt, then applies any flags on top. Flags
// left out keep whatever the file (or the default) says.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::{Context, Error, Result};
use clap::{Args, Subcommand};
use std::fs;

use crate::domain::options::Options;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the HDR generator
    Train(TrainArgs),

    /// Score the latest checkpoint of an experiment on its validation scenes
    Eval(EvalArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Options JSON file; flags below override its values
    #[arg(long)]
    pub opt: Option<String>,

    /// Experiment name (directory under --experiments-root)
    #[arg(long)]
    pub name: Option<String>,

    /// Root directory for experiment outputs
    #[arg(long)]
    pub experiments_root: Option<String>,

    /// Total training iterations
    #[arg(long)]
    pub niter: Option<usize>,

    /// Initial learning rate for Adam
    #[arg(long)]
    pub lr: Option<f64>,

    /// Samples per training batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Pixel loss: l1, l2, tanh_l1, tanh_l2
    #[arg(long)]
    pub pixel_criterion: Option<String>,

    /// LR schedule: MultiStepLR or CosineAnnealingLR_Restart
    #[arg(long)]
    pub lr_scheme: Option<String>,

    /// Linear warm-up length in iterations
    #[arg(long)]
    pub warmup_iter: Option<usize>,

    /// Run validation every N iterations (0 disables)
    #[arg(long)]
    pub val_freq: Option<usize>,

    /// Number of synthetic scenes
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Patch side length in pixels
    #[arg(long)]
    pub patch_size: Option<usize>,

    /// Network weights to start from
    #[arg(long)]
    pub pretrain_model_g: Option<String>,

    /// Training-state JSON to resume from
    #[arg(long)]
    pub resume_state: Option<String>,
}

/// Convert CLI TrainArgs into the run Options.
/// Fallible because --opt names a file that has to be read and parsed.
impl TryFrom<TrainArgs> for Options {
    type Error = Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut opts = match &a.opt {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read options file '{path}'"))?;
                Options::from_json_str(&json)
                    .with_context(|| format!("Invalid options file '{path}'"))?
            }
            None => Options::default(),
        };

        if let Some(v) = a.name             { opts.name = v; }
        if let Some(v) = a.experiments_root { opts.path.experiments_root = v; }
        if let Some(v) = a.niter            { opts.train.niter = v; }
        if let Some(v) = a.lr               { opts.train.lr_g = v; }
        if let Some(v) = a.batch_size       { opts.datasets.batch_size = v; }
        if let Some(v) = a.pixel_criterion  { opts.train.pixel_criterion = v; }
        if let Some(v) = a.lr_scheme        { opts.train.lr_scheme = v; }
        if let Some(v) = a.warmup_iter      { opts.train.warmup_iter = Some(v); }
        if let Some(v) = a.val_freq         { opts.train.val_freq = v; }
        if let Some(v) = a.num_samples      { opts.datasets.num_samples = v; }
        if let Some(v) = a.patch_size       { opts.datasets.patch_size = v; }
        if let Some(v) = a.pretrain_model_g { opts.path.pretrain_model_g = Some(v); }
        if let Some(v) = a.resume_state     { opts.path.resume_state = Some(v); }

        opts.is_train = true;
        opts.validate()?;
        Ok(opts)
    }
}

/// All arguments for the `eval` command
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Experiment directory written by `train`
    #[arg(long)]
    pub experiment_dir: String,
}

// ============================================================
// Layer 3 — Run Options
// ============================================================
// Every knob a training or evaluation run reads, grouped the
// same way the options file is laid out:
//
//   {
//     "name": "hdr_exposure_fusion",
//     "is_train": true,
//     "network_g": { "which_model_g": "exposure_fusion", ... },
//     "path":      { "experiments_root": "experiments", ... },
//     "train":     { "lr_g": 1e-4, "lr_scheme": "MultiStepLR", ... },
//     "logger":    { "print_freq": 10, ... },
//     "datasets":  { "num_samples": 64, ... },
//     "tonemap":   { "gamma": 2.24, "percentile": 99.0, "mu": 5000.0 }
//   }
//
// Choices such as `pixel_criterion` and `lr_scheme` stay plain
// strings here. They are parsed (and rejected if unknown) when the
// GenerationModel is constructed, so a bad options file fails at
// start-up rather than halfway through a run.
//
// #[serde(default)] on every group lets an options file list only
// the fields it wants to change.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Experiment name — also the directory under `path.experiments_root`
    pub name: String,

    /// false builds an inference-only model (no loss, optimiser or scheduler)
    pub is_train: bool,

    pub network_g: NetworkOptions,
    pub path:      PathOptions,
    pub train:     TrainOptions,
    pub logger:    LoggerOptions,
    pub datasets:  DatasetOptions,
    pub tonemap:   TonemapOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            name:      "hdr_exposure_fusion".to_string(),
            is_train:  true,
            network_g: NetworkOptions::default(),
            path:      PathOptions::default(),
            train:     TrainOptions::default(),
            logger:    LoggerOptions::default(),
            datasets:  DatasetOptions::default(),
            tonemap:   TonemapOptions::default(),
        }
    }
}

impl Options {
    /// Parse options from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let opts: Options = serde_json::from_str(json)
            .context("Options file is not valid JSON for this schema")?;
        opts.validate()?;
        Ok(opts)
    }

    /// Reject values that would only blow up later inside a tensor op
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Option 'name' must not be empty");
        }
        if self.network_g.num_exposures == 0 {
            bail!("network_g.num_exposures must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.tonemap.percentile) {
            bail!("tonemap.percentile must be in [0, 100], got {}", self.tonemap.percentile);
        }
        if self.tonemap.gamma <= 0.0 || self.tonemap.mu <= 0.0 {
            bail!("tonemap.gamma and tonemap.mu must be positive");
        }
        if self.datasets.batch_size == 0 {
            bail!("datasets.batch_size must be at least 1");
        }
        if self.datasets.patch_size == 0 {
            bail!("datasets.patch_size must be at least 1");
        }
        if self.datasets.exposure_values.len() != self.network_g.num_exposures {
            bail!(
                "datasets.exposure_values lists {} exposures but network_g.num_exposures is {}",
                self.datasets.exposure_values.len(),
                self.network_g.num_exposures
            );
        }
        Ok(())
    }

    /// experiments/<name>
    pub fn experiment_dir(&self) -> PathBuf {
        PathBuf::from(&self.path.experiments_root).join(&self.name)
    }
}

// ─── Network ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Which architecture the network factory should build
    pub which_model_g: String,

    /// Number of bracketed LDR exposures per sample
    pub num_exposures: usize,

    /// Feature channels in the hidden conv layers
    pub nf: usize,

    /// Number of hidden 3x3 conv layers
    pub num_blocks: usize,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            which_model_g: "exposure_fusion".to_string(),
            num_exposures: 3,
            nf:            32,
            num_blocks:    3,
        }
    }
}

// ─── Paths ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathOptions {
    pub experiments_root: String,

    /// Network weights to load before training / evaluation
    pub pretrain_model_g: Option<String>,

    /// Training-state JSON to resume from (restores scheduler + optimiser)
    pub resume_state: Option<String>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            experiments_root: "experiments".to_string(),
            pretrain_model_g: None,
            resume_state:     None,
        }
    }
}

// ─── Training ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    // Adam
    pub lr_g:           f64,
    pub beta1:          f64,
    pub beta2:          f64,
    pub weight_decay_g: Option<f64>,

    // Scheduler: "MultiStepLR" or "CosineAnnealingLR_Restart"
    pub lr_scheme:       String,
    pub lr_steps:        Vec<usize>,
    pub lr_gamma:        f64,
    pub restarts:        Vec<usize>,
    pub restart_weights: Vec<f64>,
    pub clear_state:     bool,
    pub t_period:        Vec<usize>,
    pub eta_min:         f64,

    /// Linear warm-up length in iterations (None disables warm-up)
    pub warmup_iter: Option<usize>,

    // Loss: "l1", "l2", "tanh_l1" or "tanh_l2"
    pub pixel_criterion: String,
    pub pixel_weight:    f64,

    /// Total number of training iterations
    pub niter:       usize,
    pub val_freq:    usize,
    pub manual_seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            lr_g:            1e-4,
            beta1:           0.9,
            beta2:           0.99,
            weight_decay_g:  None,
            lr_scheme:       "MultiStepLR".to_string(),
            lr_steps:        vec![400, 800],
            lr_gamma:        0.5,
            restarts:        Vec::new(),
            restart_weights: Vec::new(),
            clear_state:     false,
            t_period:        vec![1000],
            eta_min:         1e-7,
            warmup_iter:     None,
            pixel_criterion: "l1".to_string(),
            pixel_weight:    1.0,
            niter:           1000,
            val_freq:        200,
            manual_seed:     10,
        }
    }
}

// ─── Logger ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    pub print_freq:           usize,
    pub save_checkpoint_freq: usize,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self { print_freq: 10, save_checkpoint_freq: 500 }
    }
}

// ─── Datasets ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetOptions {
    /// Total synthetic scenes, split into train / validation
    pub num_samples: usize,

    /// Fraction of scenes used for training
    pub train_fraction: f64,

    /// Square patch side length in pixels
    pub patch_size: usize,

    pub batch_size: usize,

    /// Exposure value (EV stops) of each bracket, darkest first
    pub exposure_values: Vec<f32>,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            num_samples:     64,
            train_fraction:  0.8,
            patch_size:      32,
            batch_size:      4,
            exposure_values: vec![-2.0, 0.0, 2.0],
        }
    }
}

// ─── Tonemap ──────────────────────────────────────────────────────────────────
/// Parameters of the loss-domain tonemap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonemapOptions {
    /// Network outputs live in gamma space; raised to this to linearise
    pub gamma: f64,

    /// Percentile of the linear prediction used as the normalisation divisor
    pub percentile: f64,

    /// mu-law compression constant
    pub mu: f64,
}

impl Default for TonemapOptions {
    fn default() -> Self {
        Self { gamma: 2.24, percentile: 99.0, mu: 5000.0 }
    }
}

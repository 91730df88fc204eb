// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate options                  (Layer 3 - domain)
//   Step 2: Prepare experiment directory      (Layer 6 - infra)
//   Step 3: Point resume at its weights       (Layer 6 - infra)
//   Step 4: Save options for `eval`           (Layer 6 - infra)
//   Step 5: Split scenes train/validation     (Layer 4 - data)
//   Step 6: Build datasets                    (Layer 4 - data)
//   Step 7: Run training loop                 (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;

use crate::data::{
    dataset::{SceneConfig, SyntheticHdrDataset},
    splitter::split_train_val,
};
use crate::domain::options::Options;
use crate::infra::checkpoint::{load_training_state, CheckpointManager};
use crate::ml::{
    generation_model::NETWORK_LABEL,
    trainer::{run_training, TrainSummary},
};

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the options and runs the full training pipeline.
pub struct TrainUseCase {
    opts: Options,
}

impl TrainUseCase {
    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(mut self) -> Result<TrainSummary> {
        // ── Step 1: Validate ──────────────────────────────────────────────────
        self.opts.validate()?;

        // ── Step 2: Experiment directory ──────────────────────────────────────
        let ckpt = CheckpointManager::new(self.opts.experiment_dir())?;
        tracing::info!("Experiment directory: '{}'", ckpt.dir().display());

        // ── Step 3: Resume picks up the weights saved with the state ──────────
        if let Some(state_path) = &self.opts.path.resume_state {
            if self.opts.path.pretrain_model_g.is_none() {
                let state   = load_training_state(std::path::Path::new(state_path))?;
                let weights = ckpt.models_dir().join(format!("{}_{}", state.iter, NETWORK_LABEL));
                tracing::info!("Resuming: loading weights from '{}'", weights.display());
                self.opts.path.pretrain_model_g = Some(weights.display().to_string());
            }
        }

        // ── Step 4: Save options ──────────────────────────────────────────────
        ckpt.save_options(&self.opts)?;

        // ── Steps 5-6: Datasets ───────────────────────────────────────────────
        let (train_set, val_set) = build_datasets(&self.opts);
        tracing::info!(
            "Split: {} train, {} validation scenes",
            train_set.sample_count(),
            val_set.sample_count()
        );

        // ── Step 7: Training loop (Layer 5) ───────────────────────────────────
        run_training(&self.opts, train_set, val_set, &ckpt)
    }
}

/// Seeded train/validation split of the synthetic scenes.
/// `eval` calls this with the saved options to get the same validation set.
pub fn build_datasets(opts: &Options) -> (SyntheticHdrDataset, SyntheticHdrDataset) {
    let scenes  = SceneConfig::from_options(opts);
    let indices: Vec<usize> = (0..opts.datasets.num_samples).collect();
    let (train_idx, val_idx) =
        split_train_val(indices, opts.datasets.train_fraction, opts.train.manual_seed);

    (
        SyntheticHdrDataset::new(scenes.clone(), train_idx),
        SyntheticHdrDataset::new(scenes, val_idx),
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_opts(root: &std::path::Path) -> Options {
        let mut opts = Options::default();
        opts.name                        = "use_case".to_string();
        opts.path.experiments_root       = root.display().to_string();
        opts.network_g.num_exposures     = 2;
        opts.network_g.nf                = 4;
        opts.network_g.num_blocks        = 1;
        opts.datasets.num_samples        = 5;
        opts.datasets.patch_size         = 4;
        opts.datasets.batch_size         = 2;
        opts.datasets.exposure_values    = vec![-1.0, 1.0];
        opts.train.niter                 = 2;
        opts.train.val_freq              = 2;
        opts.logger.save_checkpoint_freq = 2;
        opts
    }

    #[test]
    fn test_split_is_reproducible() {
        let opts   = Options::default();
        let (a, b) = build_datasets(&opts);
        let (c, _) = build_datasets(&opts);
        assert_eq!(a.sample_count() + b.sample_count(), opts.datasets.num_samples);
        assert_eq!(a.sample_count(), c.sample_count());
    }

    #[test]
    fn test_execute_saves_options_and_weights() {
        let tmp  = tempfile::tempdir().unwrap();
        let opts = tiny_opts(tmp.path());
        let dir  = opts.experiment_dir();

        let summary = TrainUseCase::new(opts).execute().unwrap();
        assert_eq!(summary.iterations, 2);

        let ckpt = CheckpointManager::new(&dir).unwrap();
        assert_eq!(ckpt.load_options().unwrap().name, "use_case");
        assert!(ckpt.latest_network_path(NETWORK_LABEL).is_ok());
    }

    #[test]
    fn test_resume_fills_in_pretrained_weights() {
        let tmp  = tempfile::tempdir().unwrap();
        let opts = tiny_opts(tmp.path());
        let dir  = opts.experiment_dir();
        TrainUseCase::new(opts.clone()).execute().unwrap();

        let mut resumed = opts;
        resumed.train.niter = 4;
        resumed.path.resume_state =
            Some(dir.join("training_state").join("2.state.json").display().to_string());
        let summary = TrainUseCase::new(resumed).execute().unwrap();
        assert_eq!(summary.iterations, 4);

        let saved = CheckpointManager::new(&dir).unwrap().load_options().unwrap();
        assert!(saved.path.pretrain_model_g.unwrap().ends_with("2_G"));
    }
}

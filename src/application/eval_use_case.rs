// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores the latest checkpoint of a finished (or running)
// experiment on its validation scenes:
//
//   1. Read <experiment>/options.json
//   2. Rebuild the generator and load models/latest_G.json's target
//   3. Rebuild the seeded validation split
//   4. test() each scene and average PSNR-L / PSNR-mu

use anyhow::{bail, Result};
use burn::tensor::backend::Backend;
use std::path::PathBuf;

use crate::application::train_use_case::build_datasets;
use crate::data::batcher::HdrBatcher;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    generation_model::{create_model, NETWORK_LABEL},
    network::define_g,
    trainer::{validate, MyBackend},
};

/// Mean validation scores of one checkpoint
#[derive(Debug, Clone, Copy)]
pub struct EvalReport {
    pub scenes:  usize,
    pub psnr_l:  f64,
    pub psnr_mu: f64,
}

pub struct EvalUseCase {
    experiment_dir: PathBuf,
}

impl EvalUseCase {
    pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
        Self { experiment_dir: experiment_dir.into() }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        if !self.experiment_dir.is_dir() {
            bail!(
                "Experiment directory '{}' does not exist. Have you run 'train' first?",
                self.experiment_dir.display()
            );
        }
        let ckpt = CheckpointManager::new(&self.experiment_dir)?;

        // Inference-only model on the latest weights
        let mut opts = ckpt.load_options()?;
        opts.is_train              = false;
        opts.path.resume_state     = None;
        opts.path.pretrain_model_g = None;
        let weights = ckpt.latest_network_path(NETWORK_LABEL)?;

        let device: <MyBackend as Backend>::Device = Default::default();
        let net       = define_g::<MyBackend>(&opts, &device)?;
        let mut model = create_model(&opts, net, &device)?;
        model.load(&weights)?;

        let (_, val_set) = build_datasets(&opts);
        if val_set.sample_count() == 0 {
            bail!("Validation split is empty: datasets.train_fraction leaves no scenes");
        }

        let batcher = HdrBatcher::<MyBackend>::new(device);
        let acc     = validate(&mut model, &val_set, &batcher, &opts.tonemap)?;
        let (psnr_l, psnr_mu) = acc.means();

        tracing::info!("Evaluated {} scenes from '{}'", acc.count(), ckpt.dir().display());
        Ok(EvalReport { scenes: acc.count(), psnr_l, psnr_mu })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;
    use crate::domain::options::Options;

    #[test]
    fn test_eval_after_training() {
        let tmp = tempfile::tempdir().unwrap();
        let mut opts = Options::default();
        opts.name                        = "eval".to_string();
        opts.path.experiments_root       = tmp.path().display().to_string();
        opts.network_g.num_exposures     = 2;
        opts.network_g.nf                = 4;
        opts.network_g.num_blocks        = 1;
        opts.datasets.num_samples        = 6;
        opts.datasets.train_fraction     = 0.5;
        opts.datasets.patch_size         = 4;
        opts.datasets.batch_size         = 3;
        opts.datasets.exposure_values    = vec![-1.0, 1.0];
        opts.train.niter                 = 2;
        opts.train.val_freq              = 0;
        opts.logger.save_checkpoint_freq = 0;
        let dir = opts.experiment_dir();

        TrainUseCase::new(opts).execute().unwrap();

        let report = EvalUseCase::new(&dir).execute().unwrap();
        assert_eq!(report.scenes, 3);
        assert!(report.psnr_mu.is_finite());
    }

    #[test]
    fn test_missing_experiment() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(EvalUseCase::new(tmp.path().join("nope")).execute().is_err());
    }
}

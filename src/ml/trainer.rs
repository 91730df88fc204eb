// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Iteration-driven train + validation loop around GenerationModel.
//
// Per iteration:
//   update_learning_rate → feed_data → optimize_parameters
//
// Every print_freq iterations   log l_pix and LR
// Every val_freq iterations     test() over the validation scenes,
//                               mean PSNR-L / PSNR-mu → metrics.csv
// Every save_checkpoint_freq    network + training state
// After niter iterations        save the `latest` network
//
// Validation batches stay on MyBackend; test() drops to the inner
// backend itself.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::Optimizer,
    tensor::backend::{AutodiffBackend, Backend},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::path::Path;

use crate::data::{batcher::HdrBatcher, dataset::{HdrSample, SyntheticHdrDataset}};
use crate::domain::options::{Options, TonemapOptions};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, ValidationMetrics},
};
use crate::ml::{
    evaluation::{score_pair, PsnrAccumulator},
    generation_model::{create_model, GenerationModel},
    network::{define_g, HdrNetwork},
};

#[cfg(feature = "wgpu")]
pub type MyInnerBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type MyInnerBackend = burn::backend::NdArray;

pub type MyBackend = burn::backend::Autodiff<MyInnerBackend>;

/// What a finished run reports back to the application layer
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub iterations:      usize,
    pub best_psnr_mu:    f64,
    pub last_validation: Option<ValidationMetrics>,
}

pub fn run_training(
    opts:      &Options,
    train_set: SyntheticHdrDataset,
    val_set:   SyntheticHdrDataset,
    ckpt:      &CheckpointManager,
) -> Result<TrainSummary> {
    let device: <MyBackend as Backend>::Device = Default::default();
    tracing::info!("Using device: {:?}", device);
    train_loop::<MyBackend>(opts, train_set, val_set, ckpt, device)
}

pub fn train_loop<B: AutodiffBackend>(
    opts:      &Options,
    train_set: SyntheticHdrDataset,
    val_set:   SyntheticHdrDataset,
    ckpt:      &CheckpointManager,
    device:    B::Device,
) -> Result<TrainSummary> {
    let t = &opts.train;
    if train_set.is_empty() {
        bail!("Training set is empty: raise datasets.num_samples or datasets.train_fraction");
    }

    // ── Build network + model ─────────────────────────────────────────────────
    let net       = define_g::<B>(opts, &device)?;
    let mut model = create_model(opts, net, &device)?;
    let metrics   = MetricsLogger::new(ckpt.dir())?;
    tracing::info!("Validation metrics → '{}'", metrics.csv_path().display());
    let batcher   = HdrBatcher::<B>::new(device.clone());

    // ── Resume ────────────────────────────────────────────────────────────────
    let (start_epoch, mut current_step) = match &opts.path.resume_state {
        Some(path) => {
            let state = model.resume_training(Path::new(path))?;
            (state.epoch, state.iter)
        }
        None => (0, 0),
    };

    let batch_size      = opts.datasets.batch_size;
    let iters_per_epoch = train_set.len().div_ceil(batch_size);
    let total_epochs    = t.niter.div_ceil(iters_per_epoch);
    tracing::info!(
        "Number of train images: {}, iters per epoch: {}, total epochs: {}, total iters: {}",
        train_set.len(),
        iters_per_epoch,
        total_epochs,
        t.niter
    );
    tracing::info!("Start training from epoch: {}, iter: {}", start_epoch, current_step);

    let mut best_psnr_mu    = f64::NEG_INFINITY;
    let mut last_validation = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    'epochs: for epoch in start_epoch..=total_epochs {
        // Shuffle seeded per epoch so a resumed run sees the same order
        let mut order: Vec<usize> = (0..train_set.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(t.manual_seed.wrapping_add(epoch as u64)));

        for chunk in order.chunks(batch_size) {
            current_step += 1;
            if current_step > t.niter {
                break 'epochs;
            }

            model.update_learning_rate(current_step, t.warmup_iter)?;

            let items: Vec<HdrSample> = chunk.iter().filter_map(|&i| train_set.get(i)).collect();
            model.feed_data(batcher.batch(items)?, true)?;
            model.optimize_parameters(current_step)?;

            let lr = model.current_learning_rate().unwrap_or(f64::NAN);

            if every(current_step, opts.logger.print_freq) {
                tracing::info!(
                    "<epoch:{:3}, iter:{:8}, lr:{:.3e}> {}",
                    epoch,
                    current_step,
                    lr,
                    model.current_log().summary()
                );
            }

            // ── Validation ────────────────────────────────────────────────────
            if every(current_step, t.val_freq) && !val_set.is_empty() {
                let acc = validate(&mut model, &val_set, &batcher, &opts.tonemap)?;
                let (psnr_l, psnr_mu) = acc.means();
                let row = ValidationMetrics {
                    iter: current_step,
                    epoch,
                    lr,
                    l_pix: model.current_log().get("l_pix").unwrap_or(f64::NAN),
                    psnr_l,
                    psnr_mu,
                };
                metrics.log(&row)?;

                if row.is_improvement(best_psnr_mu) {
                    best_psnr_mu = psnr_mu;
                }
                tracing::info!(
                    "# Validation # PSNR-L: {:.4e}  PSNR-mu: {:.4e}  (best PSNR-mu {:.4e})",
                    psnr_l,
                    psnr_mu,
                    best_psnr_mu
                );
                last_validation = Some(row);
            }

            // ── Checkpoint ────────────────────────────────────────────────────
            if every(current_step, opts.logger.save_checkpoint_freq) {
                tracing::info!("Saving models and training states.");
                model.save(ckpt, &current_step.to_string())?;
                model.save_training_state(ckpt, epoch, current_step)?;
            }
        }
    }

    tracing::info!("Saving the final model.");
    model.save(ckpt, "latest")?;
    tracing::info!("End of training.");

    Ok(TrainSummary {
        iterations: current_step.min(t.niter),
        best_psnr_mu,
        last_validation,
    })
}

/// test() over every validation scene, one scene per batch.
pub fn validate<B, N, O>(
    model:   &mut GenerationModel<B, N, O>,
    val_set: &SyntheticHdrDataset,
    batcher: &HdrBatcher<B>,
    tonemap: &TonemapOptions,
) -> Result<PsnrAccumulator>
where
    B: AutodiffBackend,
    N: AutodiffModule<B> + HdrNetwork<B>,
    N::InnerModule: HdrNetwork<B::InnerBackend>,
    O: Optimizer<N, B>,
{
    let mut acc  = PsnrAccumulator::default();
    let mut peak = 0.0f32;
    for sample in val_set.iter() {
        model.feed_data(batcher.batch(vec![sample])?, true)?;
        model.test()?;

        let (Some(pred), Some(gt)) = (model.prediction(), model.ground_truth()) else {
            bail!("Validation produced no prediction");
        };
        let (psnr_l, psnr_mu) = score_pair(pred.clone(), gt.clone(), tonemap)?;
        acc.add(psnr_l, psnr_mu);
        peak = peak.max(model.current_visuals(false)?.result.max_value());
    }
    tracing::debug!("Validated {} scenes, peak prediction {:.4}", acc.count(), peak);
    Ok(acc)
}

/// `freq == 0` disables the event
fn every(step: usize, freq: usize) -> bool {
    freq > 0 && step % freq == 0
}

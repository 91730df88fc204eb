// ============================================================
// Layer 5 — GenerationModel
// ============================================================
// Wraps an HDR network with everything a training driver calls:
//
//   feed_data            store LDRs, exposures and (optionally) GT
//   optimize_parameters  forward → tonemap → pixel loss → backward → Adam
//   test                 no-grad forward on the inner backend
//   current_log          last training-step values ("l_pix")
//   current_visuals      first batch item copied to the host
//   update_learning_rate scheduler step + linear warm-up
//   save / load          network weights
//   save_training_state / resume_training
//
// The optimiser type is whatever AdamConfig::init produces for this
// network; `create_model` returns it as an opaque type, and the model
// keeps a fn pointer that builds a fresh one. That pointer is used
// both to clear Adam's moments at a scheduler restart and to give
// `resume_training` an optimiser to load a record into.
//
// Construction is where configuration is validated: an unknown
// pixel_criterion or lr_scheme fails before any tensor is touched.
//
// Reference: Burn Book §5 (Custom Training Loop)

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::{Path, PathBuf};

use crate::data::batcher::HdrBatch;
use crate::domain::{
    image::{HostImage, Visuals},
    log::TrainLog,
    options::{Options, TonemapOptions, TrainOptions},
};
use crate::infra::checkpoint::{
    load_network, load_optimizer_record, load_training_state, CheckpointManager, TrainingState,
};
use crate::ml::{
    loss::PixelCriterion,
    network::HdrNetwork,
    scheduler::LrScheduler,
    tonemap::normalize_pair,
};

/// Label used for the generator's checkpoint files
pub const NETWORK_LABEL: &str = "G";

/// Optimiser, loss and schedule — only present when `is_train` is set.
struct TrainState<O> {
    optimizer:     O,
    new_optimizer: fn(&AdamConfig) -> O,
    adam:          AdamConfig,
    criterion:     PixelCriterion,
    pixel_weight:  f64,
    scheduler:     LrScheduler,
    lr:            f64,
}

pub struct GenerationModel<B, N, O>
where
    B: AutodiffBackend,
{
    net:     N,
    device:  B::Device,
    tonemap: TonemapOptions,
    train:   Option<TrainState<O>>,

    ldrs:      Option<Tensor<B, 4>>,
    exposures: Option<Tensor<B, 2>>,
    real_h:    Option<Tensor<B, 4>>,
    fake_h:    Option<Tensor<B, 4>>,
    /// GT as shown in visuals: tonemapped after a training step, raw after test()
    visual_gt: Option<Tensor<B, 4>>,

    log: TrainLog,
}

fn adam_config(train: &TrainOptions) -> AdamConfig {
    let cfg = AdamConfig::new()
        .with_beta_1(train.beta1 as f32)
        .with_beta_2(train.beta2 as f32);
    match train.weight_decay_g.filter(|wd| *wd > 0.0) {
        Some(wd) => cfg.with_weight_decay(Some(WeightDecayConfig::new(wd as f32))),
        None     => cfg,
    }
}

/// Build a GenerationModel around `net`.
///
/// Loads `path.pretrain_model_g` if set. In training mode also builds the
/// pixel criterion, Adam and the LR scheduler; unknown names fail here.
pub fn create_model<B, N>(
    opts:   &Options,
    net:    N,
    device: &B::Device,
) -> Result<GenerationModel<B, N, impl Optimizer<N, B>>>
where
    B: AutodiffBackend,
    N: AutodiffModule<B> + HdrNetwork<B>,
    N::InnerModule: HdrNetwork<B::InnerBackend>,
{
    opts.validate()?;

    let train = if opts.is_train {
        let t         = &opts.train;
        let criterion = t.pixel_criterion.parse::<PixelCriterion>()?;
        let scheduler = LrScheduler::from_options(t.lr_g, t)?;
        let adam      = adam_config(t);
        Some(TrainState {
            optimizer:     adam.init::<B, N>(),
            new_optimizer: |cfg: &AdamConfig| cfg.init::<B, N>(),
            adam,
            criterion,
            pixel_weight:  t.pixel_weight,
            lr:            scheduler.lr(),
            scheduler,
        })
    } else {
        None
    };

    let net = match &opts.path.pretrain_model_g {
        Some(path) => {
            tracing::info!("Loading model for G [{}] ...", path);
            load_network::<B, N>(Path::new(path), net, device)?
        }
        None => net,
    };

    let model = GenerationModel {
        net,
        device:    device.clone(),
        tonemap:   opts.tonemap,
        train,
        ldrs:      None,
        exposures: None,
        real_h:    None,
        fake_h:    None,
        visual_gt: None,
        log:       TrainLog::new(),
    };
    model.print_network();
    if let Some(train) = &model.train {
        tracing::info!(
            "Training with {} loss (weight {}), Adam lr={:e}",
            train.criterion,
            train.pixel_weight,
            train.lr
        );
    }
    Ok(model)
}

impl<B, N, O> GenerationModel<B, N, O>
where
    B: AutodiffBackend,
    N: AutodiffModule<B> + HdrNetwork<B>,
    N::InnerModule: HdrNetwork<B::InnerBackend>,
    O: Optimizer<N, B>,
{
    /// Store a batch. With `need_gt` the batch must carry ground truth.
    pub fn feed_data(&mut self, batch: HdrBatch<B>, need_gt: bool) -> Result<()> {
        let [batch_size, channels, _, _] = batch.ldrs.dims();
        let [exp_batch, num_exposures]   = batch.exposures.dims();
        if exp_batch != batch_size || channels != num_exposures * 3 {
            bail!(
                "Batch shape mismatch: ldrs {:?} does not hold {} RGB exposures per sample",
                batch.ldrs.dims(),
                num_exposures
            );
        }
        if num_exposures != self.net.num_exposures() {
            bail!(
                "Batch has {} exposures per sample but the network expects {}",
                num_exposures,
                self.net.num_exposures()
            );
        }

        self.ldrs      = Some(batch.ldrs);
        self.exposures = Some(batch.exposures);
        self.real_h    = if need_gt {
            Some(batch.gt.ok_or_else(|| anyhow!("Ground truth requested but the batch has none"))?)
        } else {
            None
        };
        Ok(())
    }

    fn inputs(&self) -> Result<(Tensor<B, 4>, Tensor<B, 2>)> {
        match (&self.ldrs, &self.exposures) {
            (Some(ldrs), Some(exposures)) => Ok((ldrs.clone(), exposures.clone())),
            _ => bail!("No input data: call feed_data first"),
        }
    }

    /// One forward/backward pass and optimiser step.
    pub fn optimize_parameters(&mut self, step: usize) -> Result<()> {
        let (ldrs, exposures) = self.inputs()?;
        let real_h = self
            .real_h
            .clone()
            .ok_or_else(|| anyhow!("optimize_parameters needs ground truth: feed_data(.., true)"))?;
        let train = self
            .train
            .as_mut()
            .ok_or_else(|| anyhow!("optimize_parameters called on a model built with is_train = false"))?;

        let fake_h = self.net.forward(ldrs, exposures);
        let pair   = normalize_pair(&self.tonemap, fake_h, real_h)?;

        let l_pix = train
            .criterion
            .forward(pair.pred.clone(), pair.gt.clone())
            .mul_scalar(train.pixel_weight);
        let l_pix_value: f64 = l_pix.clone().into_scalar().elem::<f64>();

        // Backward pass + Adam update
        let grads = GradientsParams::from_grads(l_pix.backward(), &self.net);
        self.net  = train.optimizer.step(train.lr, self.net.clone(), grads);

        if !l_pix_value.is_finite() {
            tracing::warn!("Non-finite pixel loss at step {}: {}", step, l_pix_value);
        }
        tracing::trace!("step {} l_pix={:.6} norm={:.4}", step, l_pix_value, pair.norm);

        self.fake_h    = Some(pair.pred.detach());
        self.visual_gt = Some(pair.gt.detach());
        self.log.insert("l_pix", l_pix_value);
        Ok(())
    }

    /// Forward pass without autodiff, using the network in inference mode.
    pub fn test(&mut self) -> Result<()> {
        let (ldrs, exposures) = self.inputs()?;
        let net = self.net.valid();
        let out = net.forward(ldrs.inner(), exposures.inner());
        self.fake_h    = Some(Tensor::from_inner(out));
        self.visual_gt = self.real_h.clone();
        Ok(())
    }

    pub fn current_log(&self) -> &TrainLog {
        &self.log
    }

    /// Last prediction (raw after test(), tonemapped after a training step)
    pub fn prediction(&self) -> Option<&Tensor<B, 4>> {
        self.fake_h.as_ref()
    }

    /// Ground truth exactly as fed
    pub fn ground_truth(&self) -> Option<&Tensor<B, 4>> {
        self.real_h.as_ref()
    }

    /// First batch item of the inputs, prediction and (optionally) GT.
    pub fn current_visuals(&self, need_gt: bool) -> Result<Visuals> {
        let ldrs   = self.ldrs.as_ref().ok_or_else(|| anyhow!("No input data fed"))?;
        let result = self
            .fake_h
            .as_ref()
            .ok_or_else(|| anyhow!("No result yet: call test or optimize_parameters"))?;
        let gt = if need_gt {
            let gt = self.visual_gt.as_ref().ok_or_else(|| anyhow!("No ground truth fed"))?;
            Some(first_image(gt)?)
        } else {
            None
        };
        Ok(Visuals { ldrs: first_image(ldrs)?, result: first_image(result)?, gt })
    }

    /// Step the scheduler, then apply linear warm-up while
    /// `cur_iter < warmup_iter`.
    pub fn update_learning_rate(&mut self, cur_iter: usize, warmup_iter: Option<usize>) -> Result<()> {
        let train = self
            .train
            .as_mut()
            .ok_or_else(|| anyhow!("update_learning_rate called on a model built with is_train = false"))?;

        let step = train.scheduler.step();
        if step.clear_state {
            train.optimizer = (train.new_optimizer)(&train.adam);
            tracing::info!("Optimizer state cleared at restart (iter {})", cur_iter);
        }
        train.lr = step.lr;

        if let Some(warmup) = warmup_iter.filter(|w| cur_iter < *w) {
            let lr = train.scheduler.initial_lr() * cur_iter as f64 / warmup as f64;
            train.scheduler.set_lr(lr);
            train.lr = lr;
        }
        Ok(())
    }

    pub fn current_learning_rate(&self) -> Option<f64> {
        self.train.as_ref().map(|t| t.lr)
    }

    /// Save network weights as {iter_label}_G
    pub fn save(&self, ckpt: &CheckpointManager, iter_label: &str) -> Result<PathBuf> {
        ckpt.save_network::<B, N>(&self.net, NETWORK_LABEL, iter_label)
    }

    /// Replace network weights with the checkpoint at `path`
    pub fn load(&mut self, path: &Path) -> Result<()> {
        tracing::info!("Loading model for G [{}] ...", path.display());
        self.net = load_network::<B, N>(path, self.net.clone(), &self.device)?;
        Ok(())
    }

    /// Save scheduler + optimiser state for iteration `iter`.
    pub fn save_training_state(
        &self,
        ckpt:  &CheckpointManager,
        epoch: usize,
        iter:  usize,
    ) -> Result<PathBuf> {
        let train = self
            .train
            .as_ref()
            .ok_or_else(|| anyhow!("No training state on a model built with is_train = false"))?;
        ckpt.save_training_state::<B, _>(epoch, iter, &train.scheduler, train.optimizer.to_record())
    }

    /// Restore scheduler + optimiser state; returns the saved progress.
    pub fn resume_training(&mut self, state_path: &Path) -> Result<TrainingState> {
        let state = load_training_state(state_path)?;
        let record = load_optimizer_record::<B, O::Record>(state_path, &state, &self.device)
            .context("Cannot resume training")?;

        let train = self
            .train
            .as_mut()
            .ok_or_else(|| anyhow!("Cannot resume a model built with is_train = false"))?;
        train.optimizer = (train.new_optimizer)(&train.adam).load_record(record);
        train.scheduler = state.scheduler.clone();
        train.lr        = train.scheduler.lr();

        tracing::info!(
            "Resuming training from epoch {}, iter {} (scheduler at step {})",
            state.epoch,
            state.iter,
            train.scheduler.last_epoch()
        );
        Ok(state)
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    fn print_network(&self) {
        tracing::info!(
            "Network G structure: {}, with parameters: {}",
            std::any::type_name::<N>(),
            self.net.num_params()
        );
    }
}

/// Batch item 0 of a [B, C, H, W] tensor, copied to the host
fn first_image<B: Backend>(tensor: &Tensor<B, 4>) -> Result<HostImage> {
    let [_, c, h, w] = tensor.dims();
    let data = tensor
        .clone()
        .slice([0..1, 0..c, 0..h, 0..w])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot copy visual to host: {e:?}"))?;
    Ok(HostImage::new([c, h, w], data))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::HdrBatcher, dataset::SceneConfig};
    use crate::ml::network::{ExposureFusionConfig, ExposureFusionNet};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn small_opts() -> Options {
        let mut opts = Options::default();
        opts.network_g.num_exposures = 2;
        opts.network_g.nf            = 4;
        opts.network_g.num_blocks    = 1;
        opts.datasets.patch_size     = 6;
        opts.datasets.exposure_values = vec![-1.0, 1.0];
        opts.train.lr_g              = 1e-3;
        opts
    }

    fn small_net() -> ExposureFusionNet<TestBackend> {
        ExposureFusionConfig::new(2).with_nf(4).with_num_blocks(1).init(&Default::default())
    }

    fn batch(opts: &Options) -> HdrBatch<TestBackend> {
        let scenes  = SceneConfig::from_options(opts);
        let batcher = HdrBatcher::<TestBackend>::new(Default::default());
        batcher.batch(vec![scenes.generate(0), scenes.generate(1)]).unwrap()
    }

    #[test]
    fn test_optimize_step_records_loss_and_updates_weights() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        let before    = model.network().head.weight.val().into_data().to_vec::<f32>().unwrap();

        model.feed_data(batch(&opts), true).unwrap();
        model.optimize_parameters(1).unwrap();

        let l_pix = model.current_log().get("l_pix").unwrap();
        assert!(l_pix.is_finite() && l_pix >= 0.0);

        let after = model.network().head.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_loss_decreases_on_fixed_batch() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        model.feed_data(batch(&opts), true).unwrap();

        model.optimize_parameters(0).unwrap();
        let first = model.current_log().get("l_pix").unwrap();
        for step in 1..30 {
            model.optimize_parameters(step).unwrap();
        }
        let last = model.current_log().get("l_pix").unwrap();
        assert!(last < first, "loss did not drop: {first} → {last}");
    }

    #[test]
    fn test_unknown_loss_fails_at_construction() {
        let mut opts = small_opts();
        opts.train.pixel_criterion = "perceptual".to_string();
        let err = create_model(&opts, small_net(), &Default::default()).err().unwrap();
        assert!(err.to_string().contains("[perceptual] is not recognized"));
    }

    #[test]
    fn test_unknown_scheduler_fails_at_construction() {
        let mut opts = small_opts();
        opts.train.lr_scheme = "ExponentialLR".to_string();
        assert!(create_model(&opts, small_net(), &Default::default()).is_err());
    }

    #[test]
    fn test_optimize_requires_data_and_training_mode() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        assert!(model.optimize_parameters(0).is_err());

        let mut infer_opts = small_opts();
        infer_opts.is_train = false;
        let mut infer = create_model(&infer_opts, small_net(), &Default::default()).unwrap();
        infer.feed_data(batch(&infer_opts), true).unwrap();
        assert!(infer.optimize_parameters(0).is_err());
        assert!(infer.current_learning_rate().is_none());
    }

    #[test]
    fn test_evaluation_and_visuals() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        model.feed_data(batch(&opts), true).unwrap();
        model.test().unwrap();

        assert_eq!(model.prediction().unwrap().dims(), [2, 3, 6, 6]);

        let visuals = model.current_visuals(true).unwrap();
        assert_eq!(visuals.ldrs.shape,   [6, 6, 6]);
        assert_eq!(visuals.result.shape, [3, 6, 6]);
        assert_eq!(visuals.gt.unwrap().data.len(), 3 * 6 * 6);

        assert!(model.current_visuals(false).unwrap().gt.is_none());
    }

    #[test]
    fn test_feed_rejects_wrong_exposure_count() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();

        // Three brackets per scene for a network built for two
        let mut three = opts.clone();
        three.datasets.exposure_values = vec![-2.0, 0.0, 2.0];
        let scenes  = SceneConfig::from_options(&three);
        let batcher = HdrBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![scenes.generate(0)]).unwrap();

        let err = model.feed_data(batch, true).unwrap_err();
        assert!(err.to_string().contains("network expects 2"));
        assert!(model.optimize_parameters(1).is_err());
    }

    #[test]
    fn test_feed_without_gt() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        let mut b     = batch(&opts);
        b.gt = None;
        assert!(model.feed_data(b.clone(), true).is_err());
        model.feed_data(b, false).unwrap();
        model.test().unwrap();
        assert!(model.ground_truth().is_none());
    }

    #[test]
    fn test_warmup_scales_learning_rate() {
        let opts      = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        model.update_learning_rate(5, Some(10)).unwrap();
        let lr = model.current_learning_rate().unwrap();
        assert!((lr - 0.5e-3).abs() < 1e-12);

        model.update_learning_rate(10, Some(10)).unwrap();
        assert!((model.current_learning_rate().unwrap() - 0.5e-3).abs() < 1e-12);
    }

    #[test]
    fn test_restart_with_clear_state() {
        let mut opts = small_opts();
        opts.train.lr_steps        = vec![];
        opts.train.restarts        = vec![1];
        opts.train.restart_weights = vec![0.5];
        opts.train.clear_state     = true;
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();
        model.update_learning_rate(1, None).unwrap();
        model.update_learning_rate(2, None).unwrap();
        assert!((model.current_learning_rate().unwrap() - 0.5e-3).abs() < 1e-12);
    }

    #[test]
    fn test_load_replaces_weights() {
        let tmp   = tempfile::tempdir().unwrap();
        let ckpt  = CheckpointManager::new(tmp.path()).unwrap();
        let opts  = small_opts();

        let saved = create_model(&opts, small_net(), &Default::default()).unwrap();
        let path  = saved.save(&ckpt, "5").unwrap();

        let mut other = create_model(&opts, small_net(), &Default::default()).unwrap();
        other.load(&path).unwrap();

        let expected = saved.network().head.weight.val().into_data().to_vec::<f32>().unwrap();
        let loaded   = other.network().head.weight.val().into_data().to_vec::<f32>().unwrap();
        for (a, b) in expected.iter().zip(loaded.iter()) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let tmp       = tempfile::tempdir().unwrap();
        let mut model = create_model(&small_opts(), small_net(), &Default::default()).unwrap();
        assert!(model.load(&tmp.path().join("models").join("9_G")).is_err());
    }

    #[test]
    fn test_save_load_and_resume() {
        let tmp   = tempfile::tempdir().unwrap();
        let ckpt  = CheckpointManager::new(tmp.path()).unwrap();
        let opts  = small_opts();
        let mut model = create_model(&opts, small_net(), &Default::default()).unwrap();

        model.feed_data(batch(&opts), true).unwrap();
        model.update_learning_rate(1, None).unwrap();
        model.optimize_parameters(1).unwrap();
        model.save(&ckpt, "1").unwrap();
        let state_path = model.save_training_state(&ckpt, 0, 1).unwrap();

        // Fresh model picks up the saved weights via pretrain_model_g
        let mut reload_opts = opts.clone();
        reload_opts.path.pretrain_model_g =
            Some(ckpt.latest_network_path(NETWORK_LABEL).unwrap().display().to_string());
        let mut resumed = create_model(&reload_opts, small_net(), &Default::default()).unwrap();
        assert_eq!(resumed.network().num_params(), model.network().num_params());

        let state = resumed.resume_training(&state_path).unwrap();
        assert_eq!(state.iter, 1);
        assert_eq!(resumed.current_learning_rate(), model.current_learning_rate());

        resumed.feed_data(batch(&opts), true).unwrap();
        resumed.optimize_parameters(2).unwrap();
        assert!(resumed.current_log().get("l_pix").unwrap().is_finite());
    }
}

// ============================================================
// Layer 4 — HDR Batcher
// ============================================================
// Stacks a Vec<HdrSample> into device tensors:
//
//   ldrs:      [batch, num_exposures * 3, size, size]
//   exposures: [batch, num_exposures]
//   gt:        [batch, 3, size, size]
//
// All samples are flattened into one long Vec per field, turned
// into a 1D tensor, then reshaped. Every sample must share the patch
// size and exposure count; mixing them is reported as an error
// instead of producing a mis-shaped tensor.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::data::dataset::HdrSample;

/// A batch ready for `GenerationModel::feed_data`.
#[derive(Debug, Clone)]
pub struct HdrBatch<B: Backend> {
    pub ldrs:      Tensor<B, 4>,
    pub exposures: Tensor<B, 2>,
    /// None for inference-only inputs
    pub gt:        Option<Tensor<B, 4>>,
}

#[derive(Clone, Debug)]
pub struct HdrBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,
}

impl<B: Backend> HdrBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, items: Vec<HdrSample>) -> Result<HdrBatch<B>> {
        let Some(first) = items.first() else {
            bail!("Cannot build a batch from zero samples");
        };
        let batch_size = items.len();
        let size       = first.size;
        let n          = first.num_exposures();

        if let Some(bad) = items.iter().find(|s| s.size != size || s.num_exposures() != n) {
            bail!(
                "Samples in one batch must share shape: expected {n} exposures at {size}px, \
                 found {} at {}px",
                bad.num_exposures(),
                bad.size
            );
        }

        let ldrs_flat: Vec<f32> = items.iter().flat_map(|s| s.ldrs.iter().copied()).collect();
        let exp_flat:  Vec<f32> = items.iter().flat_map(|s| s.exposures.iter().copied()).collect();
        let gt_flat:   Vec<f32> = items.iter().flat_map(|s| s.gt.iter().copied()).collect();

        let ldrs = Tensor::<B, 1>::from_floats(ldrs_flat.as_slice(), &self.device)
            .reshape([batch_size, n * 3, size, size]);
        let exposures = Tensor::<B, 1>::from_floats(exp_flat.as_slice(), &self.device)
            .reshape([batch_size, n]);
        let gt = Tensor::<B, 1>::from_floats(gt_flat.as_slice(), &self.device)
            .reshape([batch_size, 3, size, size]);

        Ok(HdrBatch { ldrs, exposures, gt: Some(gt) })
    }
}

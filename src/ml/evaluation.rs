// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Two PSNR flavours are reported for HDR reconstruction:
//
//   PSNR-L   on linear values divided by a normaliser (max of GT)
//   PSNR-mu  after the same tanh + mu-law tonemap used for the
//            loss, but with the percentile taken from the REFERENCE
//            image so every method is scored against the same scale
//
// Reference: NTIRE 2021 HDR challenge evaluation

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::domain::options::TonemapOptions;
use crate::ml::tonemap::{linearize, tanh_norm_mu_tonemap, tensor_percentile, NORM_EPS};

/// -10 log10(mean((a - b)^2)); infinite for identical inputs
pub fn psnr<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> f64 {
    let mse: f64 = (a - b).powi_scalar(2).mean().into_scalar().elem::<f64>();
    if mse <= 0.0 {
        f64::INFINITY
    } else {
        -10.0 * mse.log10()
    }
}

/// PSNR of `res / norm` against `reference / norm`
pub fn normalized_psnr<B: Backend, const D: usize>(
    res:       Tensor<B, D>,
    reference: Tensor<B, D>,
    norm:      f32,
) -> f64 {
    let norm = norm.max(NORM_EPS);
    psnr(res.div_scalar(norm), reference.div_scalar(norm))
}

/// PSNR-mu: both images linearised, tonemapped with the reference's percentile
pub fn tonemapped_psnr<B: Backend, const D: usize>(
    res:       Tensor<B, D>,
    reference: Tensor<B, D>,
    cfg:       &TonemapOptions,
) -> Result<f64> {
    let ref_lin = linearize(reference, cfg.gamma);
    let res_lin = linearize(res, cfg.gamma);
    let norm    = tensor_percentile(&ref_lin, cfg.percentile)?.max(NORM_EPS);
    Ok(psnr(
        tanh_norm_mu_tonemap(res_lin, norm, cfg.mu),
        tanh_norm_mu_tonemap(ref_lin, norm, cfg.mu),
    ))
}

/// Largest value of a tensor, read back to the host
pub fn tensor_max<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<f32> {
    let values = tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read tensor values: {e:?}"))?;
    Ok(values.into_iter().filter(|v| v.is_finite()).fold(0.0f32, f32::max))
}

/// (PSNR-L, PSNR-mu) of one prediction against its reference.
/// PSNR-L linearises both and normalises by the linear reference maximum.
pub fn score_pair<B: Backend, const D: usize>(
    res:       Tensor<B, D>,
    reference: Tensor<B, D>,
    cfg:       &TonemapOptions,
) -> Result<(f64, f64)> {
    let ref_lin = linearize(reference.clone(), cfg.gamma);
    let norm    = tensor_max(&ref_lin)?;
    let psnr_l  = normalized_psnr(linearize(res.clone(), cfg.gamma), ref_lin, norm);
    let psnr_mu = tonemapped_psnr(res, reference, cfg)?;
    Ok((psnr_l, psnr_mu))
}

/// Running mean of PSNR values over a validation pass
#[derive(Debug, Clone, Copy, Default)]
pub struct PsnrAccumulator {
    psnr_l_sum:  f64,
    psnr_mu_sum: f64,
    count:       usize,
}

impl PsnrAccumulator {
    pub fn add(&mut self, psnr_l: f64, psnr_mu: f64) {
        self.psnr_l_sum  += psnr_l;
        self.psnr_mu_sum += psnr_mu;
        self.count       += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// (mean PSNR-L, mean PSNR-mu); NaN when nothing was added
    pub fn means(&self) -> (f64, f64) {
        if self.count == 0 {
            return (f64::NAN, f64::NAN);
        }
        let n = self.count as f64;
        (self.psnr_l_sum / n, self.psnr_mu_sum / n)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tensor(values: [f32; 4]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    #[test]
    fn test_psnr_known_value() {
        // mse = 0.01 → 20 dB
        let a = tensor([0.1, 0.1, 0.1, 0.1]);
        let b = tensor([0.0, 0.0, 0.0, 0.0]);
        assert!((psnr(a, b) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_psnr_identical_is_infinite() {
        let a = tensor([0.3, 0.6, 0.9, 1.2]);
        assert!(psnr(a.clone(), a).is_infinite());
    }

    #[test]
    fn test_normalized_psnr_scales() {
        // diff 1.0 normalised by 10 → mse 0.01 → 20 dB
        let a = tensor([1.0, 1.0, 1.0, 1.0]);
        let b = tensor([0.0, 0.0, 0.0, 0.0]);
        assert!((normalized_psnr(a, b, 10.0) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_tonemapped_psnr_prefers_closer_prediction() {
        let cfg       = TonemapOptions::default();
        let reference = tensor([0.2, 0.5, 1.0, 2.0]);
        let close     = tensor([0.21, 0.5, 1.0, 2.0]);
        let far       = tensor([0.8, 0.1, 0.3, 0.5]);
        let near_db = tonemapped_psnr(close, reference.clone(), &cfg).unwrap();
        let far_db  = tonemapped_psnr(far, reference, &cfg).unwrap();
        assert!(near_db > far_db);
    }

    #[test]
    fn test_accumulator_means() {
        let mut acc = PsnrAccumulator::default();
        assert!(acc.means().0.is_nan());
        acc.add(30.0, 40.0);
        acc.add(20.0, 30.0);
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.means(), (25.0, 35.0));
    }

    #[test]
    fn test_score_pair_perfect_prediction() {
        let reference = tensor([0.2, 0.5, 1.0, 2.0]);
        let (psnr_l, psnr_mu) = score_pair(reference.clone(), reference, &TonemapOptions::default()).unwrap();
        assert!(psnr_l.is_infinite() && psnr_mu.is_infinite());
    }

    #[test]
    fn test_tensor_max() {
        assert_eq!(tensor_max(&tensor([0.5, 3.0, 1.0, 2.0])).unwrap(), 3.0);
    }
}

// ============================================================
// Layer 5 — Tonemap Normalisation
// ============================================================
// The pixel loss is not computed on raw HDR values. Bright
// regions would dominate the gradient, so both prediction and
// ground truth are squeezed into [0, 1) first:
//
//   1. linearise:  x_lin = max(x, 0) ^ gamma
//   2. normalise:  n     = P_99(|pred_lin|)        (host-side percentile)
//   3. bound:      b     = tanh(x_lin / n)
//   4. mu-law:     y     = ln(1 + mu * b) / ln(1 + mu)
//
// The divisor n always comes from the PREDICTION and is applied
// to both tensors, so prediction and target stay comparable. It is
// read back to the host as a plain f32, which also means no
// gradient flows through the percentile itself.
//
// Reference: Kalantari & Ramamoorthi (2017) Deep HDR Imaging
//            NTIRE 2021 HDR challenge (PSNR-mu evaluation)

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;

use crate::domain::options::TonemapOptions;

/// Lower bound for the percentile divisor (an all-black prediction gives 0)
pub const NORM_EPS: f32 = 1e-8;

/// atanh is unbounded at 1, so inverse tonemapping clamps just below it
const ATANH_CLAMP: f32 = 1.0 - 1e-6;

/// Value at percentile `p` (0..=100) of `|values|`.
///
/// Uses linear interpolation between the two closest ranks, the
/// same rule numpy's default `percentile` uses:
///   rank = (n - 1) * p / 100
/// Non-finite values are skipped.
pub fn percentile(values: &[f32], p: f64) -> Result<f32> {
    if !(0.0..=100.0).contains(&p) {
        bail!("Percentile must be in [0, 100], got {p}");
    }

    let mut magnitudes: Vec<f32> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| v.abs())
        .collect();

    if magnitudes.is_empty() {
        bail!("Cannot take a percentile of a tensor with no finite values");
    }

    magnitudes.sort_unstable_by(f32::total_cmp);

    let rank = (magnitudes.len() - 1) as f64 * p / 100.0;
    let lo   = rank.floor() as usize;
    let hi   = rank.ceil() as usize;
    let frac = (rank - lo as f64) as f32;

    Ok(magnitudes[lo] + (magnitudes[hi] - magnitudes[lo]) * frac)
}

/// Copy a tensor to the host and take its percentile.
pub fn tensor_percentile<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    p:      f64,
) -> Result<f32> {
    let values = tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read tensor values for percentile: {e:?}"))?;
    percentile(&values, p)
}

/// Gamma-space → linear: max(x, 0) ^ gamma.
/// Negative inputs would otherwise produce NaN under a fractional power.
pub fn linearize<B: Backend, const D: usize>(x: Tensor<B, D>, gamma: f64) -> Tensor<B, D> {
    x.clamp_min(0.0).powf_scalar(gamma)
}

/// ln(1 + mu * x) / ln(1 + mu)
pub fn mu_tonemap<B: Backend, const D: usize>(hdr: Tensor<B, D>, mu: f64) -> Tensor<B, D> {
    hdr.mul_scalar(mu).log1p().div_scalar((1.0 + mu).ln())
}

/// mu_tonemap(tanh(x / norm))
pub fn tanh_norm_mu_tonemap<B: Backend, const D: usize>(
    hdr:  Tensor<B, D>,
    norm: f32,
    mu:   f64,
) -> Tensor<B, D> {
    mu_tonemap(hdr.div_scalar(norm).tanh(), mu)
}

/// (exp(y * ln(1 + mu)) - 1) / mu
pub fn inverse_mu_tonemap<B: Backend, const D: usize>(y: Tensor<B, D>, mu: f64) -> Tensor<B, D> {
    y.mul_scalar((1.0 + mu).ln()).exp().sub_scalar(1.0).div_scalar(mu)
}

/// norm * atanh(inverse_mu_tonemap(y))
pub fn inverse_tanh_norm_mu_tonemap<B: Backend, const D: usize>(
    y:    Tensor<B, D>,
    norm: f32,
    mu:   f64,
) -> Tensor<B, D> {
    let bounded = inverse_mu_tonemap(y, mu).clamp(-ATANH_CLAMP, ATANH_CLAMP);
    // atanh(b) = 0.5 * ln((1 + b) / (1 - b))
    let ratio = bounded.clone().add_scalar(1.0) / bounded.neg().add_scalar(1.0);
    ratio.log().mul_scalar(0.5 * norm)
}

/// Prediction and target in the loss domain, plus the divisor used.
#[derive(Debug, Clone)]
pub struct NormalizedPair<B: Backend, const D: usize> {
    pub pred: Tensor<B, D>,
    pub gt:   Tensor<B, D>,
    pub norm: f32,
}

/// Tonemap a gamma-space prediction and target with the
/// prediction's percentile as the shared divisor.
pub fn normalize_pair<B: Backend, const D: usize>(
    cfg:  &TonemapOptions,
    pred: Tensor<B, D>,
    gt:   Tensor<B, D>,
) -> Result<NormalizedPair<B, D>> {
    let pred_lin = linearize(pred, cfg.gamma);
    let gt_lin   = linearize(gt, cfg.gamma);

    let norm = tensor_percentile(&pred_lin, cfg.percentile)?.max(NORM_EPS);
    tracing::trace!("Tonemap divisor (p{}) = {:.6}", cfg.percentile, norm);

    Ok(NormalizedPair {
        pred: tanh_norm_mu_tonemap(pred_lin, norm, cfg.mu),
        gt:   tanh_norm_mu_tonemap(gt_lin, norm, cfg.mu),
        norm,
    })
}

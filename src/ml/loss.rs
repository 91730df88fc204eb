// ============================================================
// Layer 5 — Pixel Criterion
// ============================================================
// The pixel loss is evaluated in the tonemapped domain (see
// tonemap.rs). Four variants are selectable from the options file:
//
//   l1       mean |a - b|
//   l2       mean (a - b)^2
//   tanh_l1  mean |tanh a - tanh b|
//   tanh_l2  mean (tanh a - tanh b)^2
//
// Parsing happens once, when the GenerationModel is built, so an
// unknown name stops the run before any data is touched.

use anyhow::{bail, Result};
use burn::prelude::*;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelCriterion {
    L1,
    L2,
    TanhL1,
    TanhL2,
}

impl FromStr for PixelCriterion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l1"      => Ok(Self::L1),
            "l2"      => Ok(Self::L2),
            "tanh_l1" => Ok(Self::TanhL1),
            "tanh_l2" => Ok(Self::TanhL2),
            other     => bail!("Loss type [{other}] is not recognized."),
        }
    }
}

impl fmt::Display for PixelCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::L1     => "l1",
            Self::L2     => "l2",
            Self::TanhL1 => "tanh_l1",
            Self::TanhL2 => "tanh_l2",
        };
        f.write_str(name)
    }
}

impl PixelCriterion {
    /// Mean loss over every element → shape [1]
    pub fn forward<B: Backend, const D: usize>(
        &self,
        pred:   Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let (pred, target) = match self {
            Self::TanhL1 | Self::TanhL2 => (pred.tanh(), target.tanh()),
            Self::L1 | Self::L2         => (pred, target),
        };
        let diff = pred - target;
        match self {
            Self::L1 | Self::TanhL1 => diff.abs().mean(),
            Self::L2 | Self::TanhL2 => diff.powi_scalar(2).mean(),
        }
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

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_parse_known_names() {
        assert_eq!("l1".parse::<PixelCriterion>().unwrap(),      PixelCriterion::L1);
        assert_eq!("tanh_l2".parse::<PixelCriterion>().unwrap(), PixelCriterion::TanhL2);
        assert_eq!(PixelCriterion::TanhL1.to_string(), "tanh_l1");
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        let err = "ssim".parse::<PixelCriterion>().unwrap_err();
        assert!(err.to_string().contains("[ssim] is not recognized"));
    }

    #[test]
    fn test_l1_and_l2_values() {
        let a = tensor([0.0, 1.0, 2.0, 3.0]);
        let b = tensor([1.0, 1.0, 0.0, 3.0]);
        // |diff| = 1, 0, 2, 0
        assert!((scalar(PixelCriterion::L1.forward(a.clone(), b.clone())) - 0.75).abs() < 1e-6);
        // diff^2 = 1, 0, 4, 0
        assert!((scalar(PixelCriterion::L2.forward(a, b)) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_variant_saturates() {
        let a = tensor([10.0, 20.0, 30.0, 40.0]);
        let b = tensor([50.0, 60.0, 70.0, 80.0]);
        // Both sides saturate at tanh ≈ 1, plain L1 would be 40
        assert!(scalar(PixelCriterion::TanhL1.forward(a.clone(), b.clone())) < 1e-6);
        assert!(scalar(PixelCriterion::L1.forward(a, b)) > 39.0);
    }
}

// ============================================================
// Layer 3 — Host Images
// ============================================================
// A single image copied off the device: channel-major f32
// values plus its [channels, height, width] shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostImage {
    /// [channels, height, width]
    pub shape: [usize; 3],
    pub data:  Vec<f32>,
}

impl HostImage {
    pub fn new(shape: [usize; 3], data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Largest finite value, floored at 0.0
    pub fn max_value(&self) -> f32 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max)
    }
}

/// The visual outputs of the last training step or evaluation.
///
/// After a training step `result` and `gt` are in the tonemapped
/// loss domain; after `test()` they are raw network space.
#[derive(Debug, Clone)]
pub struct Visuals {
    /// All exposures stacked along the channel axis
    pub ldrs:   HostImage,
    pub result: HostImage,
    pub gt:     Option<HostImage>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_value_skips_non_finite() {
        let img = HostImage::new([1, 1, 4], vec![0.5, f32::NAN, 2.0, f32::INFINITY]);
        assert_eq!(img.max_value(), 2.0);
        assert_eq!(HostImage::new([1, 0, 0], vec![]).max_value(), 0.0);
    }
}

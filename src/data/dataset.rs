// ============================================================
// Layer 4 — Synthetic Multi-Exposure Dataset
// ============================================================
// Real bracketed-exposure datasets are loaded elsewhere; this
// dataset exists so the training driver can run end to end.
//
// Each scene is generated deterministically from (seed, index):
//
//   radiance(c, y, x) = tint[c] * ( base * ramp(x, y)
//                                 + intensity * gaussian(x, y) )
//
// i.e. a dim gradient plus one light source that is far brighter
// than the LDR range. From the radiance:
//
//   gt      = radiance ^ (1 / gamma)                  (gamma space)
//   ldr_i   = clip(radiance * 2^ev_i, 0, 1) ^ (1 / gamma)
//
// which reproduces what a camera bracket sees: dark exposures keep
// the light source, bright exposures keep the shadows.

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::options::Options;

/// One scene: all exposures, their EVs, and the HDR target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdrSample {
    /// [num_exposures * 3, size, size], channel-major
    pub ldrs:      Vec<f32>,
    /// EV stops, one per exposure
    pub exposures: Vec<f32>,
    /// [3, size, size], gamma space
    pub gt:        Vec<f32>,
    pub size:      usize,
}

impl HdrSample {
    pub fn num_exposures(&self) -> usize {
        self.exposures.len()
    }
}

/// Scene generator parameters
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub patch_size:      usize,
    pub exposure_values: Vec<f32>,
    pub gamma:           f32,
    pub seed:            u64,
}

impl SceneConfig {
    pub fn from_options(opts: &Options) -> Self {
        Self {
            patch_size:      opts.datasets.patch_size,
            exposure_values: opts.datasets.exposure_values.clone(),
            gamma:           opts.tonemap.gamma as f32,
            seed:            opts.train.manual_seed,
        }
    }

    /// Build scene `index`. The same (seed, index) always gives the same scene.
    pub fn generate(&self, index: usize) -> HdrSample {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ index as u64);
        let size    = self.patch_size;
        let inv_g   = 1.0 / self.gamma;

        let base:      f32 = rng.gen_range(0.05..0.6);
        let grad_x:    f32 = rng.gen_range(-0.5..0.5);
        let grad_y:    f32 = rng.gen_range(-0.5..0.5);
        let tint: [f32; 3] = [rng.gen_range(0.6..1.0), rng.gen_range(0.6..1.0), rng.gen_range(0.6..1.0)];
        let light_x:   f32 = rng.gen_range(0.0..1.0);
        let light_y:   f32 = rng.gen_range(0.0..1.0);
        let radius:    f32 = rng.gen_range(0.05..0.2);
        let intensity: f32 = rng.gen_range(4.0..40.0);

        let plane  = size * size;
        let denom  = (size.max(2) - 1) as f32;
        let mut radiance = vec![0.0f32; 3 * plane];
        for y in 0..size {
            for x in 0..size {
                let u    = x as f32 / denom;
                let v    = y as f32 / denom;
                let ramp = (1.0 + grad_x * u + grad_y * v).max(0.05);
                let d2   = (u - light_x).powi(2) + (v - light_y).powi(2);
                let glow = intensity * (-d2 / (2.0 * radius * radius)).exp();
                for (c, t) in tint.iter().enumerate() {
                    radiance[c * plane + y * size + x] = t * (base * ramp + glow);
                }
            }
        }

        let gt: Vec<f32> = radiance.iter().map(|r| r.powf(inv_g)).collect();

        let mut ldrs = Vec::with_capacity(self.exposure_values.len() * 3 * plane);
        for ev in &self.exposure_values {
            let gain = ev.exp2();
            ldrs.extend(radiance.iter().map(|r| (r * gain).clamp(0.0, 1.0).powf(inv_g)));
        }

        HdrSample { ldrs, exposures: self.exposure_values.clone(), gt, size }
    }
}

/// Dataset over a fixed list of scene indices (see splitter.rs)
pub struct SyntheticHdrDataset {
    scenes:  SceneConfig,
    indices: Vec<usize>,
}

impl SyntheticHdrDataset {
    pub fn new(scenes: SceneConfig, indices: Vec<usize>) -> Self {
        Self { scenes, indices }
    }

    pub fn sample_count(&self) -> usize { self.indices.len() }
}

impl Dataset<HdrSample> for SyntheticHdrDataset {
    fn get(&self, index: usize) -> Option<HdrSample> {
        self.indices.get(index).map(|&scene| self.scenes.generate(scene))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

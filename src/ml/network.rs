// ============================================================
// Layer 5 — HDR Network and Network Factory
// ============================================================
// The GenerationModel only needs something it can call as
//
//   forward(ldrs [B, N*3, H, W], exposures [B, N]) → hdr [B, 3, H, W]
//
// which is what HdrNetwork captures. `define_g` is the factory
// that turns `network_g.which_model_g` into a concrete network.
//
// ExposureFusionNet is a small reference architecture:
//   1. Each LDR is linearised with its own exposure:
//        lin_i = ldr_i ^ gamma / 2^ev_i
//      so all brackets land on the same radiance scale
//   2. LDRs and linearised copies are concatenated (N*6 channels)
//   3. A 3x3 conv stack with residual hidden layers
//   4. Softplus output: HDR values are non-negative and unbounded
//
// Reference: Burn Book §3 (Building Blocks)
//            Kalantari & Ramamoorthi (2017) Deep HDR Imaging

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softplus},
};
use std::f64::consts::LN_2;

use crate::domain::options::Options;

/// A network that fuses bracketed LDR exposures into one HDR image.
pub trait HdrNetwork<B: Backend> {
    fn forward(&self, ldrs: Tensor<B, 4>, exposures: Tensor<B, 2>) -> Tensor<B, 4>;

    /// Exposures per sample the network was built for
    fn num_exposures(&self) -> usize;
}

/// Build the generator named by `network_g.which_model_g`.
pub fn define_g<B: Backend>(opts: &Options, device: &B::Device) -> Result<ExposureFusionNet<B>> {
    let net = &opts.network_g;
    match net.which_model_g.as_str() {
        "exposure_fusion" => Ok(ExposureFusionConfig::new(net.num_exposures)
            .with_nf(net.nf)
            .with_num_blocks(net.num_blocks)
            .with_gamma(opts.tonemap.gamma)
            .init(device)),
        other => bail!("Generator model [{other}] is not recognized."),
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
#[derive(Config, Debug)]
pub struct ExposureFusionConfig {
    pub num_exposures: usize,
    #[config(default = 32)]
    pub nf: usize,
    #[config(default = 3)]
    pub num_blocks: usize,
    #[config(default = 2.24)]
    pub gamma: f64,
}

impl ExposureFusionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ExposureFusionNet<B> {
        let conv = |in_c: usize, out_c: usize| -> Conv2d<B> {
            Conv2dConfig::new([in_c, out_c], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        let head = conv(self.num_exposures * 6, self.nf);
        let body = (0..self.num_blocks).map(|_| conv(self.nf, self.nf)).collect();
        let tail = conv(self.nf, 3);
        ExposureFusionNet {
            head, body, tail,
            num_exposures: self.num_exposures,
            gamma:         self.gamma,
        }
    }
}

#[derive(Module, Debug)]
pub struct ExposureFusionNet<B: Backend> {
    pub head:          Conv2d<B>,
    pub body:          Vec<Conv2d<B>>,
    pub tail:          Conv2d<B>,
    pub num_exposures: usize,
    pub gamma:         f64,
}

impl<B: Backend> HdrNetwork<B> for ExposureFusionNet<B> {
    fn forward(&self, ldrs: Tensor<B, 4>, exposures: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = ldrs.dims();
        let n = self.num_exposures;
        debug_assert_eq!(channels, n * 3, "expected {n} RGB exposures, got {channels} channels");

        // 2^ev per exposure, repeated over RGB → [batch, N*3, H, W]
        let scale = exposures
            .mul_scalar(LN_2)
            .exp()
            .reshape([batch, n, 1])
            .repeat_dim(2, 3)
            .reshape([batch, n * 3, 1, 1])
            .expand([batch, n * 3, height, width]);
        let linear = ldrs.clone().clamp_min(0.0).powf_scalar(self.gamma) / scale;

        let mut x = relu(self.head.forward(Tensor::cat(vec![ldrs, linear], 1)));
        for conv in &self.body {
            x = relu(conv.forward(x.clone())) + x;
        }
        softplus(self.tail.forward(x), 1.0)
    }

    fn num_exposures(&self) -> usize {
        self.num_exposures
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_shape_and_range() {
        let device = Default::default();
        let net: ExposureFusionNet<TestBackend> = ExposureFusionConfig::new(3)
            .with_nf(8)
            .with_num_blocks(1)
            .init(&device);

        let ldrs      = Tensor::<TestBackend, 4>::ones([2, 9, 5, 7], &device).mul_scalar(0.5);
        let exposures = Tensor::<TestBackend, 2>::from_floats([[-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]], &device);

        let out = net.forward(ldrs, exposures);
        assert_eq!(out.dims(), [2, 3, 5, 7]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_factory_builds_from_options() {
        let mut opts = Options::default();
        opts.network_g.nf = 4;
        let net = define_g::<TestBackend>(&opts, &Default::default()).unwrap();
        assert_eq!(HdrNetwork::num_exposures(&net), 3);
        assert_eq!(net.body.len(), opts.network_g.num_blocks);
    }

    #[test]
    fn test_factory_rejects_unknown_model() {
        let mut opts = Options::default();
        opts.network_g.which_model_g = "unet".to_string();
        assert!(define_g::<TestBackend>(&opts, &Default::default()).is_err());
    }
}

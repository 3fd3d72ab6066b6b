use std::path::Path;

use candle_core::{Device, Result, Tensor};
use candle_nn::{
    conv2d, conv_transpose2d, embedding, linear, Conv2d, Conv2dConfig, ConvTranspose2d,
    ConvTranspose2dConfig, Embedding, Linear, Module, VarBuilder,
};

use super::leaky_relu;
use crate::config::ModelConfig;

/// Conditional generator.
///
/// ```text
/// label ─ Embedding ─ Linear(e, h²) ─ [B,1,h,h] ────────────────────┐
/// z ─ Linear(latent, g·h²) ─ LeakyReLU ─ [B,g,h,h] ─────────────────┴ cat
///   ─ ConvT 3×3 /1 ─ LeakyReLU ─ ConvT 4×4 ×2 ─ LeakyReLU ─ Conv2d k×k ─ tanh
/// ```
/// with `h = H/2`; the output is `[B, 1, H, H]` in `[-1, 1]`.
pub struct Generator {
    label_emb: Embedding,
    label_proj: Linear,
    latent_proj: Linear,
    up_same: ConvTranspose2d,
    up_double: ConvTranspose2d,
    out: Conv2d,
    filters: usize,
    half: usize,
    latent_dim: usize,
    slope: f64,
}

impl Generator {
    pub fn new(cfg: &ModelConfig, image: usize, vb: VarBuilder) -> Result<Self> {
        let half = image / 2;
        let g = cfg.gen_filters;
        let label_emb = embedding(cfg.n_classes, cfg.embedding_dim, vb.pp("label_emb"))?;
        let label_proj = linear(cfg.embedding_dim, half * half, vb.pp("label_proj"))?;
        let latent_proj = linear(cfg.latent_dim, g * half * half, vb.pp("latent_proj"))?;

        let same = ConvTranspose2dConfig { padding: 1, stride: 1, ..Default::default() };
        let double = ConvTranspose2dConfig { padding: 1, stride: 2, ..Default::default() };
        let up_same = conv_transpose2d(g + 1, g, 3, same, vb.pp("up_same"))?;
        let up_double = conv_transpose2d(g, g, 4, double, vb.pp("up_double"))?;

        let k = cfg.gen_out_kernel;
        let out_cfg = Conv2dConfig { padding: k / 2, ..Default::default() };
        let out = conv2d(g, 1, k, out_cfg, vb.pp("out"))?;

        Ok(Self {
            label_emb,
            label_proj,
            latent_proj,
            up_same,
            up_double,
            out,
            filters: g,
            half,
            latent_dim: cfg.latent_dim,
            slope: cfg.leaky_slope,
        })
    }

    /// `z` `[B, latent]` and `labels` `[B]` (u32) → images `[B, 1, H, H]`.
    pub fn forward(&self, z: &Tensor, labels: &Tensor) -> Result<Tensor> {
        let (b, h) = (z.dim(0)?, self.half);
        let cond = self
            .label_proj
            .forward(&self.label_emb.forward(labels)?)?
            .reshape((b, 1, h, h))?;
        let x = leaky_relu(&self.latent_proj.forward(z)?, self.slope)?.reshape((b, self.filters, h, h))?;
        let x = Tensor::cat(&[&x, &cond], 1)?;
        let x = leaky_relu(&self.up_same.forward(&x)?, self.slope)?;
        let x = leaky_relu(&self.up_double.forward(&x)?, self.slope)?;
        self.out.forward(&x)?.tanh()
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn image_size(&self) -> usize {
        2 * self.half
    }

    /// Image side stored in a generator checkpoint, read from the shape of
    /// the label projection (`[h², e]`).
    pub fn image_size_from_checkpoint(path: &Path) -> Result<usize> {
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        let w = tensors
            .get("label_proj.weight")
            .ok_or_else(|| candle_core::Error::Msg(format!("{}: no label_proj.weight", path.display())))?;
        let area = w.dim(0)?;
        let half = (area as f64).sqrt().round() as usize;
        if half * half != area {
            return Err(candle_core::Error::Msg(format!("label projection of {area} is not square")));
        }
        Ok(2 * half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny() -> ModelConfig {
        ModelConfig {
            n_classes: 3,
            latent_dim: 5,
            embedding_dim: 4,
            gen_filters: 4,
            gen_out_kernel: 3,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn output_shape_and_range() {
        let dev = Device::Cpu;
        let vm = VarMap::new();
        let g = Generator::new(&tiny(), 8, VarBuilder::from_varmap(&vm, DType::F32, &dev)).unwrap();
        let z = Tensor::randn(0f32, 1.0, (3, 5), &dev).unwrap();
        let y = Tensor::new(&[0u32, 1, 2], &dev).unwrap();
        let out = g.forward(&z, &y).unwrap();
        assert_eq!(out.dims(), &[3, 1, 8, 8]);
        let v: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(v.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn image_size_read_back_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("generator_test.safetensors");
        let dev = Device::Cpu;
        let vm = VarMap::new();
        Generator::new(&tiny(), 10, VarBuilder::from_varmap(&vm, DType::F32, &dev)).unwrap();
        vm.save(&p).unwrap();
        assert_eq!(Generator::image_size_from_checkpoint(&p).unwrap(), 10);
    }
}

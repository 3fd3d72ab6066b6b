use candle_core::{Result, Tensor};
use candle_nn::{
    conv2d, embedding, linear, Conv2d, Conv2dConfig, Dropout, Embedding, Linear, Module, ModuleT,
    VarBuilder,
};

use super::leaky_relu;
use crate::config::{Activation, ModelConfig};

/// Conditional discriminator / classifier.
///
/// ```text
/// label ─ Embedding(n_classes, e) ─ Linear(e, H·H) ─ [B,1,H,H] ─┐
/// image [B,1,H,H] ──────────────────────────────────────────────┴ cat ─ [B,2,H,H]
///   ─ (Conv2d 3×3 /2 ─ LeakyReLU) × k ─ flatten ─ Dropout ─ Linear(·, n_classes) ─ act
/// ```
pub struct Discriminator {
    label_emb: Embedding,
    label_proj: Linear,
    convs: Vec<Conv2d>,
    dropout: Dropout,
    head: Linear,
    activation: Activation,
    slope: f64,
    image: usize,
}

impl Discriminator {
    pub fn new(cfg: &ModelConfig, image: usize, vb: VarBuilder) -> Result<Self> {
        let label_emb = embedding(cfg.n_classes, cfg.embedding_dim, vb.pp("label_emb"))?;
        let label_proj = linear(cfg.embedding_dim, image * image, vb.pp("label_proj"))?;

        let conv_cfg = Conv2dConfig { padding: 1, stride: 2, ..Default::default() };
        let mut convs = Vec::with_capacity(cfg.disc_filters.len());
        let mut in_ch = 2;
        for (i, &out_ch) in cfg.disc_filters.iter().enumerate() {
            convs.push(conv2d(in_ch, out_ch, 3, conv_cfg, vb.pp(format!("conv{i}")))?);
            in_ch = out_ch;
        }

        let head = linear(cfg.disc_flat_dim(image), cfg.n_classes, vb.pp("head"))?;
        Ok(Self {
            label_emb,
            label_proj,
            convs,
            dropout: Dropout::new(cfg.dropout),
            head,
            activation: cfg.activation,
            slope: cfg.leaky_slope,
            image,
        })
    }

    /// Class scores `[B, n_classes]` for `images` `[B,1,H,H]` and `labels` `[B]` (u32).
    pub fn forward(&self, images: &Tensor, labels: &Tensor, train: bool) -> Result<Tensor> {
        let b = images.dim(0)?;
        let cond = self
            .label_proj
            .forward(&self.label_emb.forward(labels)?)?
            .reshape((b, 1, self.image, self.image))?;
        let mut x = Tensor::cat(&[images, &cond], 1)?;
        for conv in &self.convs {
            x = leaky_relu(&conv.forward(&x)?, self.slope)?;
        }
        let x = self.dropout.forward_t(&x.flatten_from(1)?, train)?;
        activate(&self.head.forward(&x)?, self.activation)
    }

    pub fn image_size(&self) -> usize {
        self.image
    }
}

fn activate(xs: &Tensor, act: Activation) -> Result<Tensor> {
    match act {
        Activation::Relu => xs.relu(),
        Activation::Softmax => candle_nn::ops::softmax_last_dim(xs),
        Activation::Sigmoid => candle_nn::ops::sigmoid(xs),
        Activation::Linear => Ok(xs.clone()),
    }
}

//! Pipeline configuration.
//!
//! [`Config`] holds every tunable parameter of the four pipeline stages.  All
//! fields are `pub` with defaults matching the reference experiment, so a
//! config can be built with struct-update syntax or loaded from a partial
//! TOML file (missing keys fall back to the defaults):
//!
//! ```
//! use imspeech::config::{Config, TrainingConfig};
//!
//! let cfg = Config {
//!     training: TrainingConfig { epochs: 5, ..TrainingConfig::default() },
//!     ..Config::default()
//! };
//! assert_eq!(cfg.model.latent_dim, 1000);
//! ```
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segment: SegmentConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

/// Raw recording → trial files → dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Subject codes; each has a directory under the base directory and a
    /// column group in the evidence sheet.
    pub subjects: Vec<String>,

    /// Line-noise notch frequencies in Hz.
    ///
    /// Default: `60, 120, 180, 240`.
    pub notch_freqs: Vec<f32>,

    /// Transition bandwidth of each notch in Hz.  Sets the FIR length
    /// (`⌈6.6 / trans_bw · sfreq⌉`, odd).
    ///
    /// Default: `1.0`.
    pub notch_trans_bw: f32,

    /// Channels removed when the dataset is assembled.
    ///
    /// Matching is case-insensitive and ignores spaces.
    pub drop_channels: Vec<String>,

    /// Fixed trial length in samples.  `None` crops every trial to the
    /// shortest one.
    pub trial_samples: Option<usize>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            subjects: ["MM05", "MM10", "MM11", "MM16", "MM18", "MM19", "MM21", "P02"]
                .map(String::from)
                .to_vec(),
            notch_freqs: vec![60.0, 120.0, 180.0, 240.0],
            notch_trans_bw: 1.0,
            drop_channels: ["M1", "M2", "EKG", "EMG", "Trigger"].map(String::from).to_vec(),
            trial_samples: None,
        }
    }
}

/// Feature normalisation applied after channel convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormMethod {
    /// Zero mean, unit variance per feature.
    Standardize,
    /// `[0, 1]` per feature.
    Normalize,
    /// `[lo, hi]` per feature, see [`FeatureConfig::norm_range`].
    NormalizeRange,
}

/// Dataset → windowed, channel-convolved, normalised features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Window length in samples.  The trial length must be a multiple.
    ///
    /// Default: `1000`.
    pub window: usize,

    /// Half-open observation ranges forming the training split.
    pub train_ranges: Vec<(usize, usize)>,

    /// Half-open observation ranges forming the test split.
    pub test_ranges: Vec<(usize, usize)>,

    pub norm: NormMethod,

    /// Target range of [`NormMethod::NormalizeRange`].
    pub norm_range: (f32, f32),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window: 1000,
            train_ranges: vec![(0, 361), (492, 993)],
            test_ranges: vec![(361, 492)],
            norm: NormMethod::Standardize,
            norm_range: (-1.0, 1.0),
        }
    }
}

impl FeatureConfig {
    /// Windows cut from a trial of `n_samples`.
    pub fn window_count(&self, n_samples: usize) -> usize {
        crate::window::window_count(n_samples, self.window)
    }
}

/// Output activation of the discriminator head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Softmax,
    Sigmoid,
    Linear,
}

/// Training loss of the discriminator and the combined model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    Mse,
    CategoricalCrossentropy,
}

/// cGAN architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of prompt classes.  Default: `11`.
    pub n_classes: usize,
    /// Generator noise dimension.  Default: `1000`.
    pub latent_dim: usize,
    /// Label embedding width in both networks.  Default: `62`.
    pub embedding_dim: usize,
    /// Output channels of the stride-2 discriminator convolutions.
    pub disc_filters: Vec<usize>,
    pub dropout: f32,
    pub activation: Activation,
    pub loss: LossKind,
    /// Feature maps of both generator transposed convolutions.
    pub gen_filters: usize,
    /// Kernel of the generator's final convolution; odd.
    pub gen_out_kernel: usize,
    pub leaky_slope: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_classes: 11,
            latent_dim: 1000,
            embedding_dim: 62,
            disc_filters: vec![128, 128],
            dropout: 0.4,
            activation: Activation::Relu,
            loss: LossKind::Mse,
            gen_filters: 128,
            gen_out_kernel: 31,
            leaky_slope: 0.2,
        }
    }
}

impl ModelConfig {
    /// Spatial size after the discriminator's stride-2 convolutions.
    pub fn disc_out_size(&self, image: usize) -> usize {
        self.disc_filters.iter().fold(image, |s, _| (s + 1) / 2)
    }

    /// Flattened feature count entering the discriminator head.
    pub fn disc_flat_dim(&self, image: usize) -> usize {
        let s = self.disc_out_size(image);
        self.disc_filters.last().copied().unwrap_or(2) * s * s
    }

    /// The generator upsamples `image/2` by two, so the image side must be even.
    pub fn check_image_size(&self, image: usize) -> Result<()> {
        if image < 2 || image % 2 != 0 {
            bail!("image side must be even and at least 2, got {image}");
        }
        Ok(())
    }
}

/// Optimiser and loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    /// Combined-model batch; each discriminator update sees half of it.
    pub batch_size: usize,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    /// Seed for batch sampling and latent noise.
    pub seed: u64,
    /// Batch size used when evaluating on whole splits.
    pub eval_batch_size: usize,
    pub checkpoint_dir: String,
    /// Save every `n` epochs; `0` only saves at the end.
    pub checkpoint_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 128,
            learning_rate: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            seed: 42,
            eval_batch_size: 256,
            checkpoint_dir: "checkpoints".to_string(),
            checkpoint_every: 0,
        }
    }
}

impl Config {
    /// Load from a TOML file; missing keys take their defaults.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Config = toml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("write config {}", path.display()))?;
        Ok(())
    }

    /// `from_toml` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_toml(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (f, m, t) = (&self.features, &self.model, &self.training);
        if self.segment.notch_trans_bw <= 0.0 {
            bail!("notch transition bandwidth must be > 0");
        }
        if f.window == 0 {
            bail!("window length must be > 0");
        }
        for &(a, b) in f.train_ranges.iter().chain(&f.test_ranges) {
            if a > b {
                bail!("observation range [{a}, {b}) is reversed");
            }
        }
        if f.norm_range.0 >= f.norm_range.1 {
            bail!("normalisation range {:?} is empty", f.norm_range);
        }
        if m.n_classes < 2 {
            bail!("need at least two classes");
        }
        if m.latent_dim == 0 || m.embedding_dim == 0 || m.gen_filters == 0 {
            bail!("latent, embedding and generator widths must be > 0");
        }
        if m.disc_filters.is_empty() || m.disc_filters.contains(&0) {
            bail!("discriminator needs at least one non-empty convolution");
        }
        if !(0.0..1.0).contains(&m.dropout) {
            bail!("dropout must be in [0, 1)");
        }
        if m.gen_out_kernel % 2 == 0 {
            bail!("generator output kernel must be odd, got {}", m.gen_out_kernel);
        }
        if t.batch_size < 2 {
            bail!("batch size must be at least 2");
        }
        if t.epochs == 0 || t.eval_batch_size == 0 {
            bail!("epochs and evaluation batch size must be > 0");
        }
        if t.learning_rate <= 0.0 {
            bail!("learning rate must be > 0");
        }
        Ok(())
    }
}

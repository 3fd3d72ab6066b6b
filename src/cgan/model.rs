use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use super::{Discriminator, Generator};
use crate::config::{ModelConfig, TrainingConfig};

/// Paths written by [`Cgan::save`].
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub generator: PathBuf,
    pub discriminator: PathBuf,
    pub combined: PathBuf,
}

impl ModelFiles {
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            generator: dir.join(format!("generator_{stem}.safetensors")),
            discriminator: dir.join(format!("discriminator_{stem}.safetensors")),
            combined: dir.join(format!("cgan_{stem}.safetensors")),
        }
    }
}

/// Generator + discriminator with separate variable sets.
///
/// The combined forward pass runs the generator into the discriminator.  An
/// optimiser built by [`Cgan::gen_optimizer`] only holds generator variables,
/// so a combined update leaves the discriminator untouched.
pub struct Cgan {
    pub generator: Generator,
    pub discriminator: Discriminator,
    gen_vars: VarMap,
    disc_vars: VarMap,
    cfg: ModelConfig,
    device: Device,
}

impl Cgan {
    /// Fresh model for `image × image` inputs.
    pub fn new(cfg: &ModelConfig, image: usize, device: &Device) -> Result<Self> {
        cfg.check_image_size(image)?;
        let gen_vars = VarMap::new();
        let disc_vars = VarMap::new();
        let generator = Generator::new(cfg, image, VarBuilder::from_varmap(&gen_vars, DType::F32, device))?;
        let discriminator =
            Discriminator::new(cfg, image, VarBuilder::from_varmap(&disc_vars, DType::F32, device))?;
        tracing::debug!(
            image,
            generator_params = count_params(&gen_vars),
            discriminator_params = count_params(&disc_vars),
            "cgan built"
        );
        Ok(Self { generator, discriminator, gen_vars, disc_vars, cfg: cfg.clone(), device: device.clone() })
    }

    /// Build for `image` and load `generator_<stem>` / `discriminator_<stem>` from `dir`.
    pub fn load(cfg: &ModelConfig, image: usize, dir: &Path, stem: &str, device: &Device) -> Result<Self> {
        let mut model = Self::new(cfg, image, device)?;
        let files = ModelFiles::in_dir(dir, stem);
        model.load_generator(&files.generator)?;
        model.load_discriminator(&files.discriminator)?;
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn image_size(&self) -> usize {
        self.discriminator.image_size()
    }

    /// Class scores of generated images conditioned on `labels`.
    pub fn gan_forward(&self, z: &Tensor, labels: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let fake = self.generator.forward(z, labels)?;
        self.discriminator.forward(&fake, labels, train)
    }

    pub fn disc_optimizer(&self, t: &TrainingConfig) -> Result<AdamW> {
        Ok(AdamW::new(self.disc_vars.all_vars(), adam_params(t))?)
    }

    pub fn gen_optimizer(&self, t: &TrainingConfig) -> Result<AdamW> {
        Ok(AdamW::new(self.gen_vars.all_vars(), adam_params(t))?)
    }

    /// Write generator, discriminator and combined weights into `dir`.
    pub fn save(&self, dir: &Path, stem: &str) -> Result<ModelFiles> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let files = ModelFiles::in_dir(dir, stem);
        self.gen_vars
            .save(&files.generator)
            .with_context(|| format!("save {}", files.generator.display()))?;
        self.disc_vars
            .save(&files.discriminator)
            .with_context(|| format!("save {}", files.discriminator.display()))?;

        let mut all: HashMap<String, Tensor> = HashMap::new();
        for (prefix, vars) in [("generator", &self.gen_vars), ("discriminator", &self.disc_vars)] {
            let data = vars.data().lock().map_err(|_| anyhow!("variable map lock poisoned"))?;
            for (name, var) in data.iter() {
                all.insert(format!("{prefix}.{name}"), var.as_tensor().clone());
            }
        }
        candle_core::safetensors::save(&all, &files.combined)
            .with_context(|| format!("save {}", files.combined.display()))?;
        Ok(files)
    }

    pub fn load_generator(&mut self, path: &Path) -> Result<()> {
        self.gen_vars.load(path).with_context(|| format!("load generator {}", path.display()))
    }

    pub fn load_discriminator(&mut self, path: &Path) -> Result<()> {
        self.disc_vars
            .load(path)
            .with_context(|| format!("load discriminator {}", path.display()))
    }
}

fn adam_params(t: &TrainingConfig) -> ParamsAdamW {
    ParamsAdamW {
        lr: t.learning_rate,
        beta1: t.beta1,
        beta2: t.beta2,
        eps: 1e-7,
        weight_decay: 0.0,
    }
}

fn count_params(vars: &VarMap) -> usize {
    vars.all_vars().iter().map(|v| v.elem_count()).sum()
}

//! Alternating cGAN training.
//!
//! Per batch (`half = batch / 2`):
//!
//! 1. `half` real images → discriminator update against their one-hot class;
//! 2. `half` generated images → discriminator update against the one-hot of
//!    the conditioning class;
//! 3. `batch` latent points → combined update (generator only) against the
//!    one-hot of the conditioning class.
//!
//! After each epoch the discriminator is evaluated on the whole training
//! and test splits.
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use candle_nn::Optimizer;
use ndarray::{Array1, Array2, Array3, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::info;

use crate::cgan::{accuracy, compute_loss, Cgan, Generator};
use crate::config::{ModelConfig, TrainingConfig};
use crate::dataset::{labels_to_onehot, LabeledSet};
use crate::evaluate::{evaluate, images_tensor, labels_tensor, matrix_tensor, Evaluation};

/// Images with their labels and one-hot targets.
pub struct Batch {
    /// `[n, 1, H, W]`.
    pub images: Tensor,
    /// `[n]` u32.
    pub labels: Tensor,
    /// `[n, n_classes]`.
    pub targets: Tensor,
}

/// Generator inputs.
pub struct LatentPoints {
    /// `[n, latent_dim]`, standard normal.
    pub z: Tensor,
    pub labels: Tensor,
    pub label_ids: Array1<u32>,
}

/// `n` real images drawn uniformly with replacement.
pub fn generate_real_samples<R: Rng>(
    set: &LabeledSet,
    n: usize,
    n_classes: usize,
    rng: &mut R,
    device: &Device,
) -> Result<Batch> {
    let sample = set.sample(rng, n)?;
    Ok(Batch {
        images: images_tensor(&sample, device)?,
        labels: labels_tensor(&sample.y.to_vec(), device)?,
        targets: matrix_tensor(&labels_to_onehot(&sample.y, n_classes)?, device)?,
    })
}

/// `n` standard-normal latent vectors with uniformly drawn class labels.
pub fn generate_latent_points<R: Rng>(
    latent_dim: usize,
    n: usize,
    n_classes: usize,
    rng: &mut R,
    device: &Device,
) -> Result<LatentPoints> {
    let z: Vec<f32> = (0..n * latent_dim).map(|_| rng.sample(StandardNormal)).collect();
    let label_ids: Array1<u32> = (0..n).map(|_| rng.gen_range(0..n_classes as u32)).collect();
    Ok(LatentPoints {
        z: Tensor::from_vec(z, (n, latent_dim), device)?,
        labels: labels_tensor(&label_ids.to_vec(), device)?,
        label_ids,
    })
}

/// `n` generated images with the one-hot of their conditioning labels.
///
/// The images are detached, so a discriminator update on them does not
/// reach the generator.
pub fn generate_fake_samples<R: Rng>(
    generator: &Generator,
    n: usize,
    n_classes: usize,
    rng: &mut R,
    device: &Device,
) -> Result<Batch> {
    let p = generate_latent_points(generator.latent_dim(), n, n_classes, rng, device)?;
    Ok(Batch {
        images: generator.forward(&p.z, &p.labels)?.detach(),
        labels: p.labels,
        targets: matrix_tensor(&labels_to_onehot(&p.label_ids, n_classes)?, device)?,
    })
}

/// `n` generated images `[n, H, W]` all conditioned on `class`.
pub fn generate_class_samples<R: Rng>(
    generator: &Generator,
    class: u32,
    n: usize,
    rng: &mut R,
    device: &Device,
) -> Result<Array3<f32>> {
    let latent = generator.latent_dim();
    let z: Vec<f32> = (0..n * latent).map(|_| rng.sample(StandardNormal)).collect();
    let z = Tensor::from_vec(z, (n, latent), device)?;
    let labels = labels_tensor(&vec![class; n], device)?;
    let side = generator.image_size();
    let images: Vec<f32> = generator.forward(&z, &labels)?.flatten_all()?.to_vec1()?;
    Ok(Array3::from_shape_vec((n, side, side), images)?)
}

/// Loss / accuracy record of a training run.
#[derive(Debug, Clone)]
pub struct History {
    /// `[2, E]`: loss and accuracy on the training split after each epoch.
    pub train: Array2<f32>,
    /// `[2, E]`: same on the test split; NaN when it is empty.
    pub test: Array2<f32>,
    /// `[2, B, E]`: combined-model loss and accuracy of every batch.
    pub batch: Array3<f32>,
    /// `[B, E]`: discriminator loss on real images.
    pub d_real: Array2<f32>,
    /// `[B, E]`: discriminator loss on generated images.
    pub d_fake: Array2<f32>,
}

impl History {
    pub fn new(epochs: usize, batches: usize) -> Self {
        Self {
            train: Array2::zeros((2, epochs)),
            test: Array2::zeros((2, epochs)),
            batch: Array3::zeros((2, batches, epochs)),
            d_real: Array2::zeros((batches, epochs)),
            d_fake: Array2::zeros((batches, epochs)),
        }
    }

    pub fn epochs(&self) -> usize {
        self.train.ncols()
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.d_real.nrows()
    }

    fn set_epoch(&mut self, e: usize, train: Evaluation, test: Evaluation) {
        self.train[[0, e]] = train.loss;
        self.train[[1, e]] = train.accuracy;
        self.test[[0, e]] = test.loss;
        self.test[[1, e]] = test.accuracy;
    }

    /// Named arrays for [`crate::io::save_arrays`].
    pub fn arrays(&self) -> Vec<(&'static str, ArrayD<f32>)> {
        vec![
            ("history", self.train.clone().into_dyn()),
            ("thistory", self.test.clone().into_dyn()),
            ("history_batch", self.batch.clone().into_dyn()),
            ("d_real", self.d_real.clone().into_dyn()),
            ("d_fake", self.d_fake.clone().into_dyn()),
        ]
    }
}

/// Runs the alternating update loop on a [`Cgan`].
pub struct Trainer {
    config: TrainingConfig,
    model_cfg: ModelConfig,
    rng: StdRng,
}

impl Trainer {
    pub fn new(config: TrainingConfig, model_cfg: ModelConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, model_cfg, rng }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train for `config.epochs` epochs of `len(train) / batch` batches.
    ///
    /// A training split smaller than one batch gives zero batches per epoch;
    /// the per-epoch evaluation still runs.  An empty test split records
    /// NaN loss and accuracy.
    pub fn train(&mut self, model: &Cgan, train: &LabeledSet, test: &LabeledSet) -> Result<History> {
        let t = &self.config;
        ensure!(t.batch_size >= 2, "batch size must be at least 2, got {}", t.batch_size);
        let (h, w) = train.item_shape();
        ensure!(h == w && h == model.image_size(), "features are {h}×{w}, model expects {0}×{0}", model.image_size());
        let (n_classes, loss_kind) = (self.model_cfg.n_classes, self.model_cfg.loss);
        let dev = model.device().clone();

        let batches = train.len() / t.batch_size;
        let half = t.batch_size / 2;
        let mut history = History::new(t.epochs, batches);
        let mut d_opt = model.disc_optimizer(t)?;
        let mut g_opt = model.gen_optimizer(t)?;

        info!(
            epochs = t.epochs,
            batches,
            batch_size = t.batch_size,
            train = train.len(),
            test = test.len(),
            "starting training"
        );
        let started = Instant::now();

        for epoch in 0..t.epochs {
            for j in 0..batches {
                let real = generate_real_samples(train, half, n_classes, &mut self.rng, &dev)?;
                let out = model.discriminator.forward(&real.images, &real.labels, true)?;
                let d1 = compute_loss(loss_kind, &out, &real.targets)?;
                d_opt.backward_step(&d1)?;

                let fake = generate_fake_samples(&model.generator, half, n_classes, &mut self.rng, &dev)?;
                let out = model.discriminator.forward(&fake.images, &fake.labels, true)?;
                let d2 = compute_loss(loss_kind, &out, &fake.targets)?;
                d_opt.backward_step(&d2)?;

                let p = generate_latent_points(self.model_cfg.latent_dim, t.batch_size, n_classes, &mut self.rng, &dev)?;
                let targets = matrix_tensor(&labels_to_onehot(&p.label_ids, n_classes)?, &dev)?;
                let out = model.gan_forward(&p.z, &p.labels, true)?;
                let g = compute_loss(loss_kind, &out, &targets)?;
                let acc = accuracy(&out, &targets)?;
                g_opt.backward_step(&g)?;

                let (d1, d2, g) = (d1.to_scalar::<f32>()?, d2.to_scalar::<f32>()?, g.to_scalar::<f32>()?);
                history.batch[[0, j, epoch]] = g;
                history.batch[[1, j, epoch]] = acc;
                history.d_real[[j, epoch]] = d1;
                history.d_fake[[j, epoch]] = d2;
                info!(
                    ">{}/{}, {}/{}, d1={:.3}, d2={:.3} g={:.3} acc={:.3} ({:.1}s)",
                    epoch + 1,
                    t.epochs,
                    j + 1,
                    batches,
                    d1,
                    d2,
                    g,
                    acc,
                    started.elapsed().as_secs_f32()
                );
            }

            let on_train = evaluate(&model.discriminator, train, t.eval_batch_size, loss_kind, n_classes, &dev)?;
            let on_test = if test.is_empty() {
                Evaluation { loss: f32::NAN, accuracy: f32::NAN }
            } else {
                evaluate(&model.discriminator, test, t.eval_batch_size, loss_kind, n_classes, &dev)?
            };
            history.set_epoch(epoch, on_train, on_test);
            info!(
                epoch = epoch + 1,
                train_loss = on_train.loss,
                train_acc = on_train.accuracy,
                test_loss = on_test.loss,
                test_acc = on_test.accuracy,
                "epoch done"
            );

            if t.checkpoint_every > 0 && (epoch + 1) % t.checkpoint_every == 0 {
                let dir = PathBuf::from(&t.checkpoint_dir);
                let files = model.save(&dir, &format!("epoch{:03}", epoch + 1))?;
                info!(path = %files.combined.display(), "checkpoint saved");
            }
        }
        Ok(history)
    }
}

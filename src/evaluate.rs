//! Classifier evaluation: loss / accuracy on a split, confusion matrix,
//! macro precision and recall.
use anyhow::{ensure, Result};
use candle_core::{Device, Tensor};
use ndarray::{Array2, Axis};

use crate::cgan::{accuracy, compute_loss, Discriminator};
use crate::config::LossKind;
use crate::dataset::{labels_to_onehot, LabeledSet};

/// Loss and accuracy of the discriminator on one split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// `[n, H, W]` observations → `[n, 1, H, W]` tensor.
pub fn images_tensor(set: &LabeledSet, device: &Device) -> candle_core::Result<Tensor> {
    let (n, h, w) = set.x.dim();
    Tensor::from_iter(set.x.iter().copied(), device)?.reshape((n, 1, h, w))
}

pub fn labels_tensor(labels: &[u32], device: &Device) -> candle_core::Result<Tensor> {
    Tensor::from_slice(labels, labels.len(), device)
}

pub fn matrix_tensor(a: &Array2<f32>, device: &Device) -> candle_core::Result<Tensor> {
    Tensor::from_iter(a.iter().copied(), device)?.reshape(a.dim())
}

/// Class scores `[n, n_classes]` for every observation of `set`, in
/// inference mode, `batch` at a time.
pub fn predict(disc: &Discriminator, set: &LabeledSet, batch: usize, device: &Device) -> Result<Array2<f32>> {
    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(set.len());
    for chunk in set.batches(batch) {
        let labels = chunk.y.to_vec();
        let out = disc.forward(&images_tensor(&chunk, device)?, &labels_tensor(&labels, device)?, false)?;
        rows.extend(out.to_vec2::<f32>()?);
    }
    let k = rows.first().map_or(0, Vec::len);
    Ok(Array2::from_shape_vec((rows.len(), k), rows.concat())?)
}

/// Mean loss and accuracy of `disc` on `set` against one-hot labels.
pub fn evaluate(
    disc: &Discriminator,
    set: &LabeledSet,
    batch: usize,
    loss: LossKind,
    n_classes: usize,
    device: &Device,
) -> Result<Evaluation> {
    ensure!(!set.is_empty(), "cannot evaluate on an empty split");
    let scores = predict(disc, set, batch, device)?;
    let pred = matrix_tensor(&scores, device)?;
    let target = matrix_tensor(&labels_to_onehot(&set.y, n_classes)?, device)?;
    Ok(Evaluation {
        loss: compute_loss(loss, &pred, &target)?.to_scalar::<f32>()?,
        accuracy: accuracy(&pred, &target)?,
    })
}

/// Row-wise arg-max of class scores.
pub fn argmax_rows(scores: &Array2<f32>) -> Vec<u32> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0 as u32
        })
        .collect()
}

/// `counts[[truth, predicted]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    pub counts: Array2<u64>,
}

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[u32], pred: &[u32], n_classes: usize) -> Result<Self> {
        ensure!(truth.len() == pred.len(), "{} labels vs {} predictions", truth.len(), pred.len());
        let mut counts = Array2::<u64>::zeros((n_classes, n_classes));
        for (&t, &p) in truth.iter().zip(pred) {
            ensure!((t as usize) < n_classes && (p as usize) < n_classes, "class out of range: {t} / {p}");
            counts[[t as usize, p as usize]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.diag().sum() as f64 / total as f64
    }

    /// Of everything predicted as `class`, the fraction that was `class`.
    pub fn precision(&self, class: usize) -> f64 {
        ratio(self.counts[[class, class]], self.counts.column(class).sum())
    }

    /// Of everything truly `class`, the fraction predicted as `class`.
    pub fn recall(&self, class: usize) -> f64 {
        ratio(self.counts[[class, class]], self.counts.row(class).sum())
    }

    pub fn precision_macro(&self) -> f64 {
        (0..self.n_classes()).map(|c| self.precision(c)).sum::<f64>() / self.n_classes() as f64
    }

    pub fn recall_macro(&self) -> f64 {
        (0..self.n_classes()).map(|c| self.recall(c)).sum::<f64>() / self.n_classes() as f64
    }
}

fn ratio(hit: u64, of: u64) -> f64 {
    if of == 0 {
        0.0
    } else {
        hit as f64 / of as f64
    }
}

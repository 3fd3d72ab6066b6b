//! Assembled datasets, train/test splits and minibatch sampling.
use anyhow::{bail, ensure, Result};
use ndarray::{concatenate, s, Array1, Array2, Array3, Axis};
use rand::Rng;

use crate::error::PreprocessError;

/// Observations `[start, stop)` belonging to one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRange {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

impl SubjectRange {
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

/// Every trial of every subject, cropped to a common length.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// `[N, C, T]`.
    pub x: Array3<f32>,
    /// Prompt class of each trial, `[N]`.
    pub y: Array1<u32>,
    /// Contiguous subject blocks in observation order.
    pub subjects: Vec<SubjectRange>,
    pub ch_names: Vec<String>,
    pub sfreq: f32,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn subject_range(&self, name: &str) -> Option<&SubjectRange> {
        self.subjects.iter().find(|s| s.name == name)
    }

    /// Hold out `subject` as the test split; every other subject trains.
    pub fn leave_one_subject_out(&self, subject: &str) -> Result<Split> {
        let Some(held) = self.subject_range(subject) else {
            bail!("dataset has no subject {subject}");
        };
        let train: Vec<(usize, usize)> = self
            .subjects
            .iter()
            .filter(|s| s.name != subject)
            .map(|s| (s.start, s.stop))
            .collect();
        split_by_ranges(&self.x, &self.y, &train, &[(held.start, held.stop)])
    }
}

/// Observations `[N, A, B]` with one label each.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub x: Array3<f32>,
    pub y: Array1<u32>,
}

impl LabeledSet {
    pub fn new(x: Array3<f32>, y: Array1<u32>) -> Result<Self> {
        if x.len_of(Axis(0)) != y.len() {
            return Err(PreprocessError::LabelCountMismatch {
                observations: x.len_of(Axis(0)),
                labels: y.len(),
            }
            .into());
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// `(A, B)` of one observation.
    pub fn item_shape(&self) -> (usize, usize) {
        let (_, a, b) = self.x.dim();
        (a, b)
    }

    /// `n` observations drawn uniformly with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<LabeledSet> {
        ensure!(!self.is_empty(), "cannot sample from an empty set");
        let idx: Vec<usize> = (0..n).map(|_| rng.gen_range(0..self.len())).collect();
        Ok(self.select(&idx))
    }

    pub fn select(&self, idx: &[usize]) -> LabeledSet {
        LabeledSet {
            x: self.x.select(Axis(0), idx),
            y: self.y.select(Axis(0), idx),
        }
    }

    /// Consecutive chunks of at most `size` observations.
    pub fn batches(&self, size: usize) -> impl Iterator<Item = LabeledSet> + '_ {
        let size = size.max(1);
        (0..self.len()).step_by(size).map(move |start| {
            let stop = (start + size).min(self.len());
            LabeledSet {
                x: self.x.slice(s![start..stop, .., ..]).to_owned(),
                y: self.y.slice(s![start..stop]).to_owned(),
            }
        })
    }
}

/// A train/test partition.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: LabeledSet,
    pub test: LabeledSet,
}

/// One-hot encode `labels` into `[len, n_classes]`.
pub fn labels_to_onehot(labels: &Array1<u32>, n_classes: usize) -> Result<Array2<f32>> {
    let mut out = Array2::<f32>::zeros((labels.len(), n_classes));
    for (i, &l) in labels.iter().enumerate() {
        ensure!((l as usize) < n_classes, "label {l} out of range for {n_classes} classes");
        out[[i, l as usize]] = 1.0;
    }
    Ok(out)
}

/// Train = the `train` ranges concatenated in order; test likewise.
///
/// Ranges are half-open observation indices and must lie inside `x`.
pub fn split_by_ranges(
    x: &Array3<f32>,
    y: &Array1<u32>,
    train: &[(usize, usize)],
    test: &[(usize, usize)],
) -> Result<Split> {
    let n = x.len_of(Axis(0));
    if n != y.len() {
        return Err(PreprocessError::LabelCountMismatch { observations: n, labels: y.len() }.into());
    }
    let gather = |ranges: &[(usize, usize)]| -> Result<LabeledSet> {
        for &(a, b) in ranges {
            ensure!(a <= b && b <= n, "range [{a}, {b}) outside {n} observations");
        }
        let idx: Vec<usize> = ranges.iter().flat_map(|&(a, b)| a..b).collect();
        Ok(LabeledSet { x: x.select(Axis(0), &idx), y: y.select(Axis(0), &idx) })
    };
    Ok(Split { train: gather(train)?, test: gather(test)? })
}

/// Stack two sets along the observation axis.
pub fn concat_sets(a: &LabeledSet, b: &LabeledSet) -> Result<LabeledSet> {
    Ok(LabeledSet {
        x: concatenate(Axis(0), &[a.x.view(), b.x.view()])?,
        y: concatenate(Axis(0), &[a.y.view(), b.y.view()])?,
    })
}

//! Signal- and feature-space normalisation.
//!
//! `sgn_norm` / `sgn_std`: per channel of a single recording `[C, T]`:
//!   x[c, :] = (x[c, :] - min_c) / (max_c - min_c)
//!   x[c, :] = (x[c, :] - μ_c) / σ_c          (σ with ddof = 0)
//!
//! `feature_norm` / `feature_std` / `feature_norm_range`: per feature over
//! the observation axis of `[N, F]` or `[N, C, F]` data.  Statistics have
//! shape `[1, F]` or `[C, F]`.  When statistics are supplied (e.g. the ones
//! computed on a training split) they are applied as-is; otherwise they are
//! computed from `x`.  Statistics are always returned.
//!
//! A feature with zero spread (max = min, σ = 0) is divided by 1, so constant
//! training features map to 0.
use ndarray::{Array2, ArrayD, ArrayViewD, Axis};

use crate::error::PreprocessError;

type Result<T> = std::result::Result<T, PreprocessError>;

/// Per-feature minimum and maximum, as returned by [`feature_norm`].
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxStats {
    pub min: ArrayD<f32>,
    pub max: ArrayD<f32>,
}

/// Per-feature mean and standard deviation, as returned by [`feature_std`].
#[derive(Debug, Clone, PartialEq)]
pub struct MeanStdStats {
    pub mean: ArrayD<f32>,
    pub std: ArrayD<f32>,
}

impl MinMaxStats {
    /// Map `x` into `[0, 1]` with these statistics.
    pub fn apply(&self, x: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        feature_norm(x, Some(&self.min), Some(&self.max)).map(|(y, _)| y)
    }

    /// Map `x` into `range` with these statistics.
    pub fn apply_range(&self, x: ArrayViewD<'_, f32>, range: (f32, f32)) -> Result<ArrayD<f32>> {
        feature_norm_range(x, Some(&self.min), Some(&self.max), range).map(|(y, _)| y)
    }
}

impl MeanStdStats {
    /// Standardise `x` with these statistics.
    pub fn apply(&self, x: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        feature_std(x, Some(&self.mean), Some(&self.std)).map(|(y, _)| y)
    }
}

/// Statistics fitted on a training split, applied unchanged to other splits.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedStats {
    MeanStd(MeanStdStats),
    MinMax(MinMaxStats),
    /// Min/max mapped into `range`.
    MinMaxRange(MinMaxStats, (f32, f32)),
}

impl FittedStats {
    pub fn apply(&self, x: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>> {
        match self {
            FittedStats::MeanStd(s) => s.apply(x),
            FittedStats::MinMax(s) => s.apply(x),
            FittedStats::MinMaxRange(s, range) => s.apply_range(x, *range),
        }
    }
}

// ── Signal space: one recording [C, T] ──────────────────────────────────────

/// Scale each channel of `x` (`[C, T]`) into `[0, 1]`.
pub fn sgn_norm(x: &Array2<f32>) -> Result<Array2<f32>> {
    if x.is_empty() {
        return Err(PreprocessError::EmptyInput);
    }
    let min = x.fold_axis(Axis(1), f32::INFINITY, |&a, &b| a.min(b)).insert_axis(Axis(1));
    let max = x.fold_axis(Axis(1), f32::NEG_INFINITY, |&a, &b| a.max(b)).insert_axis(Axis(1));
    let spread = (&max - &min).mapv(nonzero);
    Ok((x - &min) / &spread)
}

/// Standardise each channel of `x` (`[C, T]`) to mean 0, std 1.
pub fn sgn_std(x: &Array2<f32>) -> Result<Array2<f32>> {
    let mean = x.mean_axis(Axis(1)).ok_or(PreprocessError::EmptyInput)?;
    if x.ncols() == 0 {
        return Err(PreprocessError::EmptyInput);
    }
    let std = x.std_axis(Axis(1), 0.0).mapv(nonzero).insert_axis(Axis(1));
    Ok((x - &mean.insert_axis(Axis(1))) / &std)
}

// ── Feature space: [N, F] or [N, C, F] ──────────────────────────────────────

/// Scale every feature of `x` into `[0, 1]` over the observation axis.
///
/// `min` and `max` must be given together; see the module docs for shapes.
pub fn feature_norm(
    x: ArrayViewD<'_, f32>,
    min: Option<&ArrayD<f32>>,
    max: Option<&ArrayD<f32>>,
) -> Result<(ArrayD<f32>, MinMaxStats)> {
    let stats = resolve_min_max(&x, min, max)?;
    let spread = (&stats.max - &stats.min).mapv(nonzero);
    let out = (&x - &stats.min) / &spread;
    Ok((out, stats))
}

/// Like [`feature_norm`], then mapped linearly into `range = (lo, hi)`.
pub fn feature_norm_range(
    x: ArrayViewD<'_, f32>,
    min: Option<&ArrayD<f32>>,
    max: Option<&ArrayD<f32>>,
    range: (f32, f32),
) -> Result<(ArrayD<f32>, MinMaxStats)> {
    let (lo, hi) = range;
    let (unit, stats) = feature_norm(x, min, max)?;
    Ok((unit.mapv(|v| v * (hi - lo) + lo), stats))
}

/// Standardise every feature of `x` to mean 0, std 1 over the observation axis.
///
/// `mean` and `std` must be given together; see the module docs for shapes.
pub fn feature_std(
    x: ArrayViewD<'_, f32>,
    mean: Option<&ArrayD<f32>>,
    std: Option<&ArrayD<f32>>,
) -> Result<(ArrayD<f32>, MeanStdStats)> {
    let stats = resolve_mean_std(&x, mean, std)?;
    let scale = stats.std.mapv(nonzero);
    let out = (&x - &stats.mean) / &scale;
    Ok((out, stats))
}

// ── Statistic resolution ────────────────────────────────────────────────────

fn resolve_min_max(
    x: &ArrayViewD<'_, f32>,
    min: Option<&ArrayD<f32>>,
    max: Option<&ArrayD<f32>>,
) -> Result<MinMaxStats> {
    check_rank(x)?;
    match (min, max) {
        (Some(min), Some(max)) => {
            check_pair(x, min, max)?;
            Ok(MinMaxStats { min: min.clone(), max: max.clone() })
        }
        (Some(_), None) => Err(PreprocessError::UnpairedStatistics { given: "min", missing: "max" }),
        (None, Some(_)) => Err(PreprocessError::UnpairedStatistics { given: "max", missing: "min" }),
        (None, None) => {
            if x.shape()[0] == 0 {
                return Err(PreprocessError::EmptyInput);
            }
            let min = x.fold_axis(Axis(0), f32::INFINITY, |&a, &b| a.min(b));
            let max = x.fold_axis(Axis(0), f32::NEG_INFINITY, |&a, &b| a.max(b));
            Ok(MinMaxStats { min: stat_shape(x, min), max: stat_shape(x, max) })
        }
    }
}

fn resolve_mean_std(
    x: &ArrayViewD<'_, f32>,
    mean: Option<&ArrayD<f32>>,
    std: Option<&ArrayD<f32>>,
) -> Result<MeanStdStats> {
    check_rank(x)?;
    match (mean, std) {
        (Some(mean), Some(std)) => {
            check_pair(x, mean, std)?;
            Ok(MeanStdStats { mean: mean.clone(), std: std.clone() })
        }
        (Some(_), None) => Err(PreprocessError::UnpairedStatistics { given: "mean", missing: "std" }),
        (None, Some(_)) => Err(PreprocessError::UnpairedStatistics { given: "std", missing: "mean" }),
        (None, None) => {
            let mean = x.mean_axis(Axis(0)).ok_or(PreprocessError::EmptyInput)?;
            let std = x.std_axis(Axis(0), 0.0);
            Ok(MeanStdStats { mean: stat_shape(x, mean), std: stat_shape(x, std) })
        }
    }
}

fn check_rank(x: &ArrayViewD<'_, f32>) -> Result<()> {
    match x.ndim() {
        2 | 3 => Ok(()),
        n => Err(PreprocessError::UnsupportedRank(n)),
    }
}

/// Both statistics must share a shape equal to the feature dims of `x`.
fn check_pair(x: &ArrayViewD<'_, f32>, a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(PreprocessError::StatisticsShapeMismatch {
            a: a.shape().to_vec(),
            b: b.shape().to_vec(),
        });
    }
    let expected: Vec<usize> = match x.ndim() {
        2 => vec![1, x.shape()[1]],
        _ => x.shape()[1..].to_vec(),
    };
    if a.shape() != expected.as_slice() {
        return Err(PreprocessError::FeatureShapeMismatch {
            data: x.shape().to_vec(),
            stats: a.shape().to_vec(),
        });
    }
    Ok(())
}

/// 2-D data keeps a leading unit axis (`[1, F]`); 3-D stats are `[C, F]`.
fn stat_shape(x: &ArrayViewD<'_, f32>, stat: ArrayD<f32>) -> ArrayD<f32> {
    if x.ndim() == 2 {
        stat.insert_axis(Axis(0))
    } else {
        stat
    }
}

#[inline]
fn nonzero(v: f32) -> f32 {
    if v == 0.0 { 1.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn sgn_norm_unit_range_per_channel() {
        let x = Array2::from_shape_fn((6, 400), |(c, t)| {
            (c as f32 * 1.3 + t as f32 * 0.05).sin() * (c + 1) as f32 * 20.0
        });
        let y = sgn_norm(&x).unwrap();
        for row in y.rows() {
            let lo = row.iter().cloned().fold(f32::INFINITY, f32::min);
            let hi = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            approx::assert_abs_diff_eq!(lo, 0.0, epsilon = 1e-6_f32);
            approx::assert_abs_diff_eq!(hi, 1.0, epsilon = 1e-6_f32);
        }
    }

    #[test]
    fn sgn_std_mean_zero_std_one() {
        let x = Array2::from_shape_fn((4, 512), |(c, t)| {
            (c as f32 * 3.7 + t as f32 * 0.1).sin() * 50.0 + c as f32
        });
        let y = sgn_std(&x).unwrap();
        for row in y.rows() {
            let m = row.mean().unwrap();
            let s = row.std(0.0);
            approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-4_f32);
            approx::assert_abs_diff_eq!(s, 1.0, epsilon = 1e-4_f32);
        }
    }

    #[test]
    fn sgn_std_constant_channel_is_zero() {
        let x = Array2::from_elem((2, 64), 7.0_f32);
        let y = sgn_std(&x).unwrap();
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn feature_stats_shapes() {
        let x2 = Array2::from_shape_fn((10, 5), |(n, f)| (n * f) as f32).into_dyn();
        let (_, s2) = feature_std(x2.view(), None, None).unwrap();
        assert_eq!(s2.mean.shape(), &[1, 5]);

        let x3 = Array3::from_shape_fn((10, 3, 5), |(n, c, f)| (n + c * f) as f32).into_dyn();
        let (_, s3) = feature_norm(x3.view(), None, None).unwrap();
        assert_eq!(s3.min.shape(), &[3, 5]);
    }

    #[test]
    fn unpaired_statistics_rejected() {
        let x = Array2::from_elem((4, 3), 1.0_f32).into_dyn();
        let m = Array2::zeros((1, 3)).into_dyn();
        assert_eq!(
            feature_std(x.view(), Some(&m), None).unwrap_err(),
            PreprocessError::UnpairedStatistics { given: "mean", missing: "std" }
        );
        assert_eq!(
            feature_norm(x.view(), None, Some(&m)).unwrap_err(),
            PreprocessError::UnpairedStatistics { given: "max", missing: "min" }
        );
    }

    #[test]
    fn mismatched_statistics_rejected() {
        let x = Array2::from_elem((4, 3), 1.0_f32).into_dyn();
        let a = Array2::zeros((1, 3)).into_dyn();
        let b = Array2::ones((1, 4)).into_dyn();
        assert!(matches!(
            feature_norm(x.view(), Some(&a), Some(&b)),
            Err(PreprocessError::StatisticsShapeMismatch { .. })
        ));
        assert!(matches!(
            feature_norm(x.view(), Some(&b), Some(&b)),
            Err(PreprocessError::FeatureShapeMismatch { .. })
        ));
    }

    #[test]
    fn rank_four_rejected() {
        let x = ndarray::Array4::<f32>::zeros((2, 2, 2, 2)).into_dyn();
        assert_eq!(
            feature_std(x.view(), None, None).unwrap_err(),
            PreprocessError::UnsupportedRank(4)
        );
    }

    #[test]
    fn norm_range_hits_bounds() {
        let x = Array2::from_shape_fn((20, 2), |(n, f)| n as f32 * (f + 1) as f32).into_dyn();
        let (y, _) = feature_norm_range(x.view(), None, None, (-1.0, 1.0)).unwrap();
        let lo = y.iter().cloned().fold(f32::INFINITY, f32::min);
        let hi = y.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        approx::assert_abs_diff_eq!(lo, -1.0, epsilon = 1e-6_f32);
        approx::assert_abs_diff_eq!(hi, 1.0, epsilon = 1e-6_f32);
    }

    #[test]
    fn supplied_statistics_reused_for_test_split() {
        let train = Array2::from_shape_fn((8, 2), |(n, f)| n as f32 + f as f32 * 10.0).into_dyn();
        let (_, stats) = feature_std(train.view(), None, None).unwrap();
        let test = train.clone();
        let y = stats.apply(test.view()).unwrap();
        let (y_direct, _) = feature_std(train.view(), None, None).unwrap();
        assert_eq!(y, y_direct);
    }
}

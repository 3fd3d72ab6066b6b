//! Fixed-length windowing.
//!
//! Splits `[N, C, T]` trial data into non-overlapping windows of `window`
//! samples, giving `[N · T/window, C, window]`.  Windows are ordered
//! observation-major: all windows of trial 0, then trial 1, …  Each window
//! inherits the label of its trial.
//!
//! `T` must be a whole multiple of `window`, so that
//! `N · (T/window) · C · window == N · C · T`.
use ndarray::{s, Array1, Array3};

use crate::error::PreprocessError;

/// Split every observation of `x` into `T / window` windows.
///
/// When `y` is given it must hold one label per observation; the returned
/// labels repeat each one `T / window` times.
pub fn split_windows(
    x: &Array3<f32>,
    window: usize,
    y: Option<&Array1<u32>>,
) -> Result<(Array3<f32>, Option<Array1<u32>>), PreprocessError> {
    let (n_obs, n_ch, n_t) = x.dim();
    if window == 0 || n_t % window != 0 {
        return Err(PreprocessError::WindowMismatch { samples: n_t, window });
    }
    if let Some(y) = y {
        if y.len() != n_obs {
            return Err(PreprocessError::LabelCountMismatch {
                observations: n_obs,
                labels: y.len(),
            });
        }
    }

    let per_obs = n_t / window;
    let mut out = Array3::<f32>::zeros((n_obs * per_obs, n_ch, window));
    for o in 0..n_obs {
        for w in 0..per_obs {
            let start = w * window;
            out.slice_mut(s![o * per_obs + w, .., ..])
                .assign(&x.slice(s![o, .., start..start + window]));
        }
    }

    let labels = y.map(|y| {
        y.iter()
            .flat_map(|&label| std::iter::repeat(label).take(per_obs))
            .collect::<Array1<u32>>()
    });
    Ok((out, labels))
}

/// Number of whole windows in `n_samples`.
#[inline]
pub fn window_count(n_samples: usize, window: usize) -> usize {
    if window == 0 { 0 } else { n_samples / window }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array3};

    #[test]
    fn window_count_and_shape() {
        let x = Array3::from_elem((3, 12, 3000), 1.0_f32);
        let (w, _) = split_windows(&x, 1000, None).unwrap();
        assert_eq!(w.shape(), &[9, 12, 1000]);
    }

    #[test]
    fn labels_follow_their_trial() {
        let x = Array3::from_elem((2, 1, 40), 0.0_f32);
        let y = arr1(&[4_u32, 9]);
        let (_, yw) = split_windows(&x, 10, Some(&y)).unwrap();
        assert_eq!(yw.unwrap().to_vec(), vec![4, 4, 4, 4, 9, 9, 9, 9]);
    }

    #[test]
    fn window_contents_are_contiguous_slices() {
        let x = Array3::from_shape_fn((2, 2, 6), |(o, c, t)| (o * 100 + c * 10 + t) as f32);
        let (w, _) = split_windows(&x, 3, None).unwrap();
        // obs 1, second window, channel 1 → samples 3..6
        assert_eq!(w.slice(s![3, 1, ..]).to_vec(), vec![113.0, 114.0, 115.0]);
    }

    #[test]
    fn partial_window_rejected() {
        let x = Array3::from_elem((1, 2, 1300), 0.5_f32);
        assert_eq!(
            split_windows(&x, 1280, None).unwrap_err(),
            PreprocessError::WindowMismatch { samples: 1300, window: 1280 }
        );
    }

    #[test]
    fn label_count_checked() {
        let x = Array3::from_elem((3, 2, 10), 0.0_f32);
        let y = arr1(&[0_u32, 1]);
        assert!(matches!(
            split_windows(&x, 5, Some(&y)),
            Err(PreprocessError::LabelCountMismatch { observations: 3, labels: 2 })
        ));
    }
}

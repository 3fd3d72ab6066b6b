//! Per-window feature extraction.
//!
//! `channel_conv` turns a window `[C, W]` into the zero-lag channel
//! cross-product matrix `[C, C]`:
//!
//! ```text
//! M[i, j] = Σ_t x[i, t] · x[j, t] / W
//! ```
//!
//! The result is square and symmetric, which is what the cGAN consumes as a
//! single-channel `C × C` image.
use anyhow::{ensure, Result};
use ndarray::{s, Array2, Array3};

/// Channel cross-product matrix for every window of `x` (`[N, C, W]` → `[N, C, C]`).
pub fn channel_conv(x: &Array3<f32>) -> Array3<f32> {
    let (n, n_ch, n_t) = x.dim();
    let mut out = Array3::<f32>::zeros((n, n_ch, n_ch));
    if n_t == 0 {
        return out;
    }
    let inv_t = 1.0 / n_t as f32;
    for i in 0..n {
        let win = x.slice(s![i, .., ..]);
        let m = win.dot(&win.t());
        out.slice_mut(s![i, .., ..]).assign(&(m * inv_t));
    }
    out
}

/// Flatten each observation: `[N, A, B]` → `[N, A·B]` (row-major).
pub fn flatten_observations(x: &Array3<f32>) -> Array2<f32> {
    let (n, a, b) = x.dim();
    let mut out = Array2::<f32>::zeros((n, a * b));
    for (i, obs) in x.outer_iter().enumerate() {
        out.row_mut(i).iter_mut().zip(obs.iter()).for_each(|(o, &v)| *o = v);
    }
    out
}

/// Inverse of [`flatten_observations`]: `[N, A·B]` → `[N, A, B]`.
pub fn unflatten_observations(x: &Array2<f32>, a: usize, b: usize) -> Result<Array3<f32>> {
    let (n, f) = x.dim();
    ensure!(f == a * b, "cannot reshape {f} features into {a} × {b}");
    let data: Vec<f32> = x.iter().copied().collect();
    Ok(Array3::from_shape_vec((n, a, b), data)?)
}

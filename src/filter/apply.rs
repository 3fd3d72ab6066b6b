//! Overlap-add zero-phase FIR convolution.
//!
//! The kernel is odd-length and symmetric, so zero phase is a left shift of
//! `(N−1)/2` samples.  Edges are padded by odd reflection (`N−1` samples per
//! side) to suppress the start-up transient, then stripped.
//!
//! One [`OverlapAdd`] plan (kernel spectrum + FFTs) is shared by every
//! channel of a recording.
use std::sync::Arc;

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Apply a zero-phase FIR filter to each channel of `data` (`[C, T]`) in place.
pub fn apply_fir_zero_phase(data: &mut Array2<f32>, h: &[f32]) -> Result<()> {
    let n_t = data.ncols();
    if n_t == 0 || data.nrows() == 0 {
        return Ok(());
    }
    let plan = OverlapAdd::new(h, n_t)?;
    for mut row in data.rows_mut() {
        let filtered = plan.run(&row.to_vec());
        row.assign(&ArrayView1::from(&filtered));
    }
    Ok(())
}

/// Filter a single 1-D signal; the output has the same length as `x`.
pub fn filter_1d(x: &[f32], h: &[f32]) -> Result<Vec<f32>> {
    if x.is_empty() {
        return Ok(vec![]);
    }
    Ok(OverlapAdd::new(h, x.len())?.run(x))
}

/// A planned overlap-add convolution for signals of one length.
struct OverlapAdd {
    n_h: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f32>>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
}

impl OverlapAdd {
    fn new(h: &[f32], n_x: usize) -> Result<Self> {
        let n_h = h.len();
        ensure!(n_h % 2 == 1, "FIR kernel must have odd length, got {n_h}");

        let n_ext = n_x + 2 * (n_h - 1);
        let n_fft = choose_fft_len(n_h, n_ext);

        let mut planner: FftPlanner<f32> = FftPlanner::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);

        let mut h_fft = zero_padded(h, n_fft);
        fwd.process(&mut h_fft);

        Ok(Self { n_h, n_fft, h_fft, fwd, inv })
    }

    fn run(&self, x: &[f32]) -> Vec<f32> {
        let n_x = x.len();
        let n_edge = self.n_h - 1;
        let shift = n_edge / 2;

        let x_ext = reflect_limited_pad(x, n_edge, n_edge);
        let n_ext = x_ext.len();

        let n_seg = self.n_fft - self.n_h + 1;
        let scale = 1.0 / self.n_fft as f32;
        let mut acc = vec![0.0_f32; n_ext];

        for start in (0..n_ext).step_by(n_seg) {
            let stop = (start + n_seg).min(n_ext);
            let mut buf = zero_padded(&x_ext[start..stop], self.n_fft);

            self.fwd.process(&mut buf);
            buf.iter_mut().zip(&self.h_fft).for_each(|(b, &hf)| *b *= hf);
            self.inv.process(&mut buf);

            // Output sample o receives product sample o − start + shift.
            let out_start = start.saturating_sub(shift);
            let skip = shift.saturating_sub(start);
            for (o, p) in (out_start..n_ext).zip(skip..buf.len()) {
                acc[o] += buf[p].re * scale;
            }
        }

        acc[n_edge..n_edge + n_x].to_vec()
    }
}

fn zero_padded(x: &[f32], n: usize) -> Vec<Complex<f32>> {
    x.iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n)
        .collect()
}

/// Odd reflection around the end samples, zero-filled past the signal length.
///
/// Left:  `pad[i] = 2·x[0] − x[i]`, right: `pad[i] = 2·x[n−1] − x[n−1−i]`.
fn reflect_limited_pad(x: &[f32], n_l: usize, n_r: usize) -> Vec<f32> {
    let n = x.len();
    let refl_l = n_l.min(n - 1);
    let refl_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.extend(std::iter::repeat(0.0).take(n_l - refl_l));
    out.extend((1..=refl_l).rev().map(|i| 2.0 * x[0] - x[i]));
    out.extend_from_slice(x);
    let last = x[n - 1];
    out.extend((1..=refl_r).map(|i| 2.0 * last - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n_r - refl_r));
    out
}

/// Power-of-two FFT size minimising
/// `ceil(n_x / (N − n_h + 1)) · N · (log2 N + 1) + 4e-5 · N · n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;
    let max_pow = ((n_x as f64).log2().ceil() as u32 + 1).max(min_pow);

    (min_pow..=max_pow)
        .map(|pow| {
            let n = 1_usize << pow;
            let n_seg = (n - n_h + 1) as f64;
            let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
                + 4e-5 * n as f64 * n_x as f64;
            (n, cost)
        })
        .fold((1_usize << max_pow, f64::INFINITY), |best, cand| {
            if cand.1 < best.1 { cand } else { best }
        })
        .0
}

//! FIR notch design (Hamming-windowed sinc, `firwin` style).
//!
//! A notch at `f` with width `w` and transition bandwidth `tb` removes the
//! band between the −6 dB points
//!
//! ```text
//!   f − (w/2 + tb/4)   and   f + (w/2 + tb/4)
//! ```
//!
//! i.e. the stop band `f ± w/2` plus half of each `tb/2` transition.  All
//! notches share one kernel built by spectral subtraction:
//!
//! ```text
//!   h = δ[n − N/2] − Σ_k ( lp(hi_k) − lp(lo_k) )
//! ```
//!
//! Kernel length is `ceil(3.3 / (tb/2) · sfreq)` rounded up to odd.
use std::f64::consts::PI;

/// Default notch width for frequency `f`: `f / 200`.
#[inline]
pub fn default_notch_width(freq: f32) -> f32 {
    freq / 200.0
}

/// Number of FIR taps for a given transition bandwidth (always odd).
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f32, sfreq: f32) -> usize {
    let n_raw = (3.3 / trans_bw as f64 * sfreq as f64).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Design a zero-phase band-stop FIR removing every frequency in `freqs`.
///
/// `widths` defaults to [`default_notch_width`] per frequency.  Notches whose
/// stop band would reach DC or Nyquist are skipped.  With no usable notch the
/// kernel is the identity (a single centred tap).
pub fn design_notch(freqs: &[f32], widths: Option<&[f32]>, trans_bw: f32, sfreq: f32) -> Vec<f32> {
    let n = auto_filter_length(trans_bw / 2.0, sfreq);
    let nyq = sfreq / 2.0;

    let mut h = vec![0.0_f64; n];
    h[n / 2] = 1.0;

    for (k, &f) in freqs.iter().enumerate() {
        let w = widths
            .and_then(|ws| ws.get(k).copied())
            .unwrap_or_else(|| default_notch_width(f));
        let half = w / 2.0 + trans_bw / 4.0;
        let (lo, hi) = (f - half, f + half);
        if lo <= 0.0 || hi >= nyq {
            continue;
        }
        let lp_hi = firwin(n, hi, sfreq, true);
        let lp_lo = firwin(n, lo, sfreq, true);
        for i in 0..n {
            h[i] -= lp_hi[i] - lp_lo[i];
        }
    }

    h.iter().map(|&v| v as f32).collect()
}

/// Design a lowpass (or, with `pass_zero = false`, highpass) windowed-sinc FIR.
///
/// `cutoff_hz` is the −6 dB point; the lowpass is normalised to unit DC gain.
pub fn firwin(n: usize, cutoff_hz: f32, sfreq: f32, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz as f64 / (sfreq as f64 / 2.0);

    let win = hamming(n);
    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

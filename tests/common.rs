/// Shared helpers: synthetic recordings and array comparisons.
use ndarray::{Array, Array2, IxDyn};
use std::path::Path;

#[allow(unused)]
pub const SETUP_SIZE: usize = 900;
#[allow(unused)]
pub const ELECTLOC_SIZE: usize = 75;

#[allow(unused)]
/// Neuroscan electrode record written by [`write_cnt`].
pub struct SynthChannel {
    pub name: &'static str,
    pub baseline: i16,
    pub sensitivity: f32,
    pub calib: f32,
}

#[allow(unused)]
impl SynthChannel {
    /// Unit channel: one raw count is 1 µV.
    pub fn unit(name: &'static str) -> Self {
        Self { name, baseline: 0, sensitivity: 204.8, calib: 1.0 }
    }
}

#[allow(unused)]
/// Write a 16-bit `.cnt` file holding `raw` (`[C, T]` counts).
///
/// `block` is the number of samples per channel per interleaved block;
/// `1` writes plain multiplexed `[t][c]` data.
pub fn write_cnt(path: &Path, channels: &[SynthChannel], sfreq: u16, raw: &Array2<i16>, block: usize) {
    let (n_ch, n_t) = raw.dim();
    assert_eq!(n_ch, channels.len());
    let data_offset = SETUP_SIZE + ELECTLOC_SIZE * n_ch;
    let data_len = n_ch * n_t * 2;

    let mut bytes = vec![0u8; data_offset];
    bytes[370..372].copy_from_slice(&(n_ch as u16).to_le_bytes());
    bytes[376..378].copy_from_slice(&sfreq.to_le_bytes());
    bytes[864..868].copy_from_slice(&(n_t as i32).to_le_bytes());
    bytes[886..890].copy_from_slice(&((data_offset + data_len) as i32).to_le_bytes());
    let channel_offset = if block > 1 { (block * 2) as i32 } else { 0 };
    bytes[894..898].copy_from_slice(&channel_offset.to_le_bytes());

    for (c, ch) in channels.iter().enumerate() {
        let base = SETUP_SIZE + ELECTLOC_SIZE * c;
        let label = ch.name.as_bytes();
        bytes[base..base + label.len()].copy_from_slice(label);
        bytes[base + 47..base + 49].copy_from_slice(&ch.baseline.to_le_bytes());
        bytes[base + 59..base + 63].copy_from_slice(&ch.sensitivity.to_le_bytes());
        bytes[base + 71..base + 75].copy_from_slice(&ch.calib.to_le_bytes());
    }

    let block = block.max(1);
    let mut t0 = 0;
    while t0 < n_t {
        let len = block.min(n_t - t0);
        for c in 0..n_ch {
            for t in t0..t0 + len {
                bytes.extend_from_slice(&raw[[c, t]].to_le_bytes());
            }
        }
        t0 += len;
    }
    // Event table stub.
    bytes.extend_from_slice(&[0u8; 16]);
    std::fs::write(path, bytes).unwrap();
}

#[allow(unused)]
/// Sine of `freq` Hz sampled at `sfreq` for `n` samples.
pub fn sine(freq: f32, sfreq: f32, n: usize, amp: f32) -> Vec<f32> {
    (0..n)
        .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sfreq).sin())
        .collect()
}

#[allow(unused)]
/// Maximum absolute difference between two arrays.
pub fn max_abs_diff(a: &Array<f32, IxDyn>, b: &Array<f32, IxDyn>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0_f32, f32::max)
}

#[allow(unused)]
/// Root mean square of a slice.
pub fn rms(x: &[f32]) -> f32 {
    (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

#[allow(unused)]
/// Standard deviation of an array.
pub fn array_std(a: &Array<f32, IxDyn>) -> f32 {
    let n = a.len() as f32;
    let mean: f32 = a.iter().sum::<f32>() / n;
    let var: f32 = a.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / n;
    var.sqrt()
}

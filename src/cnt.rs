//! Neuroscan `.cnt` continuous-recording reader.
//!
//! # Layout (all little-endian)
//!
//! ```text
//! ┌──────────────────────────────┐  0
//! │ SETUP header (900 bytes)     │  @370 nchannels u16   @376 rate u16
//! │                              │  @864 numsamples i32  @886 event table i32
//! │                              │  @894 channel offset i32
//! ├──────────────────────────────┤  900
//! │ ELECTLOC × nchannels (75 B)  │  +0 label[10]  +47 baseline i16
//! │                              │  +59 sensitivity f32  +71 calib f32
//! ├──────────────────────────────┤  900 + 75·C
//! │ samples (i16 or i32)         │  blocks of `block` samples per channel;
//! │                              │  block = 1 is plain multiplexed [t][c]
//! ├──────────────────────────────┤  event table offset
//! │ event table (ignored)        │
//! └──────────────────────────────┘
//! ```
//!
//! # Calibration
//! ```text
//! volts[c, t] = (raw[c, t] − baseline_c) · sensitivity_c · calib_c / 204.8 · 1e-6
//! ```
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use ndarray::Array2;

pub const SETUP_SIZE: u64 = 900;
pub const ELECTLOC_SIZE: u64 = 75;

const OFF_NCHANNELS: u64 = 370;
const OFF_RATE: u64 = 376;
const OFF_NUMSAMPLES: u64 = 864;
const OFF_EVENT_TABLE: u64 = 886;
const OFF_CHANNEL_OFFSET: u64 = 894;

const CH_LABEL_LEN: usize = 10;
const CH_OFF_BASELINE: u64 = 47;
const CH_OFF_SENSITIVITY: u64 = 59;
const CH_OFF_CALIB: u64 = 71;

/// One electrode record.
#[derive(Debug, Clone, PartialEq)]
pub struct CntChannel {
    pub name: String,
    pub baseline: i16,
    pub sensitivity: f32,
    pub calib: f32,
}

impl CntChannel {
    /// Raw-unit → volt factor.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.sensitivity as f64 * self.calib as f64 / 204.8 * 1e-6
    }
}

/// An opened `.cnt` file (header only; samples are read on demand).
#[derive(Debug, Clone)]
pub struct CntFile {
    pub path: PathBuf,
    pub sfreq: f64,
    pub channels: Vec<CntChannel>,
    /// Samples per channel.
    pub n_samples: usize,
    /// 2 for 16-bit, 4 for 32-bit samples.
    pub sample_bytes: usize,
    /// Samples per channel per interleaved block (1 = multiplexed).
    pub block_samples: usize,
    data_offset: u64,
}

impl CntFile {
    #[inline]
    pub fn n_chan(&self) -> usize {
        self.channels.len()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.n_samples as f64 / self.sfreq
    }

    /// Read all samples into a calibrated `[n_chan, n_samples]` array (volts).
    pub fn read_all_data(&self) -> Result<Array2<f64>> {
        let n_ch = self.n_chan();
        let n_bytes = n_ch * self.n_samples * self.sample_bytes;

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.data_offset))
            .with_context(|| format!("seek to sample data @ {:#x}", self.data_offset))?;
        let mut raw = vec![0u8; n_bytes];
        reader
            .read_exact(&mut raw)
            .with_context(|| format!("read {n_bytes} bytes of sample data"))?;

        let mut out = Array2::<f64>::zeros((n_ch, self.n_samples));
        let scales: Vec<f64> = self.channels.iter().map(CntChannel::scale).collect();
        let block = self.block_samples;

        let mut values = raw.chunks_exact(self.sample_bytes).map(|b| match b.len() {
            2 => i16::from_le_bytes([b[0], b[1]]) as i64,
            _ => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64,
        });

        let mut t0 = 0;
        while t0 < self.n_samples {
            let len = block.min(self.n_samples - t0);
            for (c, ch) in self.channels.iter().enumerate() {
                for t in t0..t0 + len {
                    let Some(v) = values.next() else {
                        bail!("sample data ended early at channel {c}, sample {t}");
                    };
                    out[[c, t]] = (v - ch.baseline as i64) as f64 * scales[c];
                }
            }
            t0 += len;
        }
        Ok(out)
    }
}

/// Open a `.cnt` file and parse its header and electrode table.
pub fn open_cnt<P: AsRef<Path>>(path: P) -> Result<CntFile> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    ensure!(file_len >= SETUP_SIZE, "{}: too small for a CNT header", path.display());

    let n_ch = read_u16(&mut reader, OFF_NCHANNELS)? as usize;
    let rate = read_u16(&mut reader, OFF_RATE)?;
    let num_samples = read_i32(&mut reader, OFF_NUMSAMPLES)?;
    let event_table = read_i32(&mut reader, OFF_EVENT_TABLE)?;
    let channel_offset = read_i32(&mut reader, OFF_CHANNEL_OFFSET)?;

    ensure!(n_ch > 0, "{}: header declares zero channels", path.display());
    ensure!(rate > 0, "{}: header declares a zero sampling rate", path.display());

    let mut channels = Vec::with_capacity(n_ch);
    for c in 0..n_ch {
        let base = SETUP_SIZE + ELECTLOC_SIZE * c as u64;
        channels.push(read_channel(&mut reader, base).with_context(|| format!("channel {c}"))?);
    }

    let data_offset = SETUP_SIZE + ELECTLOC_SIZE * n_ch as u64;
    let data_end = if event_table as u64 > data_offset && event_table as u64 <= file_len {
        event_table as u64
    } else {
        file_len
    };
    let data_len = (data_end - data_offset) as usize;

    // 32-bit only when the header's sample count accounts for exactly
    // four bytes per value; otherwise 16-bit.
    let sample_bytes = if num_samples > 0 && data_len == num_samples as usize * n_ch * 4 {
        4
    } else {
        2
    };
    let n_samples = data_len / (n_ch * sample_bytes);
    let block_samples = if channel_offset > 1 {
        (channel_offset as usize / sample_bytes).max(1)
    } else {
        1
    };

    Ok(CntFile {
        path: path.to_path_buf(),
        sfreq: rate as f64,
        channels,
        n_samples,
        sample_bytes,
        block_samples,
        data_offset,
    })
}

fn read_channel<R: Read + Seek>(reader: &mut R, base: u64) -> Result<CntChannel> {
    reader.seek(SeekFrom::Start(base))?;
    let mut label = [0u8; CH_LABEL_LEN];
    reader.read_exact(&mut label)?;
    let end = label.iter().position(|&b| b == 0).unwrap_or(CH_LABEL_LEN);
    // Labels are Latin-1.
    let name: String = label[..end].iter().map(|&b| b as char).collect();

    let baseline = read_i16(reader, base + CH_OFF_BASELINE)?;
    let sensitivity = read_f32(reader, base + CH_OFF_SENSITIVITY)?;
    let calib = read_f32(reader, base + CH_OFF_CALIB)?;

    Ok(CntChannel { name: name.trim().to_string(), baseline, sensitivity, calib })
}

fn read_at<R: Read + Seek, const N: usize>(reader: &mut R, pos: u64) -> Result<[u8; N]> {
    reader
        .seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to {pos:#x}"))?;
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .with_context(|| format!("read {N} bytes @ {pos:#x}"))?;
    Ok(buf)
}

fn read_u16<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<u16> {
    Ok(u16::from_le_bytes(read_at(reader, pos)?))
}

fn read_i16<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<i16> {
    Ok(i16::from_le_bytes(read_at(reader, pos)?))
}

fn read_i32<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<i32> {
    Ok(i32::from_le_bytes(read_at(reader, pos)?))
}

fn read_f32<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<f32> {
    Ok(f32::from_le_bytes(read_at(reader, pos)?))
}

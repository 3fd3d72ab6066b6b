//! Continuous recordings → per-trial files → one stacked dataset.
//!
//! ```text
//! <base>/<S>/*.cnt ──notch──▶ Recording ──evidence marks──▶ Trial × n
//!   imagined_speech_<S>_<II>_tag<tag>.safetensors
//!        │
//!        └─ assemble_dataset: drop channels, crop, stack ─▶ Dataset
//! ```
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use ndarray::{s, Array1, Array2, Array3, Axis};

use crate::cnt::open_cnt;
use crate::config::SegmentConfig;
use crate::dataset::{Dataset, SubjectRange};
use crate::evidence::{EvidenceSheet, TrialMark};
use crate::filter::{apply_fir_zero_phase, design_notch};
use crate::io::{load_trial, save_trial};

const TRIAL_PREFIX: &str = "imagined_speech_";
const TRIAL_EXT: &str = "safetensors";

/// A continuous multichannel recording `[C, T]` in volts.
#[derive(Debug, Clone)]
pub struct Recording {
    pub data: Array2<f32>,
    pub sfreq: f32,
    pub ch_names: Vec<String>,
}

impl Recording {
    /// Read and calibrate a whole Neuroscan `.cnt` file.
    pub fn from_cnt<P: AsRef<Path>>(path: P) -> Result<Self> {
        let cnt = open_cnt(path)?;
        let data = cnt.read_all_data()?.mapv(|v| v as f32);
        Ok(Self {
            data,
            sfreq: cnt.sfreq as f32,
            ch_names: cnt.ch_names().into_iter().map(String::from).collect(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Zero-phase notch at each of `freqs` (shared FIR, one pass).
    pub fn notch_filter(&mut self, freqs: &[f32], trans_bw: f32) -> Result<()> {
        if freqs.is_empty() {
            return Ok(());
        }
        let h = design_notch(freqs, None, trans_bw, self.sfreq);
        apply_fir_zero_phase(&mut self.data, &h)
    }
}

/// One cut trial.
#[derive(Debug, Clone)]
pub struct Trial {
    pub subject: String,
    /// Position among the subject's usable trials.
    pub index: usize,
    pub tag: u32,
    /// `[C, T_i]`.
    pub data: Array2<f32>,
    pub sfreq: f32,
    pub ch_names: Vec<String>,
}

/// Cut every mark out of `rec`.
///
/// The sample range is `[round(start·sfreq), round(stop·sfreq)]`, both ends
/// inclusive, clipped to the recording.  Marks that fall entirely outside
/// it are skipped.
pub fn segment_recording(rec: &Recording, marks: &[TrialMark], subject: &str) -> Vec<Trial> {
    let n_t = rec.n_samples();
    let sf = rec.sfreq as f64;
    let mut trials = Vec::with_capacity(marks.len());
    for (index, m) in marks.iter().enumerate() {
        let a = (m.start_ms / 1000.0 * sf).round().max(0.0) as usize;
        let b = (m.stop_ms / 1000.0 * sf).round().max(0.0) as usize;
        if n_t == 0 || a >= n_t || b < a {
            tracing::warn!(subject, index, start_ms = m.start_ms, stop_ms = m.stop_ms, "mark outside recording, skipped");
            continue;
        }
        let b = b.min(n_t - 1);
        trials.push(Trial {
            subject: subject.to_string(),
            index,
            tag: m.tag,
            data: rec.data.slice(s![.., a..=b]).to_owned(),
            sfreq: rec.sfreq,
            ch_names: rec.ch_names.clone(),
        });
    }
    trials
}

/// `imagined_speech_<S>_<II>_tag<tag>.safetensors`.
pub fn trial_file_name(subject: &str, index: usize, tag: u32) -> String {
    format!("{TRIAL_PREFIX}{subject}_{index:02}_tag{tag}.{TRIAL_EXT}")
}

/// Inverse of [`trial_file_name`]: `(subject, index, tag)`.
pub fn parse_trial_file_name(name: &str) -> Option<(String, usize, u32)> {
    let stem = name.strip_suffix(&format!(".{TRIAL_EXT}"))?.strip_prefix(TRIAL_PREFIX)?;
    let (rest, tag) = stem.rsplit_once("_tag")?;
    let (subject, index) = rest.rsplit_once('_')?;
    if subject.is_empty() {
        return None;
    }
    Some((subject.to_string(), index.parse().ok()?, tag.parse().ok()?))
}

/// Segment one subject: first `.cnt` under `base_dir/<subject>`, notch
/// filter, cut the usable trials, write one file each into `out_dir`.
pub fn segment_subject(
    base_dir: &Path,
    subject: &str,
    sheet: &EvidenceSheet,
    cfg: &SegmentConfig,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let subject_dir = base_dir.join(subject);
    let cnt_path = first_with_extension(&subject_dir, "cnt")?
        .with_context(|| format!("no .cnt file in {}", subject_dir.display()))?;

    let marks = sheet.trials_for(subject)?;
    tracing::info!(subject, file = %cnt_path.display(), trials = marks.len(), "segmenting");

    let mut rec = Recording::from_cnt(&cnt_path)?;
    rec.notch_filter(&cfg.notch_freqs, cfg.notch_trans_bw)
        .with_context(|| format!("notch filter {}", cnt_path.display()))?;

    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut written = Vec::new();
    for trial in segment_recording(&rec, &marks, subject) {
        let path = out_dir.join(trial_file_name(subject, trial.index, trial.tag));
        save_trial(&trial, &path)?;
        written.push(path);
    }
    tracing::info!(subject, written = written.len(), "trials saved");
    Ok(written)
}

fn first_with_extension(dir: &Path, ext: &str) -> Result<Option<PathBuf>> {
    let mut hits: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(ext)))
        .collect();
    hits.sort();
    Ok(hits.into_iter().next())
}

fn norm_name(s: &str) -> String {
    s.replace(' ', "").to_lowercase()
}

/// Load every trial file in `trial_dir` and stack them into a [`Dataset`].
///
/// Files are ordered by subject, then by trial index, which keeps each
/// subject contiguous and in segmentation order.
/// Channels named in `cfg.drop_channels` are removed.  Every trial is cropped
/// to `cfg.trial_samples` (or the shortest trial); shorter trials are skipped.
pub fn assemble_dataset(trial_dir: &Path, cfg: &SegmentConfig) -> Result<Dataset> {
    let mut entries: Vec<(String, usize, PathBuf)> = std::fs::read_dir(trial_dir)
        .with_context(|| format!("list {}", trial_dir.display()))?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            parse_trial_file_name(&name).map(|(subject, index, _)| (subject, index, e.path()))
        })
        .collect();
    entries.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    let files: Vec<(PathBuf, String)> = entries.into_iter().map(|(subject, _, path)| (path, subject)).collect();
    ensure!(!files.is_empty(), "no trial files in {}", trial_dir.display());

    let trials = files
        .iter()
        .map(|(p, _)| load_trial(p).with_context(|| format!("load {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let first = &trials[0];
    let drop: Vec<String> = cfg.drop_channels.iter().map(|c| norm_name(c)).collect();
    let keep: Vec<usize> = first
        .ch_names
        .iter()
        .enumerate()
        .filter(|(_, n)| !drop.contains(&norm_name(n)))
        .map(|(i, _)| i)
        .collect();
    ensure!(!keep.is_empty(), "every channel was dropped");
    let ch_names: Vec<String> = keep.iter().map(|&i| first.ch_names[i].clone()).collect();

    let n_t = match cfg.trial_samples {
        Some(n) => n,
        None => trials.iter().map(|t| t.data.ncols()).min().unwrap_or(0),
    };
    ensure!(n_t > 0, "trial length is zero");

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut subjects: Vec<SubjectRange> = Vec::new();
    for ((path, subject), trial) in files.iter().zip(&trials) {
        if trial.ch_names != first.ch_names {
            bail!("{}: channel set differs from {}", path.display(), files[0].0.display());
        }
        if (trial.sfreq - first.sfreq).abs() > 1e-3 {
            bail!("{}: sampling rate {} Hz differs from {} Hz", path.display(), trial.sfreq, first.sfreq);
        }
        if trial.data.ncols() < n_t {
            tracing::warn!(file = %path.display(), samples = trial.data.ncols(), needed = n_t, "trial too short, skipped");
            continue;
        }
        let n = y.len();
        match subjects.last_mut() {
            Some(r) if r.name == *subject => r.stop = n + 1,
            _ => subjects.push(SubjectRange { name: subject.clone(), start: n, stop: n + 1 }),
        }
        x.push(trial.data.select(Axis(0), &keep).slice(s![.., ..n_t]).to_owned());
        y.push(trial.tag);
    }
    ensure!(!x.is_empty(), "no trial has {n_t} samples");

    let views: Vec<_> = x.iter().map(|t| t.view()).collect();
    let x: Array3<f32> = ndarray::stack(Axis(0), &views)?;
    tracing::info!(trials = y.len(), channels = ch_names.len(), samples = n_t, subjects = subjects.len(), "dataset assembled");
    Ok(Dataset { x, y: Array1::from(y), subjects, ch_names, sfreq: first.sfreq })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(c: usize, t: usize) -> Recording {
        Recording {
            data: Array2::from_shape_fn((c, t), |(i, j)| (i * 1000 + j) as f32),
            sfreq: 100.0,
            ch_names: (0..c).map(|i| format!("C{i}")).collect(),
        }
    }

    #[test]
    fn cuts_inclusive_ranges() {
        let rec = ramp(2, 500);
        let marks = [TrialMark { tag: 4, start_ms: 1000.0, stop_ms: 2000.0 }];
        let trials = segment_recording(&rec, &marks, "MM05");
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].data.ncols(), 101);
        assert_eq!(trials[0].data[[0, 0]], 100.0);
        assert_eq!(trials[0].data[[1, 100]], 1200.0);
    }

    #[test]
    fn clips_to_recording_and_skips_outside() {
        let rec = ramp(1, 150);
        let marks = [
            TrialMark { tag: 0, start_ms: 1000.0, stop_ms: 3000.0 },
            TrialMark { tag: 1, start_ms: 5000.0, stop_ms: 6000.0 },
        ];
        let trials = segment_recording(&rec, &marks, "P02");
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].data.ncols(), 50);
    }

    #[test]
    fn file_name_roundtrip() {
        let name = trial_file_name("MM05", 7, 10);
        assert_eq!(name, "imagined_speech_MM05_07_tag10.safetensors");
        assert_eq!(parse_trial_file_name(&name), Some(("MM05".to_string(), 7, 10)));
        assert_eq!(parse_trial_file_name("imagined_speech_MM05_07.safetensors"), None);
        assert_eq!(parse_trial_file_name("notes.txt"), None);
    }

    #[test]
    fn index_is_position_among_marks() {
        let rec = ramp(1, 1000);
        let marks: Vec<TrialMark> = (0..3)
            .map(|i| TrialMark { tag: i, start_ms: i as f64 * 1000.0, stop_ms: i as f64 * 1000.0 + 500.0 })
            .collect();
        let idx: Vec<usize> = segment_recording(&rec, &marks, "X").iter().map(|t| t.index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }
}

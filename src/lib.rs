//! # imspeech: imagined-speech EEG classification with a conditional GAN
//!
//! Raw Neuroscan recordings are cut into trials, turned into per-window
//! channel cross-product matrices, standardised, and used to train a
//! label-conditioned GAN whose discriminator doubles as an 11-class
//! imagined-speech classifier.
//!
//! ## Pipeline overview
//!
//! ```text
//! <subject>/*.cnt + evidence sheet
//!   │
//!   ├─ cnt::open_cnt()            native Neuroscan reader
//!   ├─ filter::design_notch()     zero-phase FIR notch at 60/120/180/240 Hz
//!   ├─ segment::segment_subject() one file per usable trial
//!   ├─ segment::assemble_dataset() drop channels, crop, stack → [N, C, T]
//!   │
//!   ├─ dataset::split_by_ranges() train / test observation ranges
//!   ├─ window::split_windows()    non-overlapping windows → [N·T/W, C, W]
//!   ├─ features::channel_conv()   per-window X·Xᵀ / W → [M, C, C]
//!   ├─ normalize::feature_std()   fitted on train, applied to test
//!   │
//!   └─ trainer::Trainer::train()  alternating cGAN updates, per-epoch evaluation
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use imspeech::{extract_features, io, Config};
//! use std::path::Path;
//!
//! let cfg = Config::default();
//! let ds = io::load_dataset(Path::new("data/dataset.safetensors")).unwrap();
//! let split = extract_features(&ds, None, &cfg.features).unwrap();
//! println!("train {:?}, test {:?}", split.train.x.dim(), split.test.x.dim());
//! ```

pub mod cgan;
pub mod cnt;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod evidence;
pub mod features;
pub mod filter;
pub mod io;
pub mod normalize;
pub mod report;
pub mod segment;
pub mod trainer;
pub mod window;

use anyhow::{Context, Result};
use ndarray::{s, Array3, Axis, Ix3};

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use cgan::{Cgan, Discriminator, Generator};
pub use config::{Config, FeatureConfig, ModelConfig, NormMethod, SegmentConfig, TrainingConfig};
pub use dataset::{labels_to_onehot, split_by_ranges, Dataset, LabeledSet, Split};
pub use error::PreprocessError;
pub use evaluate::{evaluate, predict, ConfusionMatrix, Evaluation};
pub use features::channel_conv;
pub use normalize::{feature_norm, feature_norm_range, feature_std, sgn_norm, sgn_std, FittedStats};
pub use segment::{assemble_dataset, segment_recording, segment_subject, Recording, Trial};
pub use trainer::{History, Trainer};
pub use window::split_windows;

/// Normalised train / test features and the statistics fitted on train.
#[derive(Debug, Clone)]
pub struct FeatureSplit {
    /// `[M_train, C, C]`.
    pub train: LabeledSet,
    /// `[M_test, C, C]`.
    pub test: LabeledSet,
    pub stats: FittedStats,
}

/// Split, window, channel-convolve and normalise a dataset.
///
/// With `holdout = Some(subject)` the test split is that subject and every
/// other subject trains; otherwise `cfg.train_ranges` / `cfg.test_ranges`
/// select the observations.  Normalisation statistics come from the
/// training split only.
pub fn extract_features(ds: &Dataset, holdout: Option<&str>, cfg: &FeatureConfig) -> Result<FeatureSplit> {
    let split = match holdout {
        Some(subject) => ds.leave_one_subject_out(subject)?,
        None => split_by_ranges(&ds.x, &ds.y, &cfg.train_ranges, &cfg.test_ranges)?,
    };
    let train = window_features(&split.train, cfg.window).context("training split")?;
    let test = window_features(&split.test, cfg.window).context("test split")?;

    let x = train.x.view().into_dyn();
    let (train_x, stats) = match cfg.norm {
        NormMethod::Standardize => {
            let (y, s) = feature_std(x, None, None)?;
            (y, FittedStats::MeanStd(s))
        }
        NormMethod::Normalize => {
            let (y, s) = feature_norm(x, None, None)?;
            (y, FittedStats::MinMax(s))
        }
        NormMethod::NormalizeRange => {
            let (y, s) = feature_norm_range(x, None, None, cfg.norm_range)?;
            (y, FittedStats::MinMaxRange(s, cfg.norm_range))
        }
    };
    let test_x = if test.is_empty() { test.x.clone().into_dyn() } else { stats.apply(test.x.view().into_dyn())? };

    tracing::info!(
        train = train.len(),
        test = test.len(),
        feature = ?train.item_shape(),
        "features extracted"
    );
    Ok(FeatureSplit {
        train: LabeledSet::new(to3(train_x)?, train.y)?,
        test: LabeledSet::new(to3(test_x)?, test.y)?,
        stats,
    })
}

/// Windows of `window` samples → channel convolution matrices.
///
/// Samples after the last whole window of each trial are dropped.
pub fn window_features(set: &LabeledSet, window: usize) -> Result<LabeledSet> {
    let n_t = set.x.len_of(Axis(2));
    let usable = crate::window::window_count(n_t, window) * window;
    anyhow::ensure!(usable > 0, "{n_t} samples hold no whole window of {window}");
    if usable < n_t {
        tracing::debug!(samples = n_t, window, dropped = n_t - usable, "trailing samples dropped");
    }
    let x = set.x.slice(s![.., .., ..usable]).to_owned();
    let (w, y) = split_windows(&x, window, Some(&set.y))?;
    let y = y.context("window labels")?;
    LabeledSet::new(channel_conv(&w), y)
}

/// Install the `tracing` subscriber used by the binaries.
///
/// Verbosity follows `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn to3(x: ndarray::ArrayD<f32>) -> Result<Array3<f32>> {
    Ok(x.into_dimensionality::<Ix3>()?)
}

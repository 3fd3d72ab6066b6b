//! Preprocessing error types.
//!
//! Raised by the shape guards in [`crate::normalize`] and [`crate::window`].
//! File-level code wraps these in `anyhow::Error` with context.
use thiserror::Error;

/// Errors from the array preprocessing helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    /// Only one half of a statistic pair (min/max or mean/std) was supplied.
    #[error("{given} was supplied without {missing}; both must be given together")]
    UnpairedStatistics {
        /// Name of the statistic that was supplied
        given: &'static str,
        /// Name of the statistic that is missing
        missing: &'static str,
    },

    /// The two halves of a statistic pair differ in shape.
    #[error("paired statistics differ in shape: {a:?} vs {b:?}")]
    StatisticsShapeMismatch {
        /// Shape of the first statistic
        a: Vec<usize>,
        /// Shape of the second statistic
        b: Vec<usize>,
    },

    /// Statistics do not match the feature dimensions of the data.
    #[error("statistics of shape {stats:?} do not fit data of shape {data:?}")]
    FeatureShapeMismatch {
        /// Shape of the data
        data: Vec<usize>,
        /// Shape of the statistics
        stats: Vec<usize>,
    },

    /// Only 2-D `[N, F]` and 3-D `[N, C, F]` arrays are supported.
    #[error("expected a 2-D or 3-D array, got {0} dimensions")]
    UnsupportedRank(usize),

    /// Label vector length differs from the number of observations.
    #[error("{labels} labels for {observations} observations")]
    LabelCountMismatch {
        /// Number of observations (first axis of the data)
        observations: usize,
        /// Number of labels
        labels: usize,
    },

    /// The sample axis cannot be split into whole windows.
    #[error("{samples} samples cannot be split into windows of {window}")]
    WindowMismatch {
        /// Samples per observation
        samples: usize,
        /// Requested window length
        window: usize,
    },

    /// The input has no observations.
    #[error("input array is empty")]
    EmptyInput,
}

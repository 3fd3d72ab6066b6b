//! FIR notch filtering.
//!
//! - [`design`]: Hamming-windowed sinc band-stop design for power-line notches.
//! - [`apply`]: Overlap-add zero-phase convolution of `[C, T]` recordings.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{auto_filter_length, default_notch_width, design_notch, firwin, hamming};

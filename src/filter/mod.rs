//! FIR band-pass design and application.
//!
//! - [`design`]: Hamming-windowed sinc band-pass with automatic transition
//!   bandwidths and filter length.
//! - [`apply`]: Overlap-add zero-phase convolution with reflect-limited
//!   edge padding.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{auto_filter_length, design_bandpass, firwin, hamming, high_trans_bandwidth, low_trans_bandwidth};

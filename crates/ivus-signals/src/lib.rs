//! # ivus-signals
//!
//! Signal processing for image- and contour-based cardiac gating of
//! intravascular pullbacks.
//!
//! This crate provides:
//! - **Feature extraction**: frame-to-frame correlation, FFT blurring score and
//!   frame-aligned contour measurements
//! - **DSP functions**: segment-wise z-score normalization and zero-phase
//!   Butterworth band-pass filtering
//! - **Extremum detection**: spacing- and height-constrained peak picking
//! - **Fusion**: regularity-weighted combination of several series into one
//!
//! ## Example
//!
//! ```ignore
//! use ivus_signals::{normalize, BandPass, ExtremaConfig, SignalFuser, ExtremaSampling};
//!
//! let correlation = normalize(&raw_correlation, 0);
//! let blurring = normalize(&raw_blurring, 0);
//!
//! let band = BandPass::design(0.45, 1.8, 4, 30.0)?;
//! let correlation = band.filtfilt(&correlation)?;
//! let blurring = band.filtfilt(&blurring)?;
//!
//! let fuser = SignalFuser::new(ExtremaConfig::default());
//! let fused = fuser.fuse(
//!     &[("correlation", &correlation), ("blurring", &blurring)],
//!     ExtremaSampling::MaximaOnly,
//! )?;
//! println!("weights: {:?}", fused.weights);
//! ```

pub mod dsp;
pub mod error;
pub mod extrema;
pub mod features;
pub mod fusion;

use ndarray::Array1;

/// One value per analyzed frame.
pub type Series = Array1<f64>;

pub use dsp::{normalize, BandPass};
pub use error::SignalError;
pub use extrema::{find_extrema, ExtremaConfig, ExtremaResult};
pub use features::{
    blurring_scores, consecutive_correlation, shift_forward, ContourSeries, CropRegion,
    FeatureExtractor, FeatureSet,
};
pub use fusion::{ExtremaSampling, FusedSeries, SignalFuser, SourceStats};

//! DSP (Digital Signal Processing) module
//!
//! - `normalize` - segment-wise z-score normalization
//! - `BandPass` - Butterworth band-pass design with zero-phase filtering
//! - `stats` - mean / standard deviation / percentile helpers shared by the
//!   extremum detector and the fuser

mod butterworth;
mod normalize;
pub mod stats;

pub use butterworth::BandPass;
pub use normalize::normalize;

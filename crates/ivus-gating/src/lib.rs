//! # ivus-gating
//!
//! Cardiac-phase gating of intravascular pullbacks without an ECG.
//!
//! This crate provides:
//! - **Phase assignment**: per-frame diastole/systole labels with sorted,
//!   disjoint frame lists
//! - **Classification**: initial labels from frames where image- and
//!   contour-based extrema agree
//! - **Correction**: a pointer-driven state machine for moving and adding
//!   phase markers
//! - **Session**: configuration, collaborator access and the gating-signal
//!   cache for one loaded pullback
//!
//! ## Example
//!
//! ```ignore
//! use ivus_gating::{GatingConfig, GatingRequest, PullbackSession};
//!
//! let mut session = PullbackSession::new(total_frames, 30.0, GatingConfig::default())?;
//! let report = session.gate(&GatingRequest::new(100..400), &images, &contours)?;
//! println!("diastolic frames: {:?}", session.assignment().diastolic_frames());
//! ```

pub mod classifier;
pub mod config;
pub mod correction;
pub mod error;
pub mod phase;
pub mod session;
pub mod signals;
pub mod sources;

pub use classifier::{
    assign_groups, common_indices, Classification, ClassifierState, ContourMethod,
    ExtremumMethod, GatingMethods, ImageMethod, PhaseClassifier,
};
pub use config::{ConfigError, GatingConfig};
pub use correction::{
    transition, CorrectionController, CorrectionState, MarkerEvent, PointerEvent, TimelineView,
};
pub use error::GatingError;
pub use phase::{format_frame_runs, GatedFilter, PhaseAssignment, PhaseLabel, PhaseMarker, SortedFrames};
pub use session::{GatingReport, GatingRequest, PullbackSession};
pub use signals::{GatingSignals, SignalCache};
pub use sources::{ContourMetrics, ContourStore, ImageStore};

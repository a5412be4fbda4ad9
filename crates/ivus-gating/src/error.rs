use ivus_signals::SignalError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by gating and phase correction.
///
/// All of them are recoverable at the call site: the user can pick another
/// frame range, fix contours or change parameters.
#[derive(Error, Debug)]
pub enum GatingError {
    #[error("missing contours for frames {frames}")]
    MissingContours { frames: String, count: usize },
    #[error("image data unavailable for frames {start}..{end}")]
    ImagesUnavailable { start: usize, end: usize },
    #[error("signal processing failed: {0}")]
    Signal(#[from] SignalError),
    #[error("only {found} frame(s) where both modalities agree, need at least 2")]
    TooFewCommonExtrema { found: usize },
    #[error("empty frame range")]
    EmptyRange,
    #[error("frame range {start}..{end} outside pullback of {total} frames")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        total: usize,
    },
    #[error("frame {frame} outside pullback of {total} frames")]
    FrameOutOfBounds { frame: usize, total: usize },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid phase assignment: {0}")]
    InvalidAssignment(String),
}

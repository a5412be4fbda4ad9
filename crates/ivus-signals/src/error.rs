use thiserror::Error;

/// Errors raised by the signal-processing stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("invalid band {low} Hz - {high} Hz (Nyquist {nyquist} Hz)")]
    InvalidBand { low: f64, high: f64, nyquist: f64 },
    #[error("filter order must be at least 1")]
    InvalidOrder,
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),
    #[error("series of length {len} is too short, need more than {required} samples")]
    SeriesTooShort { len: usize, required: usize },
    #[error("series length mismatch: expected {expected} got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("frame shape mismatch: expected {expected:?} got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("no input series")]
    EmptyInput,
    #[error("no series yields enough extrema to estimate its rhythm")]
    NoUsableSeries,
    #[error("singular system while computing filter initial conditions")]
    Singular,
}

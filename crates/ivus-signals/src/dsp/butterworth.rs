//! Butterworth band-pass design and zero-phase (forward-backward) filtering.
//!
//! The design goes analog prototype -> band-pass transform -> bilinear
//! transform with pre-warped edges, then expands to transfer-function
//! coefficients. Filtering pads both ends with an odd extension and starts
//! each pass from steady-state initial conditions so the output is neither
//! shifted nor dominated by start-up transients.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::{Series, SignalError};

/// Designed band-pass filter, ready to apply to any series sampled at the
/// frame rate it was designed for.
#[derive(Debug, Clone)]
pub struct BandPass {
    b: Vec<f64>,
    a: Vec<f64>,
    /// Initial state for a unit step, scaled by the first sample per pass
    zi: Vec<f64>,
}

impl BandPass {
    /// Design an order-`order` Butterworth band-pass between `lowcut` and
    /// `highcut` (Hz) for a series sampled at `frame_rate` (Hz).
    ///
    /// Fails when the band is empty or touches the Nyquist frequency. The
    /// cutoffs are never clamped.
    pub fn design(
        lowcut: f64,
        highcut: f64,
        order: usize,
        frame_rate: f64,
    ) -> Result<Self, SignalError> {
        if !(frame_rate > 0.0 && frame_rate.is_finite()) {
            return Err(SignalError::InvalidFrameRate(frame_rate));
        }
        if order == 0 {
            return Err(SignalError::InvalidOrder);
        }
        let nyquist = 0.5 * frame_rate;
        if !(lowcut > 0.0) || lowcut >= highcut || highcut >= nyquist {
            return Err(SignalError::InvalidBand {
                low: lowcut,
                high: highcut,
                nyquist,
            });
        }

        let (b, a) = butter_bandpass(order, lowcut / nyquist, highcut / nyquist);
        let zi = steady_state(&b, &a)?;
        Ok(Self { b, a, zi })
    }

    /// Numerator coefficients.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Denominator coefficients, `a[0] == 1`.
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Samples added on each side before filtering.
    pub fn pad_len(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Forward-backward filtering. Output has the input's length and no
    /// time shift.
    pub fn filtfilt(&self, signal: &Series) -> Result<Series, SignalError> {
        let x = signal.to_vec();
        let pad = self.pad_len();
        if x.len() <= pad {
            return Err(SignalError::SeriesTooShort {
                len: x.len(),
                required: pad,
            });
        }

        let ext = odd_extension(&x, pad);

        let forward = self.lfilter(&ext, ext[0]);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let first = reversed[0];
        reversed = self.lfilter(&reversed, first);
        reversed.reverse();

        Ok(Series::from(reversed[pad..pad + x.len()].to_vec()))
    }

    /// Direct form II transposed, state initialised to `zi * x0`.
    fn lfilter(&self, x: &[f64], x0: f64) -> Vec<f64> {
        let n = self.a.len();
        let mut z: Vec<f64> = self.zi.iter().map(|v| v * x0).collect();
        let mut out = Vec::with_capacity(x.len());

        for &sample in x {
            let y = self.b[0] * sample + z[0];
            for j in 0..n - 2 {
                z[j] = self.b[j + 1] * sample + z[j + 1] - self.a[j + 1] * y;
            }
            z[n - 2] = self.b[n - 1] * sample - self.a[n - 1] * y;
            out.push(y);
        }
        out
    }
}

/// Transfer function of a digital Butterworth band-pass with edges given as
/// fractions of the Nyquist frequency.
fn butter_bandpass(order: usize, wn_low: f64, wn_high: f64) -> (Vec<f64>, Vec<f64>) {
    // Design at fs = 2 so that 1.0 is Nyquist; pre-warp the edges.
    let fs2 = 4.0;
    let warp = |wn: f64| fs2 * (PI * wn / 2.0).tan();
    let w_low = warp(wn_low);
    let w_high = warp(wn_high);
    let bw = w_high - w_low;
    let w0 = (w_low * w_high).sqrt();

    // Analog low-pass prototype poles on the unit circle's left half.
    let n = order as f64;
    let prototype: Vec<Complex64> = (0..order)
        .map(|k| {
            let m = -(n - 1.0) + 2.0 * k as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect();

    // Low-pass -> band-pass: every pole splits in two, `order` zeros at s = 0.
    let mut poles = Vec::with_capacity(2 * order);
    for p in &prototype {
        let scaled = *p * (bw / 2.0);
        let root = (scaled * scaled - w0 * w0).sqrt();
        poles.push(scaled + root);
        poles.push(scaled - root);
    }
    let gain = bw.powi(order as i32);

    // Bilinear transform: s = 0 -> z = 1, s = inf -> z = -1.
    let digital_poles: Vec<Complex64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
    let mut digital_zeros = vec![Complex64::new(1.0, 0.0); order];
    digital_zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order));

    let denom: Complex64 = poles.iter().map(|&p| fs2 - p).product();
    let digital_gain = (gain * fs2.powi(order as i32) / denom).re;

    let b = poly(&digital_zeros)
        .into_iter()
        .map(|c| c * digital_gain)
        .collect();
    let a = poly(&digital_poles);
    (b, a)
}

/// Real coefficients of the monic polynomial with the given roots, highest
/// power first. Roots come in conjugate pairs, so the imaginary parts cancel.
fn poly(roots: &[Complex64]) -> Vec<f64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for r in roots {
        let mut next = coeffs.clone();
        next.push(Complex64::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= *r * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs.into_iter().map(|c| c.re).collect()
}

/// Filter state that produces a constant output for a unit-step input.
fn steady_state(b: &[f64], a: &[f64]) -> Result<Vec<f64>, SignalError> {
    let n = a.len();
    let dim = n - 1;

    // (I - companion(a)^T) zi = b[1..] - a[1..] * b[0]
    let mut m = DMatrix::<f64>::identity(dim, dim);
    for j in 0..dim {
        m[(j, 0)] += a[j + 1];
    }
    for i in 1..dim {
        m[(i - 1, i)] -= 1.0;
    }
    let rhs = DVector::from_iterator(dim, (1..n).map(|i| b[i] - a[i] * b[0]));

    let zi = m.lu().solve(&rhs).ok_or(SignalError::Singular)?;
    Ok(zi.iter().copied().collect())
}

/// Odd extension of `x` by `pad` samples on each side.
fn odd_extension(x: &[f64], pad: usize) -> Vec<f64> {
    let len = x.len();
    let first = x[0];
    let last = x[len - 1];

    let mut ext = Vec::with_capacity(len + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=pad).map(|i| 2.0 * last - x[len - 1 - i]));
    ext
}

// THEORY:
// `LuminanceStats` summarises one sampled frame in two numbers: how bright it is
// (mean luminance) and how busy it is (standard deviation of luminance). These
// are the only inputs the tuning curves need.
//
// The accumulation is single-pass: count, sum and sum of squares. Variance is
// derived as E[y²] - E[y]² and clamped at zero, because on a near-uniform frame
// the subtraction of two almost equal floats can land a hair below zero and
// `sqrt` would turn that into NaN.

use crate::core_modules::pixel::pixel::{self, Luminance};
use crate::error::SamplingError;

/// Brightness and contrast of a single sampled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuminanceStats {
    /// Number of pixels that contributed.
    pub count: usize,
    /// Mean Rec. 709 luminance, 0.0..=255.0.
    pub mean: Luminance,
    /// Population variance of luminance, never negative.
    pub variance: f64,
    /// Population standard deviation of luminance.
    pub std_dev: f64,
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

impl Accumulator {
    fn push(&mut self, y: Luminance) {
        self.count += 1;
        self.sum += y;
        self.sum_sq += y * y;
    }

    fn finish(self) -> Result<LuminanceStats, SamplingError> {
        if self.count == 0 {
            return Err(SamplingError::EmptyBuffer);
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let variance = (self.sum_sq / n - mean * mean).max(0.0);
        Ok(LuminanceStats {
            count: self.count,
            mean,
            variance,
            std_dev: variance.sqrt(),
        })
    }
}

impl LuminanceStats {
    /// Computes statistics over a flat RGBA buffer (4 bytes per pixel, alpha ignored).
    pub fn from_rgba(data: &[u8]) -> Result<Self, SamplingError> {
        let mut acc = Accumulator::default();
        for px in pixel::pixels(data) {
            acc.push(px.luminance());
        }
        acc.finish()
    }

    /// Mean luminance normalised to 0.0..=1.0.
    pub fn normalized_mean(&self) -> f64 {
        self.mean / 255.0
    }
}

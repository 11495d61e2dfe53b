// THEORY:
// The tuning engine turns a frame's `LuminanceStats` into the three presentation
// parameters that keep foreground text readable over it:
//
// - Overlay opacity follows brightness. A brighter background gets a darker
//   scrim, linearly across the configured opacity range.
// - Blur follows contrast. Busy frames (high luminance spread) get softened,
//   along two linear segments that meet at the knee of the curve.
// - Saturation steps down slightly once contrast passes a threshold.
//
// All three values always come out of one pass together; there is no partial
// update. Formatting to the fixed-precision strings the styling layer consumes
// also lives here, so that identical stats always produce identical strings.

use crate::core_modules::luminance_stats::LuminanceStats;
use serde::Deserialize;
use std::fmt;

/// A linear map from an input interval onto an output interval. The input
/// fraction is clamped to [0, 1] first, so the map never extrapolates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Segment {
    pub in_min: f64,
    pub in_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl Segment {
    pub const fn new(in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> Self {
        Self {
            in_min,
            in_max,
            out_min,
            out_max,
        }
    }

    pub fn map(&self, value: f64) -> f64 {
        let span = self.in_max - self.in_min;
        let t = if span.abs() < f64::EPSILON {
            if value >= self.in_max { 1.0 } else { 0.0 }
        } else {
            (value - self.in_min) / span
        };
        self.out_min + t.clamp(0.0, 1.0) * (self.out_max - self.out_min)
    }
}

/// What the video tuner does after a sampling pass fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Apply conservative defaults once and stop sampling for good.
    #[default]
    HaltOnFirstFailure,
    /// Apply conservative defaults once per failure streak and keep sampling.
    Retry,
}

/// Every tunable of the sampler and the mapping curves.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Lightest scrim (for a black frame).
    pub overlay_min: f64,
    /// Darkest scrim (for a white frame).
    pub overlay_max: f64,
    /// Blur for calm frames, keyed by luminance standard deviation.
    pub blur_low: Segment,
    /// Blur for busy frames, used once the standard deviation passes `blur_low.in_max`.
    pub blur_high: Segment,
    /// Hard bound on the blur radius, in pixels.
    pub blur_max: f64,
    /// Standard deviation above which saturation drops to `saturate_busy`.
    pub saturate_threshold: f64,
    pub saturate_busy: f64,
    pub saturate_calm: f64,
    /// Offscreen buffer edge for still images.
    pub image_buffer: u32,
    /// Offscreen buffer edge for video frames.
    pub video_buffer: u32,
    /// Minimum spacing between two video samples.
    pub sample_interval_ms: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            overlay_min: 0.34,
            overlay_max: 0.70,
            blur_low: Segment::new(20.0, 60.0, 0.0, 1.5),
            blur_high: Segment::new(60.0, 90.0, 1.5, 3.0),
            blur_max: 3.0,
            saturate_threshold: 75.0,
            saturate_busy: 0.9,
            saturate_calm: 1.0,
            image_buffer: 48,
            video_buffer: 64,
            sample_interval_ms: 500,
            failure_policy: FailurePolicy::HaltOnFirstFailure,
        }
    }
}

/// The three values written onto a hero. Always produced and applied together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationParams {
    /// Scrim opacity, within [overlay_min, overlay_max].
    pub overlay: f64,
    /// Backdrop blur radius in pixels, within [0, blur_max].
    pub blur: f64,
    /// Saturation multiplier, one of two discrete values.
    pub saturate: f64,
}

impl PresentationParams {
    /// Maps frame statistics onto presentation parameters.
    pub fn from_stats(stats: &LuminanceStats, config: &TuningConfig) -> Self {
        let overlay = (config.overlay_min
            + stats.normalized_mean() * (config.overlay_max - config.overlay_min))
            .clamp(config.overlay_min, config.overlay_max);

        let blur = if stats.std_dev > config.blur_high.in_min {
            config.blur_high.map(stats.std_dev)
        } else {
            config.blur_low.map(stats.std_dev)
        };

        let saturate = if stats.std_dev > config.saturate_threshold {
            config.saturate_busy
        } else {
            config.saturate_calm
        };

        Self {
            overlay,
            blur: blur.clamp(0.0, config.blur_max),
            saturate,
        }
    }

    pub fn to_style(&self) -> StyleValues {
        StyleValues {
            overlay: format!("{:.2}", self.overlay),
            blur: format!("{:.2}px", self.blur),
            saturate: format!("{:.2}", self.saturate),
        }
    }
}

/// Styling-variable values, already formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleValues {
    pub overlay: String,
    pub blur: String,
    pub saturate: String,
}

impl StyleValues {
    /// Fixed fallback used whenever a frame cannot be sampled.
    pub fn conservative() -> Self {
        Self {
            overlay: ".55".to_string(),
            blur: "1px".to_string(),
            saturate: "1".to_string(),
        }
    }
}

impl fmt::Display for StyleValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overlay={} blur={} saturate={}",
            self.overlay, self.blur, self.saturate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(mean: f64, std_dev: f64) -> LuminanceStats {
        LuminanceStats {
            count: 1,
            mean,
            variance: std_dev * std_dev,
            std_dev,
        }
    }

    fn params(mean: f64, std_dev: f64) -> PresentationParams {
        PresentationParams::from_stats(&stats(mean, std_dev), &TuningConfig::default())
    }

    #[test]
    fn all_black_is_lightest_scrim() {
        let style = params(0.0, 0.0).to_style();
        assert_eq!(style.overlay, "0.34");
        assert_eq!(style.blur, "0.00px");
        assert_eq!(style.saturate, "1.00");
    }

    #[test]
    fn all_white_is_darkest_scrim() {
        let style = params(255.0, 0.0).to_style();
        assert_eq!(style.overlay, "0.70");
        assert_eq!(style.blur, "0.00px");
        assert_eq!(style.saturate, "1.00");
    }

    #[test]
    fn uniform_luminance_matches_linear_formula() {
        for y in (0..=255).step_by(5) {
            let y = y as f64;
            let p = params(y, 0.0);
            let expected = (0.34 + (y / 255.0) * 0.36).clamp(0.34, 0.70);
            assert!((p.overlay - expected).abs() < 1e-12);
            assert_eq!(p.blur, 0.0);
            assert_eq!(p.saturate, 1.0);
        }
    }

    #[test]
    fn overlay_is_monotonic_in_mean() {
        for sd in [0.0, 30.0, 70.0, 100.0] {
            let mut last = f64::MIN;
            for m in 0..=255 {
                let o = params(m as f64, sd).overlay;
                assert!(o >= last);
                assert!((0.34..=0.70).contains(&o));
                last = o;
            }
        }
    }

    #[test]
    fn blur_is_flat_to_twenty_then_monotonic() {
        for sd in 0..=20 {
            assert_eq!(params(128.0, sd as f64).blur, 0.0);
        }
        let mut last = 0.0;
        for tenth in 200..=1500 {
            let b = params(128.0, tenth as f64 / 10.0).blur;
            assert!(b >= last, "blur dropped at stdev {}", tenth as f64 / 10.0);
            assert!((0.0..=3.0).contains(&b));
            last = b;
        }
    }

    #[test]
    fn blur_segments_meet_at_knee_and_saturate() {
        assert!((params(128.0, 40.0).blur - 0.75).abs() < 1e-12);
        assert!((params(128.0, 60.0).blur - 1.5).abs() < 1e-12);
        assert!((params(128.0, 75.0).blur - 2.25).abs() < 1e-12);
        assert_eq!(params(128.0, 90.0).blur, 3.0);
        assert_eq!(params(128.0, 127.5).blur, 3.0);
    }

    #[test]
    fn saturate_steps_at_seventy_five() {
        assert_eq!(params(128.0, 75.0).saturate, 1.0);
        assert_eq!(params(128.0, 75.0001).saturate, 0.9);
        assert_eq!(params(128.0, 10.0).saturate, 1.0);
        assert_eq!(params(128.0, 120.0).to_style().saturate, "0.90");
    }

    #[test]
    fn formatting_is_stable() {
        let a = params(91.3, 66.6).to_style();
        let b = params(91.3, 66.6).to_style();
        assert_eq!(a, b);
        assert!(a.blur.ends_with("px"));
    }

    #[test]
    fn conservative_values() {
        let d = StyleValues::conservative();
        assert_eq!(
            (d.overlay.as_str(), d.blur.as_str(), d.saturate.as_str()),
            (".55", "1px", "1")
        );
    }

    #[test]
    fn segment_clamps_input_fraction() {
        let s = Segment::new(20.0, 60.0, 0.0, 1.5);
        assert_eq!(s.map(-5.0), 0.0);
        assert_eq!(s.map(1000.0), 1.5);
        let degenerate = Segment::new(10.0, 10.0, 0.0, 1.0);
        assert_eq!(degenerate.map(9.0), 0.0);
        assert_eq!(degenerate.map(10.0), 1.0);
    }

    #[test]
    fn config_deserializes_partial_overrides() {
        let config: TuningConfig =
            serde_json::from_str(r#"{ "overlay_max": 0.8, "failure_policy": "retry" }"#).unwrap();
        assert_eq!(config.overlay_max, 0.8);
        assert_eq!(config.overlay_min, 0.34);
        assert_eq!(config.failure_policy, FailurePolicy::Retry);
        assert_eq!(config.video_buffer, 64);
    }
}

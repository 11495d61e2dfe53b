// THEORY:
// Every failure in this crate is recovered locally: a hero that cannot be sampled
// still renders, just with conservative presentation values. The error types
// exist so the recovery decision is made explicitly by the caller of the sampler
// instead of being buried in control flow.

use thiserror::Error;

/// Why a sampling pass could not produce pixel statistics.
#[derive(Debug, Error)]
pub enum SamplingError {
    /// Reading pixel data back was refused, typically a cross-origin protection
    /// on the media resource.
    #[error("pixel read-back restricted: {0}")]
    Restricted(String),
    /// The pass produced no complete pixel, so brightness and contrast are undefined.
    #[error("sample buffer holds no pixels")]
    EmptyBuffer,
    /// The frame could not be decoded into pixels.
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Instance-level failures, mirroring the recovery taxonomy of the tuners.
#[derive(Debug, Error)]
pub enum HeroError {
    /// Neither a video source list nor a background image was configured.
    #[error("hero has neither a video source list nor a background image")]
    ConfigurationMissing,
    /// The image or video resource failed to load or decode.
    #[error("media failed to load from {url}: {reason}")]
    MediaLoad { url: String, reason: String },
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    /// No hero with this id was registered.
    #[error("no hero registered as {0:?}")]
    UnknownHero(String),
    /// The hero runs in a different media mode than the call expects.
    #[error("hero {id:?} is not in {expected} mode")]
    ModeMismatch { id: String, expected: &'static str },
}

impl SamplingError {
    /// Read restrictions are the failure the video loop halts on; the other
    /// variants describe a bad frame rather than a blocked resource.
    pub fn is_restriction(&self) -> bool {
        matches!(self, SamplingError::Restricted(_))
    }
}

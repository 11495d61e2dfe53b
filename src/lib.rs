// THEORY:
// This file is the entry point of the `hero_tune` library crate. It exposes the
// adaptive readability engine for hero banners: sample the background (a still
// image once, a looping video twice a second), reduce the sample to brightness
// and contrast, and map those onto scrim opacity, backdrop blur and saturation.
//
// The public surface is layered:
// - `pipeline`: attach one hero and drive its image or video tuner by hand.
// - `page`: register every hero of a page at once and let tokio run the video
//   loops, with explicit teardown.
// - `core_modules`: the pieces underneath, usable on their own (pixel
//   statistics, tuning curves, cover sampling, styling-variable writes).

pub mod core_modules;
pub mod error;
pub mod page;
pub mod pipeline;

pub use error::{HeroError, SamplingError};

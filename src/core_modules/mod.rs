pub mod frame_sampler;
pub mod hero;
pub mod luminance_stats;
pub mod pixel;
pub mod style_sink;
pub mod tuning;

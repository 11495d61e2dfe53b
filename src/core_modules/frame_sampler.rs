// THEORY:
// The frame sampler is the bridge between a piece of media and the statistics
// engine. It does what a tiny offscreen canvas would: clear a small fixed-size
// buffer, draw the current frame into it with "cover" scaling, and read the
// pixels back.
//
// Key architectural principles:
// 1.  **Cover geometry**: the frame is scaled by max(bufW/srcW, bufH/srcH) so it
//     fills the buffer on both axes, then centred; whatever overflows is cropped.
//     This matches how the hero itself paints its background, so the sample sees
//     what the viewer sees.
// 2.  **Tiny buffers**: 48x48 for stills and 64x64 for video is plenty for a mean
//     and a spread, and keeps each pass cheap enough to run twice a second.
// 3.  **Explicit readiness**: media that has not decoded a frame yet, or whose
//     intrinsic size is unknown, is "not ready", which is distinct from a failed
//     read. Not ready yields `Ok(None)`; a failed read yields an error the caller
//     must decide about.

use crate::core_modules::luminance_stats::LuminanceStats;
use crate::error::SamplingError;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Placement of a scaled frame inside the sample buffer. Offsets are negative
/// on the axis that overflows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CoverRect {
    /// Scale-to-cover placement of a `source_width` x `source_height` frame
    /// inside a `target_width` x `target_height` box. `None` for an empty source.
    pub fn compute(
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Option<Self> {
        if source_width == 0 || source_height == 0 {
            return None;
        }
        let (sw, sh) = (source_width as f64, source_height as f64);
        let (tw, th) = (target_width as f64, target_height as f64);
        let ratio = (tw / sw).max(th / sh);
        let width = sw * ratio;
        let height = sh * ratio;
        Some(Self {
            x: (tw - width) / 2.0,
            y: (th - height) / 2.0,
            width,
            height,
        })
    }

    /// The region of the `source_width` x `source_height` frame that lands
    /// inside the target box, as `(x, y, width, height)` in source pixels.
    /// Never empty, never outside the frame.
    pub fn source_window(&self, source_width: u32, source_height: u32) -> (u32, u32, u32, u32) {
        let scale = self.width / source_width as f64;
        let (x, width) = visible_span(-self.x / scale, source_width);
        let (y, height) = visible_span(-self.y / scale, source_height);
        (x, y, width, height)
    }
}

/// Centred span of `extent` with `inset` source pixels hidden on each side.
fn visible_span(inset: f64, extent: u32) -> (u32, u32) {
    let inset = inset.max(0.0).round() as u32;
    let length = extent.saturating_sub(inset.saturating_mul(2)).max(1);
    (inset.min(extent - length), length)
}

/// One frame's worth of downscaled RGBA samples. Lives for a single pass.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    image: RgbaImage,
}

impl SampleBuffer {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Flat RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn stats(&self) -> Result<LuminanceStats, SamplingError> {
        LuminanceStats::from_rgba(self.as_raw())
    }

    /// Writes the buffer as a PNG, to see exactly what was measured.
    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        let output = BufWriter::new(File::create(path)?);
        let encoder = PngEncoder::new(output);
        encoder.write_image(
            self.as_raw(),
            self.width(),
            self.height(),
            ExtendedColorType::Rgba8,
        )
    }
}

/// Anything that can hand the sampler its current visual frame.
///
/// Hosts wrap their decoders in this trait; a read that the platform refuses
/// (for example because the media is cross-origin) must come back as
/// [`SamplingError::Restricted`].
pub trait FrameSource {
    /// Intrinsic frame size, `None` while still unknown.
    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Whether at least one frame has been decoded.
    fn has_current_frame(&self) -> bool;

    /// The frame to sample now, at intrinsic resolution.
    fn current_frame(&mut self) -> Result<&RgbaImage, SamplingError>;
}

/// A single decoded still, always ready.
#[derive(Debug, Clone)]
pub struct StillFrame {
    image: RgbaImage,
}

impl StillFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }
}

impl FrameSource for StillFrame {
    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        Some(self.image.dimensions())
    }

    fn has_current_frame(&self) -> bool {
        true
    }

    fn current_frame(&mut self) -> Result<&RgbaImage, SamplingError> {
        Ok(&self.image)
    }
}

/// A looping sequence of pre-decoded frames. Every read advances by one frame
/// and wraps at the end, the way a looping background video never ends.
#[derive(Debug, Clone, Default)]
pub struct FrameLoop {
    frames: Vec<RgbaImage>,
    cursor: usize,
}

impl FrameLoop {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self { frames, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FrameLoop {
    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.frames.first().map(|f| f.dimensions())
    }

    fn has_current_frame(&self) -> bool {
        !self.frames.is_empty()
    }

    fn current_frame(&mut self) -> Result<&RgbaImage, SamplingError> {
        if self.frames.is_empty() {
            return Err(SamplingError::EmptyBuffer);
        }
        let index = self.cursor % self.frames.len();
        self.cursor = (index + 1) % self.frames.len();
        Ok(&self.frames[index])
    }
}

/// Draws frames into a fixed-size offscreen buffer and reads them back.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    width: u32,
    height: u32,
}

impl FrameSampler {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Square buffer of the given edge length.
    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Samples a live source. `Ok(None)` means the source is not ready yet and
    /// nothing was read.
    pub fn sample<S>(&self, source: &mut S) -> Result<Option<SampleBuffer>, SamplingError>
    where
        S: FrameSource + ?Sized,
    {
        if !source.has_current_frame() {
            return Ok(None);
        }
        match source.intrinsic_size() {
            Some((w, h)) if w > 0 && h > 0 => {}
            _ => return Ok(None),
        }
        let frame = source.current_frame()?;
        self.draw_cover(frame).map(Some)
    }

    /// Samples a decoded still image.
    pub fn sample_image(&self, image: &RgbaImage) -> Result<SampleBuffer, SamplingError> {
        self.draw_cover(image)
    }

    fn draw_cover(&self, frame: &RgbaImage) -> Result<SampleBuffer, SamplingError> {
        let (fw, fh) = frame.dimensions();
        let rect =
            CoverRect::compute(fw, fh, self.width, self.height).ok_or(SamplingError::EmptyBuffer)?;

        // Only the visible window is resampled, so the work is bounded by the
        // frame and the buffer, never by the scaled frame.
        let (x, y, width, height) = rect.source_window(fw, fh);
        let visible = imageops::crop_imm(frame, x, y, width, height);
        let image = imageops::resize(&*visible, self.width, self.height, FilterType::Triangle);

        Ok(SampleBuffer { image })
    }
}

// THEORY:
// The `Pixel` module is the smallest unit the tuning engine looks at. A sampled
// frame arrives as a flat RGBA byte run; this module gives each 4-byte group a
// name and one heuristic: its perceived brightness.
//
// Key principles:
// 1) Single-pixel scope: nothing here reads neighbours or history. Aggregation
//    over a whole frame lives in `luminance_stats`.
// 2) Rec. 709 weights: hero backgrounds are display-referred web content, so the
//    HDTV/sRGB primaries are the right weighting, applied to the gamma-encoded
//    0..255 channel values directly.
// 3) Alpha is carried but never weighed. An offscreen buffer that was only
//    partly covered by the drawn frame still contributes its (transparent black)
//    pixels, exactly like the read-back from a canvas would.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Luminance = f64;

    pub const CHANNELS: usize = 4;

    /// Rec. 709 luma weights for red, green and blue.
    pub const REC709_WEIGHTS: (f64, f64, f64) = (0.2126, 0.7152, 0.0722);

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha channel value (0-255). Ignored by every heuristic.
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Opaque grey of the given level.
        pub fn grey(level: Channel) -> Self {
            Pixel::new(level, level, level, 255)
        }

        /// Luminance estimate (Rec. 709), in 0.0..=255.0.
        pub fn luminance(&self) -> Luminance {
            let (wr, wg, wb) = REC709_WEIGHTS;
            wr * self.red as f64 + wg * self.green as f64 + wb * self.blue as f64
        }
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<&image::Rgba<u8>> for Pixel {
        fn from(rgba: &image::Rgba<u8>) -> Self {
            Pixel::from(rgba.0)
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }

    /// Iterates the complete pixels of a flat RGBA buffer. A trailing partial
    /// group (fewer than four bytes) is not a pixel and is skipped.
    pub fn pixels(data: &[Byte]) -> impl Iterator<Item = Pixel> + '_ {
        data.chunks_exact(CHANNELS)
            .map(|px| Pixel::new(px[0], px[1], px[2], px[3]))
    }
}

// THEORY (single-pixel grayscale):
// The `Pixel` module is the most fundamental unit of the analyzer. It holds one
// RGBA sample and knows how to collapse itself into a single grayscale
// intensity. Nothing here reads a neighbor: spatial measures such as the
// Laplacian or the DCT fingerprint live in `image_quality`.
//
// Grayscale uses Rec. 601 luma weights (0.299, 0.587, 0.114) on the raw 0..255
// channels and rounds to the nearest integer, the same conversion common
// imaging libraries apply for an 8-bit "L" plane. Alpha is ignored.

pub mod pixel {
    pub type Channel = u8;
    pub type Luminance = f64;

    const CHANNELS: usize = 4;

    const RED_WEIGHT: f64 = 0.299;
    const GREEN_WEIGHT: f64 = 0.587;
    const BLUE_WEIGHT: f64 = 0.114;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Luminance estimate (Rec. 601 luma), unrounded.
        pub fn luminance(&self) -> Luminance {
            RED_WEIGHT * self.red as f64
                + GREEN_WEIGHT * self.green as f64
                + BLUE_WEIGHT * self.blue as f64
        }

        /// The 8-bit grayscale intensity of this pixel.
        pub fn gray(&self) -> Channel {
            self.luminance().round().clamp(0.0, 255.0) as Channel
        }
    }

    impl TryFrom<&[u8]> for Pixel {
        type Error = usize;

        /// Converts one RGBA quadruple. Fails with the slice length otherwise.
        fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
            match bytes {
                [red, green, blue, alpha] => Ok(Pixel::new(*red, *green, *blue, *alpha)),
                _ => Err(bytes.len()),
            }
        }
    }

    /// Converts a packed RGBA8 buffer into a grayscale plane.
    pub fn rgba_to_gray(rgba: &[u8]) -> Vec<Channel> {
        rgba.chunks_exact(CHANNELS)
            .filter_map(|bytes| Pixel::try_from(bytes).ok())
            .map(|pixel| pixel.gray())
            .collect()
    }
}

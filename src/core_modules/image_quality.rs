// THEORY:
// The `image_quality` module is the leaf of the validation stack. It turns an
// image file into a handful of structural measurements and nothing more: it has
// no notion of thresholds, labels or issues. Every function is pure over a path
// or a decoded buffer.
//
// Key principles:
// 1.  **Failure is a value**: `read` and `content_fingerprint` return `Result`s.
//     A corrupt file is an expected input, and the caller decides what it means.
// 2.  **Grayscale first**: blur and brightness are computed on the Rec. 601 luma
//     plane (see `pixel`), never per channel.
// 3.  **Blur**: variance of the 4-neighbour discrete Laplacian
//     `[0,1,0; 1,-4,1; 0,1,0]`, with reflect-101 borders so every pixel
//     contributes. Low variance means few edges, which means blur.
// 4.  **Fingerprint**: a DCT perceptual hash. The luma plane is resampled to
//     32x32 (Lanczos3), transformed with a 2D DCT-II, and the 8x8 lowest
//     frequencies are compared against their median. Each coefficient above
//     the median sets one bit of a 64-bit hash. Re-encoding or mild resizing
//     perturbs high frequencies only, so the hash survives it.

use std::f64::consts::PI;
use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, ImageError, ImageReader, Luma};
use thiserror::Error;

use crate::core_modules::pixel::pixel::rgba_to_gray;

const HASH_SAMPLE_SIZE: u32 = 32;
const HASH_LOW_FREQUENCIES: usize = 8;

/// Why an image could not be analyzed.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("cannot open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("cannot fingerprint image: {reason}")]
    Fingerprint { reason: String },
}

/// A decoded image reduced to its grayscale plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    gray: Vec<u8>,
}

impl PixelBuffer {
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        Self {
            width: rgba.width(),
            height: rgba.height(),
            gray: rgba_to_gray(rgba.as_raw()),
        }
    }

    /// Builds a buffer directly from a row-major grayscale plane.
    pub fn from_gray(width: u32, height: u32, gray: Vec<u8>) -> Option<Self> {
        (gray.len() == width as usize * height as usize).then_some(Self { width, height, gray })
    }

    pub fn gray(&self) -> &[u8] {
        &self.gray
    }

    fn at(&self, x: usize, y: usize) -> f64 {
        self.gray[y * self.width as usize + x] as f64
    }
}

/// A 64-bit perceptual hash, rendered as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Number of differing bits. Zero for exact duplicates.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The structural metrics the validator thresholds against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub blur_score: f64,
    pub mean_brightness: f64,
}

impl ImageMetrics {
    pub fn measure(buffer: &PixelBuffer) -> Self {
        let (width, height) = dimensions(buffer);
        Self {
            width,
            height,
            blur_score: blur_score(buffer),
            mean_brightness: mean_brightness(buffer),
        }
    }
}

/// The analyzer seam the validator depends on.
///
/// `fingerprint` receives the buffer `read` already produced for `path`, so an
/// image is decoded once per run.
pub trait ImageAnalyzer {
    fn read(&self, path: &Path) -> Result<PixelBuffer, AnalyzerError>;
    fn fingerprint(
        &self,
        path: &Path,
        buffer: &PixelBuffer,
    ) -> Result<Fingerprint, AnalyzerError>;
}

/// The production analyzer backed by the `image` crate decoders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerceptualAnalyzer;

impl ImageAnalyzer for PerceptualAnalyzer {
    fn read(&self, path: &Path) -> Result<PixelBuffer, AnalyzerError> {
        read(path)
    }

    fn fingerprint(
        &self,
        _path: &Path,
        buffer: &PixelBuffer,
    ) -> Result<Fingerprint, AnalyzerError> {
        fingerprint_buffer(buffer)
    }
}

fn decode(path: &Path) -> Result<DynamicImage, AnalyzerError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| AnalyzerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    reader.decode().map_err(|source| AnalyzerError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Decodes an image file into a grayscale buffer.
pub fn read(path: &Path) -> Result<PixelBuffer, AnalyzerError> {
    decode(path).map(|image| PixelBuffer::from_image(&image))
}

pub fn dimensions(buffer: &PixelBuffer) -> (u32, u32) {
    (buffer.width, buffer.height)
}

#[inline]
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected as usize
}

/// Variance of the Laplacian response. Lower is blurrier.
pub fn blur_score(buffer: &PixelBuffer) -> f64 {
    let (width, height) = (buffer.width as usize, buffer.height as usize);
    if width == 0 || height == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for y in 0..height {
        let up = reflect_101(y as isize - 1, height);
        let down = reflect_101(y as isize + 1, height);
        for x in 0..width {
            let left = reflect_101(x as isize - 1, width);
            let right = reflect_101(x as isize + 1, width);

            let laplacian = buffer.at(x, up)
                + buffer.at(x, down)
                + buffer.at(left, y)
                + buffer.at(right, y)
                - 4.0 * buffer.at(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
        }
    }

    let count = (width * height) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Arithmetic mean of the grayscale plane, 0..255.
pub fn mean_brightness(buffer: &PixelBuffer) -> f64 {
    if buffer.gray.is_empty() {
        return 0.0;
    }
    let total: u64 = buffer.gray.iter().map(|&value| value as u64).sum();
    total as f64 / buffer.gray.len() as f64
}

/// Perceptual hash of the image stored at `path`.
pub fn content_fingerprint(path: &Path) -> Result<Fingerprint, AnalyzerError> {
    fingerprint_image(&decode(path)?)
}

/// Perceptual hash of an already decoded image.
pub fn fingerprint_image(image: &DynamicImage) -> Result<Fingerprint, AnalyzerError> {
    fingerprint_buffer(&PixelBuffer::from_image(image))
}

/// Perceptual hash of a grayscale plane.
pub fn fingerprint_buffer(buffer: &PixelBuffer) -> Result<Fingerprint, AnalyzerError> {
    if buffer.width == 0 || buffer.height == 0 {
        return Err(AnalyzerError::Fingerprint {
            reason: "image has no pixels".into(),
        });
    }

    let luma = ImageBuffer::<Luma<u8>, &[u8]>::from_raw(
        buffer.width,
        buffer.height,
        buffer.gray.as_slice(),
    )
    .ok_or_else(|| AnalyzerError::Fingerprint {
        reason: "grayscale plane does not match image dimensions".into(),
    })?;
    let sample = imageops::resize(&luma, HASH_SAMPLE_SIZE, HASH_SAMPLE_SIZE, FilterType::Lanczos3);

    let n = HASH_SAMPLE_SIZE as usize;
    let samples: Vec<f64> = sample.as_raw().iter().map(|&value| value as f64).collect();
    let coefficients = dct_2d(&samples, n);

    let mut low: Vec<f64> = Vec::with_capacity(HASH_LOW_FREQUENCIES * HASH_LOW_FREQUENCIES);
    for row in 0..HASH_LOW_FREQUENCIES {
        low.extend_from_slice(&coefficients[row * n..row * n + HASH_LOW_FREQUENCIES]);
    }

    let median = median(&low);
    let bits = low
        .iter()
        .fold(0u64, |hash, &value| (hash << 1) | u64::from(value > median));
    Ok(Fingerprint(bits))
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Unnormalized 2D DCT-II of an `n`x`n` row-major block: columns first, then rows.
fn dct_2d(block: &[f64], n: usize) -> Vec<f64> {
    let mut cosines = vec![0.0f64; n * n];
    for k in 0..n {
        for i in 0..n {
            cosines[k * n + i] = (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos();
        }
    }

    let mut columns = vec![0.0f64; n * n];
    for x in 0..n {
        for k in 0..n {
            let mut acc = 0.0;
            for y in 0..n {
                acc += block[y * n + x] * cosines[k * n + y];
            }
            columns[k * n + x] = 2.0 * acc;
        }
    }

    let mut output = vec![0.0f64; n * n];
    for y in 0..n {
        for k in 0..n {
            let mut acc = 0.0;
            for x in 0..n {
                acc += columns[y * n + x] * cosines[k * n + x];
            }
            output[y * n + k] = 2.0 * acc;
        }
    }
    output
}

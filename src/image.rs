// image.rs — Frame container and the frame source/sink around the pipeline.
//
// The detector itself never sees an `Image`: it only sees raster streams of
// `Sample<T>`. This module is the boundary on both sides:
//
//   Image<Rgba> ──samples()──▶ Sample<Rgba> stream ──▶ pipeline
//   pipeline ──▶ Sample<T> stream ──from_samples()──▶ Image<T>
//
// Layout is row-major and contiguous (no stride padding), which is exactly
// raster order: `data[y * width + x]`.
//
// PIXEL WORD LAYOUT:
// A pixel travels as a 32-bit RGBA word with red in the least significant
// byte and alpha in the most significant byte:
//
//   bits:  31..24  23..16  15..8   7..0
//          alpha   blue    green   red

use std::fmt;

use crate::error::{Error, StreamError};
use crate::stream::{FrameShape, RasterCursor, Sample};

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Types that can be stored in an `Image` and carried through a stream.
///
/// `Send + 'static` is what lets a value cross a channel into another
/// stage's thread; `Default` is the zero value images are initialized with.
pub trait Pixel: Copy + Default + Send + Sync + 'static {}

impl Pixel for u8 {}
impl Pixel for bool {}
impl Pixel for i32 {}
impl Pixel for u32 {}

/// 8-bit RGBA pixel. Alpha is carried but unused by the detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba { r, g, b, a }
    }

    /// Opaque gray pixel with all three color channels set to `v`.
    #[inline]
    pub const fn gray(v: u8) -> Self {
        Rgba::new(v, v, v, 255)
    }

    /// Unpack a 32-bit pixel word (red = least significant byte).
    #[inline]
    pub fn from_word(word: u32) -> Self {
        let [r, g, b, a] = word.to_le_bytes();
        Rgba { r, g, b, a }
    }

    /// Pack into a 32-bit pixel word (red = least significant byte).
    #[inline]
    pub fn to_word(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }
}

impl Pixel for Rgba {}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------

/// A 2D frame with runtime dimensions, stored in raster order.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Create an image from raster-ordered pixels.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image { data, width, height }
    }

    /// Create an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    /// Reassemble one frame from a raster sample stream.
    ///
    /// Consumes exactly `width * height` samples and validates that the
    /// end-of-frame flag sits on the last one. Extra samples are left in the
    /// iterator (they belong to the next frame).
    pub fn from_samples<I>(width: usize, height: usize, samples: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = Sample<T>>,
    {
        let shape = FrameShape::new(width, height);
        let mut cursor = RasterCursor::new(shape);
        let mut data = Vec::with_capacity(shape.len());
        let mut samples = samples.into_iter();

        while data.len() < shape.len() {
            let sample = samples.next().ok_or(StreamError::Truncated {
                received: data.len(),
                expected: shape.len(),
            })?;
            cursor.advance(sample.last)?;
            data.push(sample.value);
        }
        Ok(Image { data, width, height })
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }

    /// Get the pixel at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.width + x;
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples in raster order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    /// The frame as a raster sample stream, flag set on the last element.
    pub fn samples(&self) -> impl Iterator<Item = Sample<T>> + '_ {
        let last = self.data.len().saturating_sub(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &value)| Sample { value, last: i == last })
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl Image<Rgba> {
    /// Wrap a raw RGBA byte buffer (4 bytes per pixel, R first).
    ///
    /// The buffer must hold exactly one frame; anything else is rejected
    /// rather than padded or cropped.
    pub fn from_rgba_bytes(width: usize, height: usize, bytes: &[u8]) -> Result<Self, Error> {
        let expected = width * height * 4;
        if bytes.len() != expected {
            return Err(Error::FrameSize {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }
        let data = bytes
            .chunks_exact(4)
            .map(|px| Rgba::new(px[0], px[1], px[2], px[3]))
            .collect();
        Ok(Image { data, width, height })
    }
}

// Debug formatting — useful for small images in tests.
impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        write!(f, "}}")
    }
}

// convolution.rs — Window functions and a whole-image reference convolution.
//
// The streaming engine in window.rs only knows how to hand a neighborhood to
// a `WindowFn`. The functions that actually *compute* something live here,
// as plain values that can be tested on a hand-built `Window` without any
// buffering or stream timing involved:
//
//   FixedKernel — Σ window[i][j] · K[i][j] in fixed point (LoG and friends)
//   BoxSum      — plain neighborhood sum
//   BoxMean     — truncated neighborhood mean
//
// `convolve_zero_border` applies any window function to a whole `Image` the
// direct way (one window per pixel, zero border) and is the reference the
// streaming engine is checked against.

use crate::fixed::FixedFormat;
use crate::image::{Image, Pixel};
use crate::window::{Window, WindowFn};

// ---------------------------------------------------------------------------
// FixedKernel
// ---------------------------------------------------------------------------

/// A KH×KW kernel quantized to a fixed-point format.
///
/// The response of a window is the exact integer sum of
/// `window[i][j] * raw[i][j]`, in units of `2^-frac_bits`.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedKernel {
    height: usize,
    width: usize,
    raw: Vec<i32>,
    format: FixedFormat,
}

impl FixedKernel {
    /// Quantize row-major real coefficients.
    ///
    /// # Panics
    /// Panics if the dimensions are even or the coefficient count is wrong.
    pub fn new(height: usize, width: usize, coeffs: &[f32], format: FixedFormat) -> Self {
        assert!(
            height % 2 == 1 && width % 2 == 1,
            "kernel dimensions must be odd (got {height}x{width})"
        );
        assert_eq!(coeffs.len(), height * width, "kernel needs height * width coefficients");
        FixedKernel {
            height,
            width,
            raw: coeffs.iter().map(|&c| format.quantize(c)).collect(),
            format,
        }
    }

    /// Build from a square coefficient table.
    pub fn from_rows<const N: usize>(rows: &[[f32; N]; N], format: FixedFormat) -> Self {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Self::new(N, N, &flat, format)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn format(&self) -> FixedFormat {
        self.format
    }

    /// Quantized coefficients, row-major.
    pub fn raw(&self) -> &[i32] {
        &self.raw
    }

    /// Fixed-point response for a window of integer-like samples.
    pub fn response<T: Copy + Into<i32>>(&self, window: &Window<'_, T>) -> i32 {
        debug_assert_eq!((window.height(), window.width()), (self.height, self.width));
        let mut acc = 0i32;
        for i in 0..self.height {
            for j in 0..self.width {
                acc += window.get(i, j).into() * self.raw[i * self.width + j];
            }
        }
        acc
    }
}

impl<T: Copy + Into<i32>> WindowFn<T> for FixedKernel {
    type Output = i32;

    #[inline]
    fn apply(&self, window: &Window<'_, T>) -> i32 {
        self.response(window)
    }
}

// ---------------------------------------------------------------------------
// Box kernels
// ---------------------------------------------------------------------------

/// Sum of every sample in the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxSum;

impl<T: Copy + Into<i32>> WindowFn<T> for BoxSum {
    type Output = i32;

    fn apply(&self, window: &Window<'_, T>) -> i32 {
        window.iter().map(|(_, _, v)| v.into()).sum()
    }
}

/// Truncated mean of an 8-bit window: `floor(Σ / (KH·KW))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxMean;

impl WindowFn<u8> for BoxMean {
    type Output = u8;

    fn apply(&self, window: &Window<'_, u8>) -> u8 {
        let n = (window.height() * window.width()) as u32;
        let sum: u32 = window.iter().map(|(_, _, v)| u32::from(v)).sum();
        (sum / n) as u8
    }
}

// ---------------------------------------------------------------------------
// Reference convolution
// ---------------------------------------------------------------------------

/// Apply `func` to every KH×KW neighborhood of `src`, writing the border
/// value (`O::default()`) wherever the window would leave the image.
///
/// Direct, non-streaming; used to validate the streaming engine.
pub fn convolve_zero_border<T, F>(
    src: &Image<T>,
    kernel_height: usize,
    kernel_width: usize,
    func: &F,
) -> Image<F::Output>
where
    T: Pixel,
    F: WindowFn<T>,
    F::Output: Pixel,
{
    assert!(
        kernel_height % 2 == 1 && kernel_width % 2 == 1,
        "kernel dimensions must be odd (got {kernel_height}x{kernel_width})"
    );
    let (w, h) = (src.width(), src.height());
    let (half_h, half_w) = (kernel_height / 2, kernel_width / 2);
    let mut dst = Image::new(w, h);
    let mut cells = vec![T::default(); kernel_height * kernel_width];

    if w < kernel_width || h < kernel_height {
        return dst;
    }
    for y in half_h..(h - half_h) {
        for x in half_w..(w - half_w) {
            for r in 0..kernel_height {
                for c in 0..kernel_width {
                    cells[r * kernel_width + c] = src.get(x + c - half_w, y + r - half_h);
                }
            }
            let window = Window::unrotated(&cells, kernel_height, kernel_width);
            dst.set(x, y, func.apply(&window));
        }
    }
    dst
}

// convert.rs — RGBA → intensity conversion (GrayscaleConverter).
//
// intensity = (R + G + B) / 3, integer truncation, alpha ignored.
//
// This is a plain average rather than BT.601 luma weights: headlights are
// near-white, and the unweighted mean keeps the conversion to one add and
// one divide per pixel.
//
// Two interfaces, as everywhere in this crate:
//   compute_grayscale  — the per-pixel function
//   GrayscaleConverter — the 1:1 stream stage (flag passed through)

use crate::error::StreamError;
use crate::image::{Image, Rgba};
use crate::stream::{FrameShape, RasterCursor, Sample, Stage};

/// Intensity of one pixel: truncated mean of the three color channels.
#[inline]
pub fn compute_grayscale(px: Rgba) -> u8 {
    ((u16::from(px.r) + u16::from(px.g) + u16::from(px.b)) / 3) as u8
}

/// Convert a whole frame at once.
pub fn grayscale_image(src: &Image<Rgba>) -> Image<u8> {
    Image::from_vec(
        src.width(),
        src.height(),
        src.as_slice().iter().map(|&px| compute_grayscale(px)).collect(),
    )
}

/// Streaming RGBA → intensity stage.
#[derive(Debug, Clone)]
pub struct GrayscaleConverter {
    cursor: RasterCursor,
}

impl GrayscaleConverter {
    pub fn new(shape: FrameShape) -> Self {
        GrayscaleConverter {
            cursor: RasterCursor::new(shape),
        }
    }
}

impl Stage for GrayscaleConverter {
    type Input = Sample<Rgba>;
    type Output = Sample<u8>;

    fn push<E>(&mut self, sample: Sample<Rgba>, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(Sample<u8>) -> Result<(), StreamError>,
    {
        self.cursor.advance(sample.last)?;
        emit(sample.map(compute_grayscale))
    }

    fn cursor(&self) -> &RasterCursor {
        &self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::run_to_vec;

    #[test]
    fn test_grayscale_truncates() {
        assert_eq!(compute_grayscale(Rgba::new(0, 0, 0, 255)), 0);
        assert_eq!(compute_grayscale(Rgba::new(255, 255, 255, 0)), 255);
        assert_eq!(compute_grayscale(Rgba::new(1, 1, 0, 0)), 0); // 2 / 3
        assert_eq!(compute_grayscale(Rgba::new(100, 50, 0, 7)), 50);
    }

    #[test]
    fn test_alpha_ignored() {
        let a = compute_grayscale(Rgba::new(30, 60, 90, 0));
        let b = compute_grayscale(Rgba::new(30, 60, 90, 255));
        assert_eq!(a, b);
        assert_eq!(a, 60);
    }

    #[test]
    fn test_stream_matches_whole_image() {
        let img = Image::from_fn(5, 3, |x, y| Rgba::new((x * 40) as u8, (y * 80) as u8, 17, 255));
        let mut stage = GrayscaleConverter::new(img.shape());
        let out = run_to_vec(&mut stage, img.samples()).unwrap();

        assert_eq!(out.len(), 15);
        assert!(out[14].last);
        assert_eq!(out.iter().filter(|s| s.last).count(), 1);
        let streamed = Image::from_samples(5, 3, out).unwrap();
        assert_eq!(streamed, grayscale_image(&img));
    }
}

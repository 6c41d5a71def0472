// threshold.rs — Intensity → binary mask (MonochromeThresholder).
//
// mask = intensity >= threshold. The threshold is configured as a fraction
// of the maximum 8-bit intensity and truncated to an integer once:
// 0.85 × 255 = 216.75 → 216.

use crate::error::{ConfigError, StreamError};
use crate::stream::{FrameShape, RasterCursor, Sample, Stage};

/// Integer intensity threshold for a fraction of full scale (255).
pub fn intensity_threshold(fraction: f32) -> Result<u8, ConfigError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ConfigError::ThresholdOutOfRange {
            name: "monochrome_threshold",
            value: fraction,
        });
    }
    Ok((fraction * f32::from(u8::MAX)).floor() as u8)
}

/// Streaming 1:1 thresholding stage.
#[derive(Debug, Clone)]
pub struct MonochromeThresholder {
    threshold: u8,
    cursor: RasterCursor,
}

impl MonochromeThresholder {
    pub fn new(shape: FrameShape, threshold: u8) -> Self {
        MonochromeThresholder {
            threshold,
            cursor: RasterCursor::new(shape),
        }
    }

    #[inline]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    #[inline]
    pub fn compute(&self, intensity: u8) -> bool {
        intensity >= self.threshold
    }
}

impl Stage for MonochromeThresholder {
    type Input = Sample<u8>;
    type Output = Sample<bool>;

    fn push<E>(&mut self, sample: Sample<u8>, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(Sample<bool>) -> Result<(), StreamError>,
    {
        self.cursor.advance(sample.last)?;
        let threshold = self.threshold;
        emit(sample.map(|v| v >= threshold))
    }

    fn cursor(&self) -> &RasterCursor {
        &self.cursor
    }
}

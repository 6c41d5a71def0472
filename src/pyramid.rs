// pyramid.rs — Block-mean image pyramid.
//
// Level k of the pyramid is the intensity frame downscaled by F^k, where F is
// the per-level factor. Each level is produced from the previous one by
// averaging non-overlapping F×F blocks:
//
//   out(bx, by) = floor( Σ_{i,j < F} in(bx·F + j, by·F + i) / F² )
//
// STREAMING FORM (PyramidBuilder):
// The input arrives in raster order, so a block is only complete once its
// bottom-right sample has been seen, F-1 rows after its first sample. Rather
// than buffering those F-1 rows of raw samples, the builder keeps one running
// sum per output column (W/F sums) and emits a block the moment it closes.
// The sums are reset as they are emitted, so the same row of accumulators
// serves every block row.
//
//   input row y      accumulators (F=2, W=8)
//   y=0  a b c d ...   [a+b, c+d, ...]
//   y=1  e f g h ...   [a+b+e+f ✔ emit, c+d+g+h ✔ emit, ...] → reset
//
// Chaining K builders gives K downscaled levels; `plan_levels` computes and
// checks their shapes up front, `Pyramid::build` is the whole-image reference.

use crate::error::{ConfigError, StreamError};
use crate::image::Image;
use crate::stream::{FrameShape, RasterCursor, Sample, Stage};

// ---------------------------------------------------------------------------
// Level plan
// ---------------------------------------------------------------------------

/// One resolution of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ScaleLevel {
    /// 0 is full resolution.
    pub index: usize,
    pub width: usize,
    pub height: usize,
    /// Cumulative downscale factor relative to full resolution (F^index).
    pub scale: usize,
}

impl ScaleLevel {
    #[inline]
    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }
}

/// Compute the shapes of `num_levels` pyramid levels and reject any plan the
/// streaming stages cannot run.
///
/// Every level must divide evenly (no samples are dropped at the right or
/// bottom edge) and must still fit a `kernel × kernel` window.
pub fn plan_levels(
    width: usize,
    height: usize,
    factor: usize,
    num_levels: usize,
    kernel: usize,
) -> Result<Vec<ScaleLevel>, ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::EmptyFrame { width, height });
    }
    if factor < 2 {
        return Err(ConfigError::InvalidFactor(factor));
    }
    if num_levels == 0 {
        return Err(ConfigError::NoLevels);
    }

    let mut levels = Vec::with_capacity(num_levels);
    let mut scale = 1usize;
    for index in 0..num_levels {
        if index > 0 {
            scale = scale
                .checked_mul(factor)
                .ok_or(ConfigError::NotDivisible { level: index, width, height, scale })?;
        }
        if width % scale != 0 || height % scale != 0 {
            return Err(ConfigError::NotDivisible { level: index, width, height, scale });
        }
        let level = ScaleLevel {
            index,
            width: width / scale,
            height: height / scale,
            scale,
        };
        if level.width < kernel || level.height < kernel {
            return Err(ConfigError::LevelTooSmall {
                level: index,
                width: level.width,
                height: level.height,
                kernel,
            });
        }
        levels.push(level);
    }
    Ok(levels)
}

// ---------------------------------------------------------------------------
// PyramidBuilder (streaming)
// ---------------------------------------------------------------------------

/// Streaming F×F block-mean downscaler: F² inputs per output.
#[derive(Debug, Clone)]
pub struct PyramidBuilder {
    factor: usize,
    out_shape: FrameShape,
    /// Running block sums for the current block row, one per output column.
    sums: Vec<u32>,
    cursor: RasterCursor,
}

impl PyramidBuilder {
    /// # Panics
    /// Panics if `factor < 2` or the input is smaller than one block.
    pub fn new(input: FrameShape, factor: usize) -> Self {
        assert!(factor >= 2, "downscale factor must be >= 2 (got {factor})");
        assert!(
            input.width >= factor && input.height >= factor,
            "frame {}x{} is smaller than one {factor}x{factor} block",
            input.width,
            input.height,
        );
        let out_shape = FrameShape::new(input.width / factor, input.height / factor);
        PyramidBuilder {
            factor,
            out_shape,
            sums: vec![0; out_shape.width],
            cursor: RasterCursor::new(input),
        }
    }

    fn clear(&mut self) {
        self.sums.iter_mut().for_each(|s| *s = 0);
    }
}

impl Stage for PyramidBuilder {
    type Input = Sample<u8>;
    type Output = Sample<u8>;

    fn push<E>(&mut self, sample: Sample<u8>, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(Sample<u8>) -> Result<(), StreamError>,
    {
        let step = match self.cursor.advance(sample.last) {
            Ok(step) => step,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };

        let f = self.factor;
        let (bx, by) = (step.x / f, step.y / f);
        // Samples past the last whole block (non-divisible frames) are skipped.
        if bx < self.out_shape.width && by < self.out_shape.height {
            self.sums[bx] += u32::from(sample.value);

            if step.x % f == f - 1 && step.y % f == f - 1 {
                let mean = self.sums[bx] / (f * f) as u32;
                self.sums[bx] = 0;
                let p = by * self.out_shape.width + bx;
                emit(Sample {
                    value: mean as u8,
                    last: p + 1 == self.out_shape.len(),
                })?;
            }
        }

        if step.last {
            self.clear();
        }
        Ok(())
    }

    fn cursor(&self) -> &RasterCursor {
        &self.cursor
    }
}

// ---------------------------------------------------------------------------
// Whole-image reference
// ---------------------------------------------------------------------------

/// Downscale a whole frame by `factor` with truncated block means.
pub fn downscale_block_mean(src: &Image<u8>, factor: usize) -> Image<u8> {
    assert!(factor >= 1, "downscale factor must be >= 1");
    let area = (factor * factor) as u32;
    Image::from_fn(src.width() / factor, src.height() / factor, |bx, by| {
        let mut sum = 0u32;
        for i in 0..factor {
            for j in 0..factor {
                sum += u32::from(src.get(bx * factor + j, by * factor + i));
            }
        }
        (sum / area) as u8
    })
}

/// All levels of a block-mean pyramid, finest first.
pub struct Pyramid {
    pub levels: Vec<Image<u8>>,
}

impl Pyramid {
    /// Build `num_levels` levels from a full-resolution intensity frame.
    pub fn build(src: &Image<u8>, factor: usize, num_levels: usize) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");
        let mut levels = Vec::with_capacity(num_levels);
        levels.push(src.clone());
        for k in 1..num_levels {
            let next = downscale_block_mean(&levels[k - 1], factor);
            levels.push(next);
        }
        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

// bbox.rs — Bounding boxes and the per-level extractor.
//
// A detection bit at level-local (cx, cy) on a level with cumulative scale S
// becomes a box around the full-resolution point (cx·S, cy·S):
//
//   r = S · (KW + 1) / 2          (3 at level 0 for the 5×5 kernel)
//   (x1, y1, x2, y2) = (cx·S − r, cy·S − r, cx·S + r, cy·S + r)
//
// Corners are clamped into the output range [−1, max(W, H)]. At level 0 that
// never changes a box, since the LoG border keeps cx in [2, W−3]. Every
// sub-stream ends with
// one TERMINATOR record (all fields −1) after the level's last raster
// element, whether or not anything was detected.

use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::pyramid::ScaleLevel;
use crate::stream::{RasterCursor, Sample, Stage};

/// A detection in full-resolution pixel coordinates, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// End-of-stream marker.
pub const TERMINATOR: BoundingBox = BoundingBox {
    x1: -1,
    y1: -1,
    x2: -1,
    y2: -1,
};

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        BoundingBox { x1, y1, x2, y2 }
    }

    pub fn from_center_radius(cx: i32, cy: i32, r: i32) -> Self {
        BoundingBox {
            x1: cx - r,
            y1: cy - r,
            x2: cx + r,
            y2: cy + r,
        }
    }

    #[inline]
    pub fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    #[inline]
    pub fn radius(&self) -> i32 {
        (self.x2 - self.x1) / 2
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        *self == TERMINATOR
    }

    /// Clamp every corner into `[-1, max(width, height)]`.
    pub fn clip(self, width: usize, height: usize) -> Self {
        let hi = width.max(height) as i32;
        BoundingBox {
            x1: self.x1.clamp(-1, hi),
            y1: self.y1.clamp(-1, hi),
            x2: self.x2.clamp(-1, hi),
            y2: self.y2.clamp(-1, hi),
        }
    }
}

/// Box radius for a detection at cumulative scale `scale`.
#[inline]
pub fn box_radius(scale: usize, kernel_width: usize) -> i32 {
    (scale * (kernel_width + 1) / 2) as i32
}

// ---------------------------------------------------------------------------
// BoundingBoxExtractor
// ---------------------------------------------------------------------------

/// Turns one level's detection mask into its bounding-box sub-stream.
#[derive(Debug, Clone)]
pub struct BoundingBoxExtractor {
    scale: i32,
    radius: i32,
    /// Full-resolution frame size, for clamping.
    frame_width: usize,
    frame_height: usize,
    cursor: RasterCursor,
}

impl BoundingBoxExtractor {
    pub fn new(level: ScaleLevel, kernel_width: usize) -> Self {
        BoundingBoxExtractor {
            scale: level.scale as i32,
            radius: box_radius(level.scale, kernel_width),
            frame_width: level.width * level.scale,
            frame_height: level.height * level.scale,
            cursor: RasterCursor::new(level.shape()),
        }
    }

    #[inline]
    pub fn radius(&self) -> i32 {
        self.radius
    }
}

impl Stage for BoundingBoxExtractor {
    type Input = Sample<bool>;
    type Output = BoundingBox;

    fn push<E>(&mut self, sample: Sample<bool>, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(BoundingBox) -> Result<(), StreamError>,
    {
        let step = self.cursor.advance(sample.last)?;
        if sample.value {
            let cx = step.x as i32 * self.scale;
            let cy = step.y as i32 * self.scale;
            emit(BoundingBox::from_center_radius(cx, cy, self.radius).clip(self.frame_width, self.frame_height))?;
        }
        if step.last {
            emit(TERMINATOR)?;
        }
        Ok(())
    }

    fn cursor(&self) -> &RasterCursor {
        &self.cursor
    }
}

/// Read one box stream up to (not including) its terminator.
pub fn collect_boxes(rx: &Receiver<BoundingBox>) -> Result<Vec<BoundingBox>, StreamError> {
    let mut boxes = Vec::new();
    for b in rx.iter() {
        if b.is_terminator() {
            return Ok(boxes);
        }
        boxes.push(b);
    }
    Err(StreamError::MissingTerminator { received: boxes.len() })
}

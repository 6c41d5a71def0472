// window.rs — Generic sliding-window engine over a raster stream.
//
// Turns a 1-D raster stream of IN samples into a 1-D raster stream of OUT
// samples, where every OUT is computed from the KH×KW neighborhood centered
// on the same position. One sample in, one sample out: after the initial
// fill latency every input produces exactly one output, and the tail of the
// frame is flushed when the end-of-frame sample arrives.
//
// BUFFERS (all fixed-size, addressed with explicit modular indices):
//
//   row buffer  KH × W   — the last KH input rows. Row slot `y % KH` receives
//                          row y, so the oldest row is always the slot after
//                          the one being written.
//   window      KH × KW  — the last KW columns copied out of the row buffer.
//                          Column slots rotate the same way.
//
//   rows (KH=3)             window (KH=3, KW=3)
//   slot 0: row 3  ◀ tail   [c4 c5 c3]   rows in row-buffer slot order,
//   slot 1: row 1  ◀ oldest [c4 c5 c3]   columns in rotating slot order;
//   slot 2: row 2           [c4 c5 c3]   start_col = slot of c3
//
// Neither buffer is ever shifted. The window function receives the buffer
// plus a (start_row, start_col) rotation and reads it in window-relative
// order through `Window::get`.
//
// TIMING:
//   fill latency L = KW/2 + W·(KH/2)
//   output p is produced on input step t = p + L, when the newest sample is
//   exactly the bottom-right corner of p's window.
//   Outputs within KH/2 rows of the top/bottom or KW/2 columns of the
//   left/right border are a fixed border value; the window function is
//   never called there.

use crate::error::StreamError;
use crate::stream::{FrameShape, RasterCursor, Sample, Stage};

/// `(i + 1) mod n` without relying on integer wraparound.
#[inline(always)]
fn next_slot(i: usize, n: usize) -> usize {
    if i + 1 == n {
        0
    } else {
        i + 1
    }
}

// ---------------------------------------------------------------------------
// Window view
// ---------------------------------------------------------------------------

/// A KH×KW neighborhood stored in rotated buffer coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a, T> {
    cells: &'a [T],
    height: usize,
    width: usize,
    start_row: usize,
    start_col: usize,
}

impl<'a, T: Copy> Window<'a, T> {
    /// Build a view over `cells` (row-major, `height * width` long).
    ///
    /// # Panics
    /// Panics if the buffer length or rotation offsets are inconsistent.
    pub fn new(cells: &'a [T], height: usize, width: usize, start_row: usize, start_col: usize) -> Self {
        assert_eq!(cells.len(), height * width, "window buffer must be height * width");
        assert!(start_row < height && start_col < width, "rotation offset out of range");
        Window {
            cells,
            height,
            width,
            start_row,
            start_col,
        }
    }

    /// An unrotated view: `get(r, c) == cells[r * width + c]`.
    pub fn unrotated(cells: &'a [T], height: usize, width: usize) -> Self {
        Self::new(cells, height, width, 0, 0)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Buffer row holding window row 0.
    #[inline]
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    /// Buffer column holding window column 0.
    #[inline]
    pub fn start_col(&self) -> usize {
        self.start_col
    }

    /// Window-relative access: (0, 0) is the top-left of the neighborhood.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        debug_assert!(row < self.height && col < self.width);
        let r = (self.start_row + row) % self.height;
        let c = (self.start_col + col) % self.width;
        self.cells[r * self.width + c]
    }

    /// The sample the window is centered on.
    #[inline]
    pub fn center(&self) -> T {
        self.get(self.height / 2, self.width / 2)
    }

    /// All cells as `(row, col, value)` in window-relative raster order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |r| (0..self.width).map(move |c| (r, c, self.get(r, c))))
    }
}

// ---------------------------------------------------------------------------
// Window function strategy
// ---------------------------------------------------------------------------

/// A pure per-window computation.
///
/// Implemented by kernel types in `convolution` and `blob`, and by any
/// `Fn(&Window<T>) -> O` closure.
pub trait WindowFn<T> {
    type Output;

    fn apply(&self, window: &Window<'_, T>) -> Self::Output;
}

impl<T, O, F> WindowFn<T> for F
where
    F: Fn(&Window<'_, T>) -> O,
{
    type Output = O;

    #[inline]
    fn apply(&self, window: &Window<'_, T>) -> O {
        self(window)
    }
}

// ---------------------------------------------------------------------------
// SlidingWindowEngine
// ---------------------------------------------------------------------------

/// Streaming KH×KW window operator with zero-valued borders.
pub struct SlidingWindowEngine<I, F>
where
    F: WindowFn<I>,
{
    shape: FrameShape,
    kernel_height: usize,
    kernel_width: usize,
    rows: Vec<I>,
    window: Vec<I>,
    /// Row-buffer slot receiving the current input row.
    row_slot: usize,
    /// Window column slot receiving the next copied column.
    col_slot: usize,
    start_row: usize,
    start_col: usize,
    latency: usize,
    cursor: RasterCursor,
    border: F::Output,
    func: F,
}

impl<I, F> SlidingWindowEngine<I, F>
where
    I: Copy + Default,
    F: WindowFn<I>,
    F::Output: Clone + Default,
{
    /// Create an engine for `shape` frames and a `kernel_height × kernel_width`
    /// window. The border value is `F::Output::default()`.
    ///
    /// # Panics
    /// Panics if a kernel dimension is even, zero, or larger than the frame.
    pub fn new(shape: FrameShape, kernel_height: usize, kernel_width: usize, func: F) -> Self {
        assert!(
            kernel_height % 2 == 1 && kernel_width % 2 == 1,
            "kernel dimensions must be odd (got {kernel_height}x{kernel_width})"
        );
        assert!(
            kernel_height <= shape.height && kernel_width <= shape.width,
            "kernel {kernel_height}x{kernel_width} does not fit in frame {}x{}",
            shape.width,
            shape.height,
        );

        SlidingWindowEngine {
            shape,
            kernel_height,
            kernel_width,
            rows: vec![I::default(); kernel_height * shape.width],
            window: vec![I::default(); kernel_height * kernel_width],
            row_slot: 0,
            col_slot: 0,
            start_row: 0,
            start_col: 0,
            latency: kernel_width / 2 + shape.width * (kernel_height / 2),
            cursor: RasterCursor::new(shape),
            border: F::Output::default(),
            func,
        }
    }
}

impl<I, F> SlidingWindowEngine<I, F>
where
    I: Copy,
    F: WindowFn<I>,
    F::Output: Clone,
{
    /// Replace the value emitted at border positions.
    pub fn with_border(mut self, border: F::Output) -> Self {
        self.border = border;
        self
    }

    /// Input samples consumed before the first output is produced.
    #[inline]
    pub fn latency(&self) -> usize {
        self.latency
    }

    #[inline]
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Store one input sample and, once KH-1 rows are buffered, copy its
    /// column into the window.
    fn ingest(&mut self, x: usize, y: usize, value: I) {
        let w = self.shape.width;
        let kh = self.kernel_height;
        let kw = self.kernel_width;

        self.rows[self.row_slot * w + x] = value;

        if y + 1 >= kh {
            for r in 0..kh {
                self.window[r * kw + self.col_slot] = self.rows[r * w + x];
            }
            self.start_row = next_slot(self.row_slot, kh);
            self.start_col = next_slot(self.col_slot, kw);
            self.col_slot = next_slot(self.col_slot, kw);
        }

        if x + 1 == w {
            self.row_slot = next_slot(self.row_slot, kh);
        }
    }

    /// Compute output number `p` of the frame.
    fn output(&self, p: usize) -> Sample<F::Output> {
        let w = self.shape.width;
        let h = self.shape.height;
        let (x, y) = (p % w, p / w);
        let half_h = self.kernel_height / 2;
        let half_w = self.kernel_width / 2;

        let on_border = x < half_w || x + half_w >= w || y < half_h || y + half_h >= h;
        let value = if on_border {
            self.border.clone()
        } else {
            let window = Window {
                cells: &self.window,
                height: self.kernel_height,
                width: self.kernel_width,
                start_row: self.start_row,
                start_col: self.start_col,
            };
            self.func.apply(&window)
        };
        Sample {
            value,
            last: p + 1 == self.shape.len(),
        }
    }

    fn reset_frame(&mut self) {
        self.row_slot = 0;
        self.col_slot = 0;
        self.start_row = 0;
        self.start_col = 0;
        self.cursor.reset();
    }
}

impl<I, F> Stage for SlidingWindowEngine<I, F>
where
    I: Copy,
    F: WindowFn<I>,
    F::Output: Clone,
{
    type Input = Sample<I>;
    type Output = Sample<F::Output>;

    fn push<E>(&mut self, sample: Sample<I>, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(Sample<F::Output>) -> Result<(), StreamError>,
    {
        let step = match self.cursor.advance(sample.last) {
            Ok(step) => step,
            Err(e) => {
                self.reset_frame();
                return Err(e);
            }
        };

        self.ingest(step.x, step.y, sample.value);
        if step.index >= self.latency {
            emit(self.output(step.index - self.latency))?;
        }

        if step.last {
            // No more input: the remaining L outputs all lie on the bottom
            // or right border, so they need nothing new from the buffers.
            let n = self.shape.len();
            for p in (n - self.latency)..n {
                emit(self.output(p))?;
            }
            self.reset_frame();
        }
        Ok(())
    }

    fn cursor(&self) -> &RasterCursor {
        &self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::stream::run_to_vec;

    fn sum3(w: &Window<'_, i32>) -> i32 {
        w.iter().map(|(_, _, v)| v).sum()
    }

    #[test]
    fn test_latency() {
        let engine = SlidingWindowEngine::new(FrameShape::new(32, 32), 5, 5, |_: &Window<'_, u8>| 0u8);
        assert_eq!(engine.latency(), 2 + 32 * 2);
        let engine = SlidingWindowEngine::new(FrameShape::new(10, 4), 1, 3, |_: &Window<'_, u8>| 0u8);
        assert_eq!(engine.latency(), 1);
    }

    #[test]
    fn test_box_sum_on_ramp() {
        // 32×32 ramp, 3×3 sum. Interior output at (x, y) is the sum of the
        // nine ramp values around it = 9 * center.
        let img = Image::from_fn(32, 32, |x, y| (y * 32 + x) as i32);
        let mut engine = SlidingWindowEngine::new(img.shape(), 3, 3, sum3);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        let out = Image::from_samples(32, 32, out).unwrap();

        for (x, y, v) in out.pixels() {
            let interior = (1..31).contains(&x) && (1..31).contains(&y);
            let expected = if interior { 9 * img.get(x, y) } else { 0 };
            assert_eq!(v, expected, "mismatch at ({x}, {y})");
        }
    }

    #[test]
    fn test_window_relative_order() {
        // Encode (row, col) of the source into each pixel and check that the
        // window function sees the neighborhood in window-relative order.
        let img = Image::from_fn(7, 6, |x, y| (y * 100 + x) as i32);
        let probe = |w: &Window<'_, i32>| {
            let c = w.center();
            let mut ok = true;
            for (r, col, v) in w.iter() {
                let dy = r as i32 - 1;
                let dx = col as i32 - 2;
                ok &= v == c + dy * 100 + dx;
            }
            if ok {
                1
            } else {
                -1
            }
        };
        let mut engine = SlidingWindowEngine::new(img.shape(), 3, 5, probe);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        let out = Image::from_samples(7, 6, out).unwrap();
        for y in 1..5 {
            for x in 2..5 {
                assert_eq!(out.get(x, y), 1, "window misordered at ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_custom_border_value() {
        let img = Image::<u8>::new(5, 5);
        let mut engine =
            SlidingWindowEngine::new(img.shape(), 3, 3, |_: &Window<'_, u8>| 1u8).with_border(7);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        let out = Image::from_samples(5, 5, out).unwrap();
        assert_eq!(out.get(0, 0), 7);
        assert_eq!(out.get(4, 2), 7);
        assert_eq!(out.get(2, 2), 1);
    }

    #[test]
    fn test_consecutive_frames_are_independent() {
        let a = Image::from_fn(6, 5, |x, y| (x + y) as i32);
        let b = Image::from_fn(6, 5, |x, y| (x * y) as i32);
        let mut engine = SlidingWindowEngine::new(a.shape(), 3, 3, sum3);

        let out_b_alone = run_to_vec(&mut engine, b.samples()).unwrap();
        let both = run_to_vec(&mut engine, a.samples().chain(b.samples())).unwrap();
        assert_eq!(both.len(), 60);
        assert_eq!(&both[30..], &out_b_alone[..]);
    }

    #[test]
    fn test_one_by_one_kernel_is_identity() {
        let img = Image::from_fn(4, 3, |x, y| (x * 3 + y) as i32);
        let mut engine = SlidingWindowEngine::new(img.shape(), 1, 1, |w: &Window<'_, i32>| w.center());
        assert_eq!(engine.latency(), 0);
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        assert_eq!(out, img.samples().collect::<Vec<_>>());
    }

    #[test]
    fn test_misplaced_flag_aborts_and_recovers() {
        let img = Image::from_fn(4, 4, |x, _| x as i32);
        let mut engine = SlidingWindowEngine::new(img.shape(), 3, 3, sum3);

        let mut bad: Vec<_> = img.samples().take(6).collect();
        bad[5].last = true;
        let err = run_to_vec(&mut engine, bad).unwrap_err();
        assert_eq!(err, StreamError::MisplacedEndOfFrame { index: 5, expected: 15 });

        // The engine starts over cleanly on the next frame.
        let out = run_to_vec(&mut engine, img.samples()).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out[5].value, 9);
    }

    #[test]
    #[should_panic(expected = "odd")]
    fn test_even_kernel_panics() {
        SlidingWindowEngine::new(FrameShape::new(8, 8), 4, 3, |_: &Window<'_, u8>| 0u8);
    }
}

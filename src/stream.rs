// stream.rs — Raster sample streams and the stage abstraction.
//
// Every component of the detector is a *stage*: it consumes one element at a
// time from an input stream and emits zero or more elements to an output
// stream, strictly in arrival order. Frames are delimited in-band: each
// element carries an end-of-frame flag, set only on the final raster element.
//
//   source ──Sample<Rgba>──▶ grayscale ──Sample<u8>──▶ ... ──BoundingBox──▶ sink
//
// Stages are written once against the `Stage` trait and can then be driven
// two ways:
//   - `run_stage`  — on its own thread, between two bounded crossbeam channels
//                    (the dataflow pipeline; a full channel is backpressure)
//   - `run_to_vec` — over an in-memory sequence (sequential path and tests)
//
// RASTER CURSOR:
// Every index computation inside a stage depends on the fixed raster length
// W×H, so a frame whose flag is misplaced or missing cannot be processed
// further. `RasterCursor` is the one place that checks the flag protocol and
// turns a running element count into (x, y).

use crossbeam::channel::{Receiver, Sender};
use log::{debug, trace};

use crate::error::StreamError;

// ---------------------------------------------------------------------------
// Sample<T>
// ---------------------------------------------------------------------------

/// One stream element: a value plus its end-of-frame flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample<T> {
    pub value: T,
    /// True only on the final raster element of a frame.
    pub last: bool,
}

impl<T> Sample<T> {
    /// An element somewhere inside a frame.
    #[inline]
    pub fn new(value: T) -> Self {
        Sample { value, last: false }
    }

    /// The final element of a frame.
    #[inline]
    pub fn end(value: T) -> Self {
        Sample { value, last: true }
    }

    /// Replace the value, keeping the flag. This is how every 1:1 stage
    /// passes the end-of-frame flag through unchanged.
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sample<U> {
        Sample {
            value: f(self.value),
            last: self.last,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameShape / RasterCursor
// ---------------------------------------------------------------------------

/// Dimensions of the raster a stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: usize,
    pub height: usize,
}

impl FrameShape {
    pub fn new(width: usize, height: usize) -> Self {
        FrameShape { width, height }
    }

    /// Number of elements in one frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where the element just consumed sits in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterStep {
    pub x: usize,
    pub y: usize,
    pub index: usize,
    /// This element closed the frame.
    pub last: bool,
}

/// Tracks the raster position of a stream and validates its frame flags.
///
/// After the final element of a frame the cursor rewinds to index 0, so a
/// stage can process back-to-back frames without being rebuilt.
#[derive(Debug, Clone)]
pub struct RasterCursor {
    shape: FrameShape,
    index: usize,
}

impl RasterCursor {
    /// # Panics
    /// Panics if the shape has zero elements.
    pub fn new(shape: FrameShape) -> Self {
        assert!(!shape.is_empty(), "raster must have at least one element");
        RasterCursor { shape, index: 0 }
    }

    #[inline]
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Elements consumed so far in the current frame.
    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    /// True while a frame is partially consumed.
    #[inline]
    pub fn in_frame(&self) -> bool {
        self.index > 0
    }

    /// Consume one element carrying the end-of-frame flag `last`.
    pub fn advance(&mut self, last: bool) -> Result<RasterStep, StreamError> {
        let index = self.index;
        let final_index = self.shape.len() - 1;

        if last && index != final_index {
            self.index = 0;
            return Err(StreamError::MisplacedEndOfFrame {
                index,
                expected: final_index,
            });
        }
        if !last && index == final_index {
            self.index = 0;
            return Err(StreamError::MissingEndOfFrame { index });
        }

        self.index = if last { 0 } else { index + 1 };
        Ok(RasterStep {
            x: index % self.shape.width,
            y: index / self.shape.width,
            index,
            last,
        })
    }

    /// Drop any partially consumed frame.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// A single-threaded streaming transform.
///
/// `push` consumes exactly one input element and calls `emit` for every
/// output element it produces, in order. `emit` fails only when the
/// downstream consumer has gone away; stages propagate that with `?`.
pub trait Stage {
    type Input;
    type Output;

    fn push<E>(&mut self, item: Self::Input, emit: &mut E) -> Result<(), StreamError>
    where
        E: FnMut(Self::Output) -> Result<(), StreamError>;

    /// The cursor over this stage's *input* raster.
    fn cursor(&self) -> &RasterCursor;
}

/// Drive `stage` between two channels until the input disconnects.
///
/// Returns the number of complete frames processed. An input that closes
/// mid-frame is reported as `StreamError::Truncated`.
pub fn run_stage<S>(
    name: &str,
    mut stage: S,
    input: Receiver<S::Input>,
    output: Sender<S::Output>,
) -> Result<usize, StreamError>
where
    S: Stage,
{
    let mut frames = 0usize;
    let mut emit = |item: S::Output| output.send(item).map_err(|_| StreamError::Disconnected);

    for item in input.iter() {
        stage.push(item, &mut emit)?;
        if !stage.cursor().in_frame() {
            frames += 1;
            debug!("{name}: frame {frames} complete");
        }
    }

    let cursor = stage.cursor();
    if cursor.in_frame() {
        return Err(StreamError::Truncated {
            received: cursor.position(),
            expected: cursor.shape().len(),
        });
    }
    trace!("{name}: input closed after {frames} frame(s)");
    Ok(frames)
}

/// Run `stage` over an in-memory sequence that holds whole frames.
pub fn run_to_vec<S, I>(stage: &mut S, items: I) -> Result<Vec<S::Output>, StreamError>
where
    S: Stage,
    I: IntoIterator<Item = S::Input>,
{
    let mut out = Vec::new();
    let mut emit = |item: S::Output| {
        out.push(item);
        Ok(())
    };
    for item in items {
        stage.push(item, &mut emit)?;
    }

    let cursor = stage.cursor();
    if cursor.in_frame() {
        return Err(StreamError::Truncated {
            received: cursor.position(),
            expected: cursor.shape().len(),
        });
    }
    Ok(out)
}

/// Duplicate every element of `input` onto each of `outputs`, in order.
///
/// Returns the number of elements forwarded once the input disconnects.
pub fn tee<T: Clone>(name: &str, input: Receiver<T>, outputs: &[Sender<T>]) -> Result<usize, StreamError> {
    let mut count = 0usize;
    for item in input.iter() {
        if let Some((tail, head)) = outputs.split_last() {
            for tx in head {
                tx.send(item.clone()).map_err(|_| StreamError::Disconnected)?;
            }
            tail.send(item).map_err(|_| StreamError::Disconnected)?;
        }
        count += 1;
    }
    trace!("{name}: duplicated {count} element(s) onto {} output(s)", outputs.len());
    Ok(count)
}

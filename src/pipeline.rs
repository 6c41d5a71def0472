// pipeline.rs — BlobDetector: the multiscale detection dataflow graph.
//
// One thread per stage, bounded crossbeam channels between them:
//
//   input ─▶ grayscale ─▶ tee ─┬───────────────────────────────▶ branch 0
//                              └▶ downscale ─▶ tee ─┬──────────▶ branch 1
//                                                   └▶ downscale ─▶ ... ▶ branch N-1
//
//   branch k:  threshold ─▶ LoG 5×5 ─▶ bbox extractor ─┐
//                                                      ├─▶ merger ─▶ output
//   (one per level, no shared state)                 ──┘
//
// A full channel blocks its producer, so memory stays bounded no matter how
// far one branch runs ahead; the merger never waits on a single branch (see
// merge.rs), which is what keeps the fan-out from deadlocking.
//
// SHUTDOWN:
// The graph runs until the input channel disconnects. Every stage returns
// when its input closes, dropping its output sender, so the close propagates
// downstream stage by stage. A failing stage drops both ends at once: its
// consumers see a truncated stream, its producers a disconnected one. Of all
// the resulting errors, the one reported is the first that is neither of
// those knock-on effects.
//
// `detect_sequential` runs the same stages one after another over in-memory
// buffers. It yields the same set of boxes as the threaded graph; only the
// interleaving of levels in the merged output can differ.

use std::thread::{Scope, ScopedJoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::bbox::{collect_boxes, BoundingBox, BoundingBoxExtractor};
use crate::blob::{LogBlobDetector, LogDetection};
use crate::config::{DetectorConfig, LOG_KERNEL_SIZE};
use crate::convert::GrayscaleConverter;
use crate::error::{ConfigError, Result, StreamError};
use crate::image::{Image, Rgba};
use crate::merge::StreamMerger;
use crate::pyramid::{PyramidBuilder, ScaleLevel};
use crate::stream::{run_stage, run_to_vec, tee, FrameShape, Sample};
use crate::threshold::MonochromeThresholder;

/// Totals over every frame of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    /// Boxes forwarded to the output.
    pub boxes: usize,
    /// Boxes discarded by the merge cap.
    pub dropped: usize,
}

/// A configured multiscale blob detector.
pub struct BlobDetector {
    config: DetectorConfig,
    levels: Vec<ScaleLevel>,
    intensity_threshold: u8,
    detection: LogDetection,
}

type StageHandle<'scope> = (String, ScopedJoinHandle<'scope, std::result::Result<(), StreamError>>);

impl BlobDetector {
    /// Validate `config` and plan the pyramid.
    pub fn new(config: DetectorConfig) -> std::result::Result<Self, ConfigError> {
        let levels = config.validate()?;
        let intensity_threshold = config.intensity_threshold()?;
        let detection = config.log_detection()?;

        info!(
            "blob detector: {}x{} frame, {} level(s), factor {}, intensity threshold {}, LoG threshold {} (raw)",
            config.width,
            config.height,
            levels.len(),
            config.downscale_factor,
            intensity_threshold,
            detection.threshold_raw(),
        );
        for level in &levels {
            debug!(
                "  level {}: {}x{} (scale {})",
                level.index, level.width, level.height, level.scale
            );
        }

        Ok(BlobDetector {
            config,
            levels,
            intensity_threshold,
            detection,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The validated pyramid plan, finest level first.
    pub fn levels(&self) -> &[ScaleLevel] {
        &self.levels
    }

    /// Full-resolution input shape.
    pub fn frame_shape(&self) -> FrameShape {
        FrameShape::new(self.config.width, self.config.height)
    }

    // -----------------------------------------------------------------------
    // Threaded graph
    // -----------------------------------------------------------------------

    /// Run the dataflow graph until `input` disconnects.
    ///
    /// Each frame's boxes are written to `output` followed by one
    /// terminator.
    pub fn run(
        &self,
        input: Receiver<Sample<Rgba>>,
        output: Sender<BoundingBox>,
    ) -> std::result::Result<RunSummary, StreamError> {
        std::thread::scope(|s| {
            let mut stages: Vec<StageHandle<'_>> = Vec::new();
            let box_rxs = self.spawn_graph(s, input, &mut stages);

            let merged = self.merge_frames(&box_rxs, &output);
            // Unblock any branch still sending if the merge stopped early.
            drop(box_rxs);

            let mut errors = Vec::new();
            for (name, handle) in stages {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("stage '{name}' failed: {e}");
                        errors.push(e);
                    }
                    Err(_) => {
                        error!("stage '{name}' panicked");
                        errors.push(StreamError::StagePanicked(name));
                    }
                }
            }

            match merged {
                Ok(summary) if errors.is_empty() => Ok(summary),
                Ok(_) => Err(root_cause(errors)),
                Err(e) => {
                    errors.push(e);
                    Err(root_cause(errors))
                }
            }
        })
    }

    /// Spawn every stage thread; returns the per-level box streams.
    fn spawn_graph<'scope, 'env>(
        &self,
        s: &'scope Scope<'scope, 'env>,
        input: Receiver<Sample<Rgba>>,
        stages: &mut Vec<StageHandle<'scope>>,
    ) -> Vec<Receiver<BoundingBox>> {
        let cap = self.config.channel_capacity;
        let n = self.levels.len();
        let mut spawn = |name: String, f: Box<dyn FnOnce(&str) -> std::result::Result<(), StreamError> + Send + 'scope>| {
            let label = name.clone();
            stages.push((name, s.spawn(move || f(&label))));
        };

        let (gray_tx, gray_rx) = bounded(cap);
        let shape = self.frame_shape();
        spawn(
            "grayscale".into(),
            Box::new(move |name: &str| run_stage(name, GrayscaleConverter::new(shape), input, gray_tx).map(drop)),
        );

        // Level k's intensity stream feeds its own branch and, except for the
        // coarsest level, the next downscaler.
        let mut upstream = gray_rx;
        let mut branch_inputs = Vec::with_capacity(n);
        for k in 0..n - 1 {
            let (branch_tx, branch_rx) = bounded(cap);
            let (next_tx, next_rx) = bounded(cap);
            spawn(
                format!("tee-{k}"),
                Box::new(move |name: &str| tee(name, upstream, &[branch_tx, next_tx]).map(drop)),
            );
            branch_inputs.push(branch_rx);

            let (down_tx, down_rx) = bounded(cap);
            let builder = PyramidBuilder::new(self.levels[k].shape(), self.config.downscale_factor);
            spawn(
                format!("downscale-{}", k + 1),
                Box::new(move |name: &str| run_stage(name, builder, next_rx, down_tx).map(drop)),
            );
            upstream = down_rx;
        }
        branch_inputs.push(upstream);

        let mut box_rxs = Vec::with_capacity(n);
        for (level, branch_rx) in self.levels.iter().zip(branch_inputs) {
            let k = level.index;
            let (mask_tx, mask_rx) = bounded(cap);
            let (det_tx, det_rx) = bounded(cap);
            let (box_tx, box_rx) = bounded(cap);

            let thresholder = MonochromeThresholder::new(level.shape(), self.intensity_threshold);
            let detector = LogBlobDetector::new(level.shape(), self.detection.clone());
            let extractor = BoundingBoxExtractor::new(*level, LOG_KERNEL_SIZE);

            spawn(
                format!("threshold-{k}"),
                Box::new(move |name: &str| run_stage(name, thresholder, branch_rx, mask_tx).map(drop)),
            );
            spawn(
                format!("log-{k}"),
                Box::new(move |name: &str| run_stage(name, detector, mask_rx, det_tx).map(drop)),
            );
            spawn(
                format!("bbox-{k}"),
                Box::new(move |name: &str| run_stage(name, extractor, det_rx, box_tx).map(drop)),
            );
            box_rxs.push(box_rx);
        }
        box_rxs
    }

    fn merge_frames(
        &self,
        box_rxs: &[Receiver<BoundingBox>],
        output: &Sender<BoundingBox>,
    ) -> std::result::Result<RunSummary, StreamError> {
        let merger = StreamMerger::new(self.config.max_bboxes);
        let mut total = RunSummary::default();
        while let Some(frame) = merger.merge_frame(box_rxs, output)? {
            total.frames += 1;
            total.boxes += frame.forwarded;
            total.dropped += frame.dropped;
            info!("frame {}: {} box(es)", total.frames, frame.forwarded);
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // One-frame entry points
    // -----------------------------------------------------------------------

    fn check_frame(&self, frame: &Image<Rgba>) -> std::result::Result<(), StreamError> {
        if (frame.width(), frame.height()) != (self.config.width, self.config.height) {
            return Err(StreamError::FrameSizeMismatch {
                width: frame.width(),
                height: frame.height(),
                expected_width: self.config.width,
                expected_height: self.config.height,
            });
        }
        Ok(())
    }

    /// Detect blobs in one frame using the threaded graph.
    pub fn detect(&self, frame: &Image<Rgba>) -> Result<Vec<BoundingBox>> {
        self.check_frame(frame)?;
        let (in_tx, in_rx) = bounded(self.config.channel_capacity);
        let (out_tx, out_rx) = unbounded();

        std::thread::scope(|s| {
            s.spawn(move || {
                for sample in frame.samples() {
                    if in_tx.send(sample).is_err() {
                        break;
                    }
                }
            });
            self.run(in_rx, out_tx)
        })?;
        Ok(collect_boxes(&out_rx)?)
    }

    /// Detect blobs in one frame, running each stage to completion in turn.
    pub fn detect_sequential(&self, frame: &Image<Rgba>) -> Result<Vec<BoundingBox>> {
        self.check_frame(frame)?;

        let gray = run_to_vec(&mut GrayscaleConverter::new(self.frame_shape()), frame.samples())?;
        let mut streams = vec![gray];
        for k in 1..self.levels.len() {
            let mut builder = PyramidBuilder::new(self.levels[k - 1].shape(), self.config.downscale_factor);
            let next = run_to_vec(&mut builder, streams[k - 1].iter().copied())?;
            streams.push(next);
        }

        let mut box_rxs = Vec::with_capacity(self.levels.len());
        for (level, stream) in self.levels.iter().zip(streams) {
            let mask = run_to_vec(
                &mut MonochromeThresholder::new(level.shape(), self.intensity_threshold),
                stream,
            )?;
            let hits = run_to_vec(&mut LogBlobDetector::new(level.shape(), self.detection.clone()), mask)?;
            let boxes = run_to_vec(&mut BoundingBoxExtractor::new(*level, LOG_KERNEL_SIZE), hits)?;

            let (tx, rx) = unbounded();
            for b in boxes {
                tx.send(b).map_err(|_| StreamError::Disconnected)?;
            }
            box_rxs.push(rx);
        }

        let (out_tx, out_rx) = unbounded();
        StreamMerger::new(self.config.max_bboxes).merge_frame(&box_rxs, &out_tx)?;
        Ok(collect_boxes(&out_rx)?)
    }
}

/// First error that is not a knock-on effect of another stage failing.
fn root_cause(errors: Vec<StreamError>) -> StreamError {
    let secondary = |e: &StreamError| {
        matches!(
            e,
            StreamError::Disconnected
                | StreamError::Truncated { .. }
                | StreamError::UnterminatedSubStream { .. }
        )
    };
    let mut first = None;
    for e in errors {
        if !secondary(&e) {
            return e;
        }
        first.get_or_insert(e);
    }
    first.unwrap_or(StreamError::Disconnected)
}

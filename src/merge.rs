// merge.rs — StreamMerger: N terminated sub-streams → one capped stream.
//
// Each pyramid level produces its own bounding-box sub-stream, closed by a
// TERMINATOR. The merger forwards records from all of them onto one output,
// stops forwarding after `max_bboxes` records, and closes the output with
// exactly one global TERMINATOR.
//
// POLLING:
// The levels finish at very different times (level 0 sees 4^k times more
// pixels than level k), so a merger that blocks on one sub-stream at a time
// can stall the whole graph behind a full channel. Instead each sweep visits
// every live sub-stream once with a non-blocking `try_recv`. Only when a
// sweep finds nothing does it block, on all live sub-streams at once, via
// `crossbeam::channel::Select`. A sub-stream whose terminator has been seen
// is never polled again for the rest of the frame.
//
// CAP:
// Once `max_bboxes` records are out, the global TERMINATOR is sent
// immediately. The remaining records are still drained (and counted as
// dropped) until every sub-stream's terminator has arrived, so the next
// frame starts from a clean boundary on every input.

use crossbeam::channel::{Receiver, Select, Sender, TryRecvError};
use log::{debug, warn};

use crate::bbox::{BoundingBox, TERMINATOR};
use crate::error::StreamError;

/// Outcome of merging one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records written to the output (terminator excluded).
    pub forwarded: usize,
    /// Records discarded after the cap was reached.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Live,
    /// Terminator seen this frame.
    Exhausted,
    /// Channel closed.
    Ended,
}

/// Merges per-level bounding-box sub-streams.
#[derive(Debug, Clone, Copy)]
pub struct StreamMerger {
    max_bboxes: usize,
}

impl StreamMerger {
    pub fn new(max_bboxes: usize) -> Self {
        StreamMerger { max_bboxes }
    }

    /// Merge one frame.
    ///
    /// Returns `Ok(None)` if every input closed before delivering anything,
    /// which is how the end of a run is signalled. An input that closes after
    /// the frame has started, without its terminator, is an
    /// `UnterminatedSubStream` error.
    pub fn merge_frame(
        &self,
        inputs: &[Receiver<BoundingBox>],
        output: &Sender<BoundingBox>,
    ) -> Result<Option<MergeSummary>, StreamError> {
        if inputs.is_empty() {
            return Ok(None);
        }
        let mut state = vec![Input::Live; inputs.len()];
        let mut summary = MergeSummary::default();
        let mut started = false;
        let mut capped = false;
        let send = |b: BoundingBox| output.send(b).map_err(|_| StreamError::Disconnected);

        loop {
            let mut progress = false;
            for (i, rx) in inputs.iter().enumerate() {
                if state[i] != Input::Live {
                    continue;
                }
                match rx.try_recv() {
                    Ok(b) if b.is_terminator() => {
                        state[i] = Input::Exhausted;
                        started = true;
                        progress = true;
                    }
                    Ok(b) => {
                        started = true;
                        progress = true;
                        if summary.forwarded < self.max_bboxes {
                            send(b)?;
                            summary.forwarded += 1;
                            if summary.forwarded == self.max_bboxes {
                                send(TERMINATOR)?;
                                capped = true;
                            }
                        } else {
                            summary.dropped += 1;
                        }
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => state[i] = Input::Ended,
                }
            }

            if started {
                if let Some(index) = state.iter().position(|&s| s == Input::Ended) {
                    return Err(StreamError::UnterminatedSubStream { index });
                }
            }
            if state.iter().all(|&s| s == Input::Exhausted) {
                break;
            }
            if state.iter().all(|&s| s == Input::Ended) {
                return Ok(None);
            }

            if !progress {
                // Block until any live input has a record or closes.
                let mut sel = Select::new();
                for (i, rx) in inputs.iter().enumerate() {
                    if state[i] == Input::Live {
                        sel.recv(rx);
                    }
                }
                sel.ready();
            }
        }

        if !capped {
            send(TERMINATOR)?;
        }
        if summary.dropped > 0 {
            warn!(
                "merge cap of {} reached: dropped {} detection(s)",
                self.max_bboxes, summary.dropped
            );
        }
        debug!("merge: forwarded {}, dropped {}", summary.forwarded, summary.dropped);
        Ok(Some(summary))
    }

    /// Merge frames until every input closes. Returns one summary per frame.
    pub fn run(
        &self,
        inputs: &[Receiver<BoundingBox>],
        output: &Sender<BoundingBox>,
    ) -> Result<Vec<MergeSummary>, StreamError> {
        let mut frames = Vec::new();
        while let Some(summary) = self.merge_frame(inputs, output)? {
            frames.push(summary);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn b(n: i32) -> BoundingBox {
        BoundingBox::new(n, n, n + 1, n + 1)
    }

    #[test]
    fn test_empty_inputs_end_the_run() {
        let (tx, rx) = unbounded::<BoundingBox>();
        drop(tx);
        let (out_tx, out_rx) = unbounded();
        let merger = StreamMerger::new(4);
        assert_eq!(merger.merge_frame(&[rx], &out_tx), Ok(None));
        drop(out_tx);
        assert_eq!(out_rx.iter().count(), 0);
    }

    #[test]
    fn test_cap_truncates_and_drains() {
        let (tx, rx) = unbounded();
        for i in 0..5 {
            tx.send(b(i)).unwrap();
        }
        tx.send(TERMINATOR).unwrap();
        let (out_tx, out_rx) = unbounded();

        let summary = StreamMerger::new(3).merge_frame(&[rx.clone()], &out_tx).unwrap();
        assert_eq!(summary, Some(MergeSummary { forwarded: 3, dropped: 2 }));
        drop(out_tx);
        let out: Vec<_> = out_rx.iter().collect();
        assert_eq!(out, vec![b(0), b(1), b(2), TERMINATOR]);
        assert!(rx.is_empty(), "sub-stream drained to its terminator");
    }

    #[test]
    fn test_unterminated_after_start() {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded::<BoundingBox>();
        a_tx.send(b(1)).unwrap();
        drop(b_tx);
        let (out_tx, _out_rx) = unbounded();
        let err = StreamMerger::new(8).merge_frame(&[a_rx, b_rx], &out_tx).unwrap_err();
        assert_eq!(err, StreamError::UnterminatedSubStream { index: 1 });
    }

    #[test]
    fn test_run_counts_frames() {
        let (tx, rx) = unbounded();
        for frame in 0..3 {
            for i in 0..frame {
                tx.send(b(i)).unwrap();
            }
            tx.send(TERMINATOR).unwrap();
        }
        drop(tx);
        let (out_tx, out_rx) = unbounded();
        let frames = StreamMerger::new(16).run(&[rx], &out_tx).unwrap();
        assert_eq!(frames.iter().map(|s| s.forwarded).collect::<Vec<_>>(), vec![0, 1, 2]);
        drop(out_tx);
        assert_eq!(out_rx.iter().filter(|b| b.is_terminator()).count(), 3);
    }
}

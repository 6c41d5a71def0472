// error.rs — Error types for setup, stream contract violations, and I/O.
//
// Three layers, matching the three ways a run can go wrong:
//   ConfigError  — rejected at setup, before any frame enters the pipeline
//   StreamError  — a stage saw a malformed stream and aborted the frame
//   Error        — crate-level wrapper used by the public entry points
//
// Exceeding the bounding-box cap is NOT an error; the merger truncates.

use thiserror::Error;

/// Configuration rejected at setup time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("frame dimensions must be non-zero (got {width}x{height})")]
    EmptyFrame { width: usize, height: usize },

    #[error("downscale factor must be >= 2 (got {0})")]
    InvalidFactor(usize),

    #[error("pyramid must have at least 1 level")]
    NoLevels,

    #[error(
        "level {level}: frame {width}x{height} is not divisible by cumulative factor {scale}"
    )]
    NotDivisible {
        level: usize,
        width: usize,
        height: usize,
        scale: usize,
    },

    #[error("level {level}: {width}x{height} is smaller than the {kernel}x{kernel} kernel")]
    LevelTooSmall {
        level: usize,
        width: usize,
        height: usize,
        kernel: usize,
    },

    #[error("{name} must lie in [0, 1] (got {value})")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("fixed-point fractional bits must lie in 1..=15 (got {0})")]
    InvalidFixedPoint(u32),

    #[error("LoG kernel coefficient {value} at ({row}, {col}) must be finite and lie in [-1, 1]")]
    CoefficientOutOfRange { row: usize, col: usize, value: f32 },

    #[error("{0} must be > 0")]
    Zero(&'static str),
}

/// Stream contract violation. The frame is aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("end-of-frame flag on element {index}, expected only on element {expected}")]
    MisplacedEndOfFrame { index: usize, expected: usize },

    #[error("element {index} is the last of the frame but carries no end-of-frame flag")]
    MissingEndOfFrame { index: usize },

    #[error("stream closed after {received} of {expected} elements")]
    Truncated { received: usize, expected: usize },

    #[error("sub-stream {index} closed without a terminator")]
    UnterminatedSubStream { index: usize },

    #[error("box stream closed after {received} record(s) without a terminator")]
    MissingTerminator { received: usize },

    #[error("downstream consumer disconnected")]
    Disconnected,

    #[error("frame is {width}x{height}, pipeline is configured for {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },

    #[error("stage '{0}' panicked")]
    StagePanicked(String),
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("buffer holds {actual} bytes, a {width}x{height} RGBA frame needs {expected}")]
    FrameSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

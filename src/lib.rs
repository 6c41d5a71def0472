// nightblob: streaming multiscale blob detection for night-time headlights
//
// Every stage consumes and produces a raster stream one element at a time,
// with an in-band end-of-frame flag, so the same stage code runs threaded
// (one thread per stage, bounded channels) or sequentially over buffers.
//
//   RGBA ─▶ grayscale ─▶ pyramid ─▶ threshold ─▶ LoG 5×5 ─▶ boxes ─▶ merge

pub mod error;
pub mod stream;
pub mod image;
pub mod fixed;
pub mod window;
pub mod convolution;
pub mod convert;
pub mod threshold;
pub mod pyramid;
pub mod blob;
pub mod bbox;
pub mod merge;
pub mod config;
pub mod pipeline;

pub use bbox::{BoundingBox, TERMINATOR};
pub use config::DetectorConfig;
pub use error::{ConfigError, Error, Result, StreamError};
pub use image::{Image, Rgba};
pub use pipeline::{BlobDetector, RunSummary};
pub use stream::Sample;

// config.rs — Detector configuration.
//
// Everything here is fixed at setup. `validate` is the single gate between a
// (possibly hand-edited) config and the streaming stages: the stages assert
// their own preconditions, so nothing that reaches them unvalidated should be
// able to trip those asserts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::blob::{LogDetection, LOG_KERNEL_5X5, LOG_RESPONSE_THRESHOLD};
use crate::convolution::FixedKernel;
use crate::error::{ConfigError, Error};
use crate::fixed::{FixedFormat, Rounding};
use crate::pyramid::{plan_levels, ScaleLevel};
use crate::threshold::intensity_threshold;

/// Side of the square LoG kernel.
pub const LOG_KERNEL_SIZE: usize = 5;

/// Configuration for [`BlobDetector`](crate::pipeline::BlobDetector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Full-resolution frame width in pixels.
    pub width: usize,
    /// Full-resolution frame height in pixels.
    pub height: usize,
    /// Per-level downscale factor F. Level k is scaled by F^k.
    pub downscale_factor: usize,
    /// Number of pyramid levels, including full resolution.
    pub num_levels: usize,
    /// Mask threshold as a fraction of the maximum intensity (255).
    pub monochrome_threshold: f32,
    /// LoG coefficients, row-major.
    pub log_kernel: [[f32; LOG_KERNEL_SIZE]; LOG_KERNEL_SIZE],
    /// Fixed-point fractional bits for the LoG response.
    pub log_fractional_bits: u32,
    /// How LoG coefficients and the threshold are quantized.
    pub log_rounding: Rounding,
    /// Detection threshold on the LoG response, as a fraction of full scale.
    pub log_response_threshold: f32,
    /// Maximum boxes forwarded per frame; the rest are dropped.
    pub max_bboxes: usize,
    /// Depth of every bounded channel between stages.
    pub channel_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            downscale_factor: 2,
            num_levels: 5,
            monochrome_threshold: 0.85,
            log_kernel: LOG_KERNEL_5X5,
            log_fractional_bits: 7,
            log_rounding: Rounding::Truncate,
            log_response_threshold: LOG_RESPONSE_THRESHOLD,
            max_bboxes: 256,
            channel_capacity: 1024,
        }
    }
}

impl DetectorConfig {
    /// Default configuration for a `width × height` frame.
    pub fn for_frame(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Check every setup-time precondition and return the pyramid plan.
    pub fn validate(&self) -> Result<Vec<ScaleLevel>, ConfigError> {
        let levels = plan_levels(
            self.width,
            self.height,
            self.downscale_factor,
            self.num_levels,
            LOG_KERNEL_SIZE,
        )?;

        intensity_threshold(self.monochrome_threshold)?;
        if !(0.0..=1.0).contains(&self.log_response_threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                name: "log_response_threshold",
                value: self.log_response_threshold,
            });
        }
        for (row, coeffs) in self.log_kernel.iter().enumerate() {
            for (col, &value) in coeffs.iter().enumerate() {
                // One integer bit: wider values could overflow the i32 accumulator.
                if !(-1.0..=1.0).contains(&value) {
                    return Err(ConfigError::CoefficientOutOfRange { row, col, value });
                }
            }
        }
        self.fixed_format()?;
        if self.max_bboxes == 0 {
            return Err(ConfigError::Zero("max_bboxes"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel_capacity"));
        }
        Ok(levels)
    }

    pub fn fixed_format(&self) -> Result<FixedFormat, ConfigError> {
        FixedFormat::new(self.log_fractional_bits, self.log_rounding)
    }

    /// Integer mask threshold, e.g. 0.85 → 216.
    pub fn intensity_threshold(&self) -> Result<u8, ConfigError> {
        intensity_threshold(self.monochrome_threshold)
    }

    /// The quantized LoG window function.
    pub fn log_detection(&self) -> Result<LogDetection, ConfigError> {
        let kernel = FixedKernel::from_rows(&self.log_kernel, self.fixed_format()?);
        Ok(LogDetection::new(kernel, self.log_response_threshold))
    }
}

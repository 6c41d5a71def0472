// fixed.rs — Fixed-point quantization for filter coefficients and thresholds.
//
// Filter responses are computed in scaled integers: a real value v is stored
// as the integer raw = q(v · 2^frac_bits). With the reference precision of 7
// fractional bits, one unit is 1/128.
//
// Only *quantization* rounds. Accumulating quantized coefficients is exact
// i32 addition, so the rounding rule chosen here is the only thing that can
// move a response across the detection threshold.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a real value is mapped onto the fixed-point grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Floor toward negative infinity (two's-complement bit truncation).
    #[default]
    Truncate,
    /// Round to nearest, ties away from zero.
    Nearest,
}

/// A signed fixed-point format with `frac_bits` fractional bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFormat {
    frac_bits: u32,
    rounding: Rounding,
}

impl FixedFormat {
    /// Largest supported precision; keeps a 5×5 sum far from i32 overflow.
    pub const MAX_FRAC_BITS: u32 = 15;

    pub fn new(frac_bits: u32, rounding: Rounding) -> Result<Self, ConfigError> {
        if frac_bits == 0 || frac_bits > Self::MAX_FRAC_BITS {
            return Err(ConfigError::InvalidFixedPoint(frac_bits));
        }
        Ok(FixedFormat { frac_bits, rounding })
    }

    #[inline]
    pub fn frac_bits(&self) -> u32 {
        self.frac_bits
    }

    #[inline]
    pub fn rounding(&self) -> Rounding {
        self.rounding
    }

    /// Raw value of 1.0.
    #[inline]
    pub fn one(&self) -> i32 {
        1 << self.frac_bits
    }

    /// Quantize a real value to its raw representation.
    pub fn quantize(&self, value: f32) -> i32 {
        let scaled = f64::from(value) * f64::from(self.one());
        match self.rounding {
            Rounding::Truncate => scaled.floor() as i32,
            Rounding::Nearest => scaled.round() as i32,
        }
    }

    /// Convert a raw value back to a real number.
    pub fn to_f32(&self, raw: i32) -> f32 {
        raw as f32 / self.one() as f32
    }
}

impl Default for FixedFormat {
    /// 1 integer bit + 7 fractional bits, truncating.
    fn default() -> Self {
        FixedFormat {
            frac_bits: 7,
            rounding: Rounding::Truncate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_floors_negative_values() {
        let q = FixedFormat::default();
        assert_eq!(q.quantize(0.3182), 40); // 40.73
        assert_eq!(q.quantize(-0.0061), -1); // -0.78 floors to -1
        assert_eq!(q.quantize(-0.0499), -7); // -6.39 floors to -7
        assert_eq!(q.quantize(0.492), 62); // 62.98
    }

    #[test]
    fn test_nearest_rounding() {
        let q = FixedFormat::new(7, Rounding::Nearest).unwrap();
        assert_eq!(q.quantize(0.3182), 41);
        assert_eq!(q.quantize(-0.0061), -1);
        assert_eq!(q.quantize(-0.0499), -6);
        assert_eq!(q.quantize(0.492), 63);
    }

    #[test]
    fn test_exact_values_are_unchanged() {
        for rounding in [Rounding::Truncate, Rounding::Nearest] {
            let q = FixedFormat::new(4, rounding).unwrap();
            assert_eq!(q.quantize(0.5), 8);
            assert_eq!(q.quantize(-1.0), -16);
            assert!((q.to_f32(q.quantize(0.25)) - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_precision_bounds() {
        assert_eq!(FixedFormat::new(0, Rounding::Truncate), Err(ConfigError::InvalidFixedPoint(0)));
        assert_eq!(FixedFormat::new(16, Rounding::Truncate), Err(ConfigError::InvalidFixedPoint(16)));
        assert!(FixedFormat::new(15, Rounding::Truncate).is_ok());
    }
}

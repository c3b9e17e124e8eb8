//! Quantization error analysis
//!
//! Compares a tensor against its quantized image:
//! - MSE / MAE / max error
//! - Signal-to-quantization-noise ratio
//! - Outlier rate above an error threshold

use super::registry::AnyQuantizer;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// Error statistics for quantization analysis
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuantErrorStats {
    /// Mean Squared Error
    pub mse: f32,
    /// Mean Absolute Error
    pub mae: f32,
    /// Maximum absolute error
    pub max_error: f32,
    /// Signal-to-Quantization-Noise Ratio (SQNR) in dB
    pub sqnr_db: f32,
    /// Fraction of values with error > threshold
    pub outlier_rate: f32,
    /// Number of samples
    pub num_samples: usize,
}

impl QuantErrorStats {
    /// Root Mean Squared Error
    pub fn rmse(&self) -> f32 {
        self.mse.sqrt()
    }
}

/// Analyze the error between `original` and its quantized image
///
/// # Arguments
/// * `original` - Tensor before quantization
/// * `quantized` - Tensor after quantization, same shape
/// * `outlier_threshold` - Error threshold for outlier detection
pub fn analyze_error(
    original: &ArrayD<f32>,
    quantized: &ArrayD<f32>,
    outlier_threshold: f32,
) -> Result<QuantErrorStats> {
    if original.shape() != quantized.shape() {
        return Err(Error::ShapeMismatch {
            expected: original.shape().to_vec(),
            got: quantized.shape().to_vec(),
        });
    }
    if original.is_empty() {
        return Ok(QuantErrorStats::default());
    }

    let n = original.len() as f64;
    let mut sum_sq = 0.0f64;
    let mut sum_abs = 0.0f64;
    let mut signal = 0.0f64;
    let mut max_error = 0.0f32;
    let mut outliers = 0usize;

    Zip::from(original).and(quantized).for_each(|&o, &q| {
        let err = (o - q).abs();
        sum_sq += f64::from(err) * f64::from(err);
        sum_abs += f64::from(err);
        signal += f64::from(o) * f64::from(o);
        max_error = max_error.max(err);
        if err > outlier_threshold {
            outliers += 1;
        }
    });

    let mse = (sum_sq / n) as f32;
    // SQNR = 10 * log10(signal_power / noise_power)
    let sqnr_db = if mse > 1e-10 {
        (10.0 * ((signal / n) / (sum_sq / n)).log10()) as f32
    } else {
        f32::INFINITY
    };

    Ok(QuantErrorStats {
        mse,
        mae: (sum_abs / n) as f32,
        max_error,
        sqnr_db,
        outlier_rate: outliers as f32 / original.len() as f32,
        num_samples: original.len(),
    })
}

/// Quantize `x` with `quantizer` and analyze the result
pub fn quantizer_error(
    quantizer: &AnyQuantizer,
    x: &ArrayD<f32>,
    outlier_threshold: f32,
) -> Result<QuantErrorStats> {
    let quantized = quantizer.quantize_tensor(x)?;
    analyze_error(x, &quantized, outlier_threshold)
}

/// Calculate expected SQNR for uniform quantization
///
/// Theoretical SQNR for b-bit quantization: 6.02 * b + 1.76 dB
/// This assumes uniform distribution of input values
pub fn theoretical_sqnr(bits: u32) -> f32 {
    6.02 * bits as f32 + 1.76
}

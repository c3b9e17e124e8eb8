//! Block-scaled quantizer engine
//!
//! One engine serves every element format. A quantizer either recomputes its
//! scales on every call (dynamic) or derives them once from calibration
//! samples (static):
//!
//! ```text
//!                start_calibration()            end_calibration()
//! Uninitialized ------------------> Collecting -------------------> Calibrated
//!       ^  (pass-through)           (buffer, pass-through)          (quantize)
//!       |                                ^                              |
//!       +-- static_scale                 +------ start_calibration() ---+
//! ```
//!
//! Forward pass: `output = round_grid(input / scale) * scale`.

use super::format::QuantFormat;
use super::layout::Layout;
use super::scale;
use crate::error::{Error, Result};
use ndarray::{Array1, ArrayD, ArrayView3, IxDyn, Zip};
use std::fmt;
use tracing::{debug, warn};

/// Where the scale of a calibrated quantizer comes from
#[derive(Clone, Debug, PartialEq)]
pub enum ScaleMode {
    /// Recomputed from every input
    Dynamic,
    /// Persisted scale, broadcastable against inputs
    Static(ArrayD<f32>),
}

/// Calibration lifecycle state
#[derive(Clone, Debug, PartialEq)]
pub enum CalibrationState {
    /// Static scale configured but never calibrated; inputs pass through
    Uninitialized,
    /// Buffering samples; inputs pass through
    Collecting {
        samples: Vec<ArrayD<f32>>,
        /// Scale in force before this calibration started
        previous: Option<ArrayD<f32>>,
    },
    /// Scale available; inputs are quantized
    Calibrated(ScaleMode),
}

/// Block-scaled quantizer over an element format `F`
#[derive(Clone, Debug)]
pub struct Quantizer<F: QuantFormat> {
    format: F,
    state: CalibrationState,
}

impl<F: QuantFormat> Quantizer<F> {
    /// Create a quantizer
    ///
    /// Dynamic quantizers are usable immediately; static ones pass inputs
    /// through until calibrated.
    pub fn new(format: F) -> Self {
        let state = if format.static_scale() {
            CalibrationState::Uninitialized
        } else {
            CalibrationState::Calibrated(ScaleMode::Dynamic)
        };
        Self { format, state }
    }

    /// Element format
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Current lifecycle state
    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Whether a usable scale exists
    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    /// Whether samples are being buffered
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, CalibrationState::Collecting { .. })
    }

    /// Number of buffered calibration samples
    pub fn num_samples(&self) -> usize {
        match &self.state {
            CalibrationState::Collecting { samples, .. } => samples.len(),
            _ => 0,
        }
    }

    /// Persisted static scale, if calibrated with one
    pub fn static_scale(&self) -> Option<&ArrayD<f32>> {
        match &self.state {
            CalibrationState::Calibrated(ScaleMode::Static(scale)) => Some(scale),
            _ => None,
        }
    }

    /// Enter collecting mode with an empty sample buffer
    pub fn start_calibration(&mut self) {
        let previous = match std::mem::replace(&mut self.state, CalibrationState::Uninitialized) {
            CalibrationState::Calibrated(ScaleMode::Static(scale)) => Some(scale),
            CalibrationState::Collecting { previous, .. } => previous,
            _ => None,
        };
        debug!(format = %self.format, "starting calibration");
        self.state = CalibrationState::Collecting {
            samples: Vec::new(),
            previous,
        };
    }

    /// Finish calibration
    ///
    /// Computes the static scale from all buffered samples, clears the buffer,
    /// and enters the calibrated state. Without samples the previous static
    /// scale (or the unit scale) stays in force. Dynamic quantizers discard
    /// the samples. Calling this outside of collecting mode only marks the
    /// quantizer calibrated.
    pub fn end_calibration(&mut self) -> Result<()> {
        let (samples, previous) =
            match std::mem::replace(&mut self.state, CalibrationState::Uninitialized) {
                CalibrationState::Collecting { samples, previous } => (samples, previous),
                CalibrationState::Calibrated(ScaleMode::Static(scale)) => (Vec::new(), Some(scale)),
                _ => (Vec::new(), None),
            };

        if !self.format.static_scale() {
            debug!(num_samples = samples.len(), "dynamic scale, calibration samples discarded");
            self.state = CalibrationState::Calibrated(ScaleMode::Dynamic);
            return Ok(());
        }

        let scale = if samples.is_empty() {
            warn!(format = %self.format, "calibration ended without samples");
            previous.unwrap_or_else(unit_scale)
        } else {
            match self.post_calibration(&samples) {
                Ok(scale) => scale,
                Err(e) => {
                    self.state = match previous {
                        Some(scale) => CalibrationState::Calibrated(ScaleMode::Static(scale)),
                        None => CalibrationState::Uninitialized,
                    };
                    return Err(e);
                }
            }
        };

        debug!(
            num_samples = samples.len(),
            scale_shape = ?scale.shape(),
            "calibration complete"
        );
        self.state = CalibrationState::Calibrated(ScaleMode::Static(scale));
        Ok(())
    }

    /// Forward pass
    ///
    /// Buffers the input while collecting, quantizes once calibrated, and
    /// passes the input through otherwise.
    pub fn forward(&mut self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if let CalibrationState::Collecting { samples, .. } = &mut self.state {
            let layout = Layout::of(x.shape())?;
            layout.groups(self.format.group_size())?;
            samples.push(x.clone());
            return Ok(x.clone());
        }
        self.quantize_tensor(x)
    }

    /// One power-of-two scale per group of `[Batch, Groups, GroupSize]` samples
    pub fn compute_scale(&self, samples: ArrayView3<'_, f32>) -> Array1<f32> {
        scale::compute_scale(samples, self.format.max_pot())
    }

    /// Static scale from calibration samples, broadcastable to their layout
    pub fn post_calibration(&self, samples: &[ArrayD<f32>]) -> Result<ArrayD<f32>> {
        let (layout, full) = Layout::concat(samples)?;
        let grouped = layout.group_rows(&full, self.format.group_size())?;
        let scale = self.compute_scale(grouped.view());
        layout.broadcast_scale(&scale)
    }

    /// Per-call scale expanded to the shape of `x`
    pub fn dynamic_scale(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let layout = Layout::of(x.shape())?;
        let group_size = self.format.group_size();
        let blocks = layout.group_blocks(x, group_size)?;
        let scale = self.compute_scale(blocks.view());
        layout.expand_blocks(&scale, group_size)
    }

    /// Quantize and dequantize `x`
    ///
    /// Static quantizers that have not been calibrated return `x` unchanged;
    /// check [`Quantizer::is_calibrated`] when that matters.
    pub fn quantize_tensor(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        Layout::of(x.shape())?;
        match &self.state {
            CalibrationState::Calibrated(ScaleMode::Static(scale)) if self.format.static_scale() => {
                self.apply_scale(x, scale)
            }
            CalibrationState::Calibrated(_) => {
                let scale = self.dynamic_scale(x)?;
                self.apply_scale(x, &scale)
            }
            _ => Ok(x.clone()),
        }
    }

    fn apply_scale(&self, x: &ArrayD<f32>, scale: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        if scale.iter().any(|&s| s == 0.0) {
            return Err(Error::DegenerateScale);
        }
        let scale = scale
            .broadcast(x.raw_dim())
            .ok_or_else(|| Error::ShapeMismatch {
                expected: x.shape().to_vec(),
                got: scale.shape().to_vec(),
            })?;

        Ok(Zip::from(x)
            .and(scale)
            .map_collect(|&v, &s| self.format.round_grid(v / s) * s))
    }
}

impl<F: QuantFormat> fmt::Display for Quantizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format)
    }
}

fn unit_scale() -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(&[]), 1.0)
}

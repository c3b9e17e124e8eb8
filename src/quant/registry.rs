//! Quantizer registry
//!
//! Maps a [`QuantizerConfig`] (tagged `"IntQuantizer"`, `"MXINTQuantizer"` or
//! `"MXFPQuantizer"`) to a concrete quantizer behind one enum.

use super::config::QuantizerConfig;
use super::format::{IntFormat, MxFpFormat, MxIntFormat};
use super::quantizer::{CalibrationState, Quantizer};
use crate::error::Result;
use ndarray::ArrayD;
use std::fmt;

/// A quantizer of any registered format
#[derive(Clone, Debug)]
pub enum AnyQuantizer {
    Int(Quantizer<IntFormat>),
    MxInt(Quantizer<MxIntFormat>),
    MxFp(Quantizer<MxFpFormat>),
}

macro_rules! dispatch {
    ($self:expr, $q:ident => $body:expr) => {
        match $self {
            AnyQuantizer::Int($q) => $body,
            AnyQuantizer::MxInt($q) => $body,
            AnyQuantizer::MxFp($q) => $body,
        }
    };
}

impl AnyQuantizer {
    /// Build the quantizer a configuration describes
    pub fn from_config(config: &QuantizerConfig) -> Result<Self> {
        Ok(match config {
            QuantizerConfig::Int(c) => AnyQuantizer::Int(Quantizer::new(IntFormat::new(c.clone())?)),
            QuantizerConfig::MxInt(c) => {
                AnyQuantizer::MxInt(Quantizer::new(MxIntFormat::new(c.clone())?))
            }
            QuantizerConfig::MxFp(c) => {
                AnyQuantizer::MxFp(Quantizer::new(MxFpFormat::new(c.clone())?))
            }
        })
    }

    /// Parse a JSON configuration and build the quantizer
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_config(&QuantizerConfig::from_json(json)?)
    }

    /// Registered tag of this quantizer
    pub fn tag(&self) -> &'static str {
        match self {
            AnyQuantizer::Int(_) => "IntQuantizer",
            AnyQuantizer::MxInt(_) => "MXINTQuantizer",
            AnyQuantizer::MxFp(_) => "MXFPQuantizer",
        }
    }

    pub fn forward(&mut self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        dispatch!(self, q => q.forward(x))
    }

    pub fn quantize_tensor(&self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        dispatch!(self, q => q.quantize_tensor(x))
    }

    pub fn start_calibration(&mut self) {
        dispatch!(self, q => q.start_calibration())
    }

    pub fn end_calibration(&mut self) -> Result<()> {
        dispatch!(self, q => q.end_calibration())
    }

    pub fn is_calibrated(&self) -> bool {
        dispatch!(self, q => q.is_calibrated())
    }

    pub fn is_collecting(&self) -> bool {
        dispatch!(self, q => q.is_collecting())
    }

    pub fn state(&self) -> &CalibrationState {
        dispatch!(self, q => q.state())
    }

    pub fn static_scale(&self) -> Option<&ArrayD<f32>> {
        dispatch!(self, q => q.static_scale())
    }
}

/// Build the quantizer a configuration describes
pub fn build(config: &QuantizerConfig) -> Result<AnyQuantizer> {
    AnyQuantizer::from_config(config)
}

impl fmt::Display for AnyQuantizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, q => write!(f, "{}({})", self.tag(), q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ndarray::{Array, IxDyn};

    #[test]
    fn test_build_each_registered_tag() {
        let int = AnyQuantizer::from_json(r#"{"quant":"IntQuantizer","bit_w":8}"#).unwrap();
        assert_eq!(int.tag(), "IntQuantizer");
        assert!(!int.is_calibrated());

        let mxint =
            AnyQuantizer::from_json(r#"{"quant":"MXINTQuantizer","bit_w":4,"group_size":2}"#).unwrap();
        assert_eq!(mxint.tag(), "MXINTQuantizer");
        assert!(mxint.is_calibrated());

        let mxfp = AnyQuantizer::from_json(
            r#"{"quant":"MXFPQuantizer","exp_w":2,"man_w":1,"group_size":2}"#,
        )
        .unwrap();
        assert_eq!(mxfp.tag(), "MXFPQuantizer");
    }

    #[test]
    fn test_build_matches_config_tag() {
        let config = QuantizerConfig::from_json(r#"{"quant":"IntQuantizer","bit_w":4}"#).unwrap();
        let q = build(&config).unwrap();
        assert_eq!(q.tag(), config.tag());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = AnyQuantizer::from_json(r#"{"quant":"FP8Quantizer"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownQuantizer(_)));
    }

    #[test]
    fn test_invalid_width_rejected_at_construction() {
        let err = AnyQuantizer::from_json(r#"{"quant":"MXINTQuantizer","bit_w":1}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_dispatch_lifecycle() {
        let mut q = AnyQuantizer::from_json(
            r#"{"quant":"MXINTQuantizer","bit_w":4,"group_size":4,"static_scale":true}"#,
        )
        .unwrap();
        let x = Array::from_shape_vec(IxDyn(&[1, 4]), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();

        q.start_calibration();
        assert!(q.is_collecting());
        assert_eq!(q.forward(&x).unwrap(), x);
        q.end_calibration().unwrap();

        let y = q.forward(&x).unwrap();
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 3.5]);
        assert!(q.static_scale().is_some());
    }

    #[test]
    fn test_display() {
        let q = AnyQuantizer::from_json(r#"{"quant":"MXINTQuantizer","bit_w":4}"#).unwrap();
        assert_eq!(
            q.to_string(),
            "MXINTQuantizer(bit_w=4, group_size=32, signed=true, symmetric=true, static_scale=false)"
        );
    }
}

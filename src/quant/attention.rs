//! Attention quantization points
//!
//! An attention block is quantized at three places: keys (`k`), attention
//! scores (`s`) and values (`v`). Each point is optional; an absent quantizer
//! leaves the tensor untouched.

use super::config::QuantizerConfig;
use super::registry::AnyQuantizer;
use crate::error::Result;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quantizer configurations for the attention block
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionQuantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_quantizer: Option<QuantizerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_quantizer: Option<QuantizerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_quantizer: Option<QuantizerConfig>,
}

impl AttentionQuantSpec {
    /// Configured quantizers by name
    pub fn entries(&self) -> [(&'static str, Option<&QuantizerConfig>); 3] {
        [
            ("k_quantizer", self.k_quantizer.as_ref()),
            ("s_quantizer", self.s_quantizer.as_ref()),
            ("v_quantizer", self.v_quantizer.as_ref()),
        ]
    }

    /// Mutable slot for a quantizer name, `None` if the name is not known
    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Option<QuantizerConfig>> {
        match name {
            "k_quantizer" => Some(&mut self.k_quantizer),
            "s_quantizer" => Some(&mut self.s_quantizer),
            "v_quantizer" => Some(&mut self.v_quantizer),
            _ => None,
        }
    }
}

/// Built quantizers for the attention block
#[derive(Clone, Debug, Default)]
pub struct AttentionQuantizers {
    pub k: Option<AnyQuantizer>,
    pub s: Option<AnyQuantizer>,
    pub v: Option<AnyQuantizer>,
}

fn build(config: Option<&QuantizerConfig>) -> Result<Option<AnyQuantizer>> {
    config.map(AnyQuantizer::from_config).transpose()
}

fn apply(quantizer: Option<&mut AnyQuantizer>, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    match quantizer {
        Some(q) => q.forward(x),
        None => Ok(x.clone()),
    }
}

impl AttentionQuantizers {
    pub fn from_spec(spec: &AttentionQuantSpec) -> Result<Self> {
        let quantizers = Self {
            k: build(spec.k_quantizer.as_ref())?,
            s: build(spec.s_quantizer.as_ref())?,
            v: build(spec.v_quantizer.as_ref())?,
        };
        debug!(
            k = quantizers.k.is_some(),
            s = quantizers.s.is_some(),
            v = quantizers.v.is_some(),
            "built attention quantizers"
        );
        Ok(quantizers)
    }

    fn present_mut(&mut self) -> impl Iterator<Item = &mut AnyQuantizer> {
        [&mut self.k, &mut self.s, &mut self.v]
            .into_iter()
            .filter_map(Option::as_mut)
    }

    pub fn start_calibration(&mut self) {
        self.present_mut().for_each(AnyQuantizer::start_calibration);
    }

    /// End calibration on every present quantizer, stopping at the first error
    pub fn end_calibration(&mut self) -> Result<()> {
        self.present_mut().try_for_each(AnyQuantizer::end_calibration)
    }

    pub fn is_calibrated(&self) -> bool {
        [&self.k, &self.s, &self.v]
            .into_iter()
            .flatten()
            .all(AnyQuantizer::is_calibrated)
    }

    pub fn quantize_k(&mut self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        apply(self.k.as_mut(), x)
    }

    pub fn quantize_s(&mut self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        apply(self.s.as_mut(), x)
    }

    pub fn quantize_v(&mut self, x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        apply(self.v.as_mut(), x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn spec() -> AttentionQuantSpec {
        AttentionQuantSpec {
            k_quantizer: Some(
                QuantizerConfig::from_json(
                    r#"{"quant":"MXINTQuantizer","bit_w":4,"group_size":4,"static_scale":true}"#,
                )
                .unwrap(),
            ),
            s_quantizer: None,
            v_quantizer: Some(
                QuantizerConfig::from_json(
                    r#"{"quant":"MXFPQuantizer","exp_w":2,"man_w":1,"group_size":4}"#,
                )
                .unwrap(),
            ),
        }
    }

    fn heads() -> ArrayD<f32> {
        // [B=1, H=2, S=1, D=4]
        Array::from_shape_vec(
            IxDyn(&[1, 2, 1, 4]),
            vec![1.0, 2.0, 3.0, 4.0, 4.0, 0.2, -1.5, 3.0],
        )
        .unwrap()
    }

    #[test]
    fn test_absent_quantizer_is_identity() {
        let mut q = AttentionQuantizers::from_spec(&spec()).unwrap();
        let x = heads();
        assert_eq!(q.quantize_s(&x).unwrap(), x);
    }

    #[test]
    fn test_calibration_fans_out() {
        let mut q = AttentionQuantizers::from_spec(&spec()).unwrap();
        assert!(!q.is_calibrated());

        q.start_calibration();
        assert!(q.k.as_ref().unwrap().is_collecting());
        assert!(q.v.as_ref().unwrap().is_collecting());

        let x = heads();
        assert_eq!(q.quantize_k(&x).unwrap(), x);
        q.end_calibration().unwrap();
        assert!(q.is_calibrated());

        let k = q.quantize_k(&x).unwrap();
        assert_eq!(k.shape(), &[1, 2, 1, 4]);
        assert_eq!(k[[0, 0, 0, 3]], 3.5);
    }

    #[test]
    fn test_dynamic_value_quantizer() {
        let mut q = AttentionQuantizers::from_spec(&spec()).unwrap();
        let v = q.quantize_v(&heads()).unwrap();
        let second_head: Vec<f32> = v.iter().skip(4).copied().collect();
        assert_eq!(second_head, vec![4.0, 0.0, -1.5, 3.0]);
    }

    #[test]
    fn test_empty_spec() {
        let mut q = AttentionQuantizers::from_spec(&AttentionQuantSpec::default()).unwrap();
        q.start_calibration();
        q.end_calibration().unwrap();
        assert!(q.is_calibrated());
    }

    #[test]
    fn test_slot_lookup() {
        let mut spec = AttentionQuantSpec::default();
        assert!(spec.slot_mut("s_quantizer").is_some());
        assert!(spec.slot_mut("q_quantizer").is_none());
        assert!(spec.entries().iter().all(|(_, c)| c.is_none()));
    }
}

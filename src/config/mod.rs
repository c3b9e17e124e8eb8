//! Declarative YAML configuration
//!
//! Quantizers for an attention block are described in YAML, one optional
//! entry per quantization point.
//!
//! # Example
//!
//! ```yaml
//! k_quantizer:
//!   quant: MXINTQuantizer
//!   bit_w: 4
//!   group_size: 32
//!   static_scale: true
//!
//! s_quantizer:
//!   quant: IntQuantizer
//!   bit_w: 8
//!
//! v_quantizer:
//!   quant: MXFPQuantizer
//!   exp_w: 2
//!   man_w: 1
//! ```
//!
//! Individual entries can be replaced with `name={json}` overrides.

mod load;
mod overrides;
mod validate;


pub use load::{load_config, parse_config, quantizers_from_yaml};
pub use overrides::{apply_overrides, parse_override};
pub use validate::{validate_quantizer, validate_spec, ValidationError};

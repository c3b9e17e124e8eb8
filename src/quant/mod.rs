//! Block-scaled quantization
//!
//! Simulates shared-exponent number formats on f32 tensors:
//! - MXINT: integer elements sharing a power-of-two scale per group
//! - MXFP: minifloat elements sharing a power-of-two scale per group
//! - Plain integer quantization with a power-of-two scale
//!
//! Quantizers compute their scale either dynamically per input or once from
//! calibration samples (static scale).

mod attention;
mod config;
mod error_analysis;
mod format;
mod layout;
mod quantizer;
mod registry;
pub mod rounding;
pub mod scale;

pub use attention::{AttentionQuantSpec, AttentionQuantizers};
pub use config::{
    GroupSize, IntConfig, MxFpConfig, MxIntConfig, QuantizerConfig, REGISTERED_QUANTIZERS,
};
pub use error_analysis::{analyze_error, quantizer_error, theoretical_sqnr, QuantErrorStats};
pub use format::{
    IntFormat, MxFpFormat, MxIntFormat, QuantFormat, MAX_BIT_W, MAX_EXP_W, MAX_MAN_W, MIN_BIT_W,
    MIN_EXP_W,
};
pub use layout::Layout;
pub use quantizer::{CalibrationState, Quantizer, ScaleMode};
pub use registry::{build, AnyQuantizer};
pub use rounding::{to_int, to_minifloat, IntGrid, MinifloatGrid};
pub use scale::{compute_scale, floor_log2, scale_exponent};

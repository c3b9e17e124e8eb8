//! # mxsim: Block-Scaled Quantization Simulator
//!
//! mxsim simulates shared-exponent number formats (MXINT, MXFP) and plain
//! power-of-two integer quantization on f32 tensors, so the numeric effect of
//! low-precision activations and weights can be studied in full precision.
//!
//! ## Architecture
//!
//! - **quant**: Scale computation, rounding grids, group layout, quantizers
//!   and their calibration lifecycle
//! - **config**: Declarative YAML configuration for attention quantizers
//! - **error**: Crate error type

pub mod config;
pub mod quant;

pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};
pub use quant::{AnyQuantizer, AttentionQuantizers, Quantizer, QuantizerConfig};

//! Quantizer configurations
//!
//! Configurations are plain serde structs tagged by the `"quant"` field, e.g.
//!
//! ```json
//! {"quant": "MXINTQuantizer", "bit_w": 4, "group_size": 32}
//! {"quant": "MXFPQuantizer", "exp_w": 2, "man_w": 1, "group_size": 32}
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tags accepted in the `"quant"` field
pub const REGISTERED_QUANTIZERS: [&str; 3] = ["IntQuantizer", "MXINTQuantizer", "MXFPQuantizer"];

/// Number of elements that share one scale
///
/// Serialized as an integer; `-1` means one group spans the whole tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum GroupSize {
    /// A single group covering the whole feature axis (and batch)
    Whole,
    /// Contiguous groups of `n` features
    Size(usize),
}

impl TryFrom<i64> for GroupSize {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(GroupSize::Whole),
            n if n > 0 => Ok(GroupSize::Size(n as usize)),
            n => Err(format!("group_size must be positive or -1, got {n}")),
        }
    }
}

impl From<GroupSize> for i64 {
    fn from(value: GroupSize) -> Self {
        match value {
            GroupSize::Whole => -1,
            GroupSize::Size(n) => n as i64,
        }
    }
}

impl fmt::Display for GroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i64::from(*self))
    }
}

fn default_true() -> bool {
    true
}

fn default_int_bits() -> u32 {
    8
}

fn default_mx_bits() -> u32 {
    2
}

fn default_whole() -> GroupSize {
    GroupSize::Whole
}

fn default_block() -> GroupSize {
    GroupSize::Size(32)
}

fn default_exp_w() -> u32 {
    2
}

fn default_man_w() -> u32 {
    1
}

/// Plain integer quantizer with a power-of-two scale
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntConfig {
    /// Element bit width
    #[serde(default = "default_int_bits")]
    pub bit_w: u32,
    /// Elements per scale group
    #[serde(default = "default_whole")]
    pub group_size: GroupSize,
    /// Calibrate once instead of recomputing every call
    #[serde(default = "default_true")]
    pub static_scale: bool,
    /// Drop the most negative code so the range is symmetric
    #[serde(default)]
    pub symmetric: bool,
    /// Two's-complement elements
    #[serde(default = "default_true")]
    pub signed: bool,
}

impl Default for IntConfig {
    fn default() -> Self {
        Self {
            bit_w: default_int_bits(),
            group_size: GroupSize::Whole,
            static_scale: true,
            symmetric: false,
            signed: true,
        }
    }
}

/// Shared-exponent integer (MXINT) quantizer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MxIntConfig {
    /// Element bit width
    #[serde(default = "default_mx_bits")]
    pub bit_w: u32,
    /// Elements per shared exponent
    #[serde(default = "default_block")]
    pub group_size: GroupSize,
    /// Calibrate once instead of recomputing every call
    #[serde(default)]
    pub static_scale: bool,
    /// Drop the most negative code so the range is symmetric
    #[serde(default = "default_true")]
    pub symmetric: bool,
    /// Two's-complement elements
    #[serde(default = "default_true")]
    pub signed: bool,
}

impl Default for MxIntConfig {
    fn default() -> Self {
        Self {
            bit_w: default_mx_bits(),
            group_size: default_block(),
            static_scale: false,
            symmetric: true,
            signed: true,
        }
    }
}

/// Shared-exponent minifloat (MXFP) quantizer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MxFpConfig {
    /// Element exponent width
    #[serde(default = "default_exp_w")]
    pub exp_w: u32,
    /// Element mantissa width
    #[serde(default = "default_man_w")]
    pub man_w: u32,
    /// Elements per shared exponent
    #[serde(default = "default_block")]
    pub group_size: GroupSize,
    /// Calibrate once instead of recomputing every call
    #[serde(default)]
    pub static_scale: bool,
    /// Whether negative elements are representable
    #[serde(default = "default_true")]
    pub signed: bool,
}

impl MxFpConfig {
    /// Exponent bias `2^(E-1) - 1`
    pub fn exp_bias(&self) -> i32 {
        super::rounding::exponent_bias(self.exp_w)
    }
}

impl Default for MxFpConfig {
    fn default() -> Self {
        Self {
            exp_w: default_exp_w(),
            man_w: default_man_w(),
            group_size: default_block(),
            static_scale: false,
            signed: true,
        }
    }
}

/// Any quantizer configuration, tagged by `"quant"`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "quant")]
pub enum QuantizerConfig {
    #[serde(rename = "IntQuantizer")]
    Int(IntConfig),
    #[serde(rename = "MXINTQuantizer")]
    MxInt(MxIntConfig),
    #[serde(rename = "MXFPQuantizer")]
    MxFp(MxFpConfig),
}

impl QuantizerConfig {
    /// Parse a JSON quantizer configuration
    ///
    /// The `"quant"` tag is looked up first so an unregistered tag is reported
    /// as [`Error::UnknownQuantizer`] rather than a generic parse failure.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("invalid quantizer JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Build from an already parsed JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let tag = value
            .get("quant")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::ConfigError("quantizer config is missing \"quant\"".to_string()))?;
        if !REGISTERED_QUANTIZERS.contains(&tag) {
            return Err(Error::UnknownQuantizer(tag.to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| Error::ConfigError(format!("invalid quantizer config: {e}")))
    }

    /// The registered tag of this configuration
    pub fn tag(&self) -> &'static str {
        match self {
            QuantizerConfig::Int(_) => "IntQuantizer",
            QuantizerConfig::MxInt(_) => "MXINTQuantizer",
            QuantizerConfig::MxFp(_) => "MXFPQuantizer",
        }
    }

    /// Elements per scale group
    pub fn group_size(&self) -> GroupSize {
        match self {
            QuantizerConfig::Int(c) => c.group_size,
            QuantizerConfig::MxInt(c) => c.group_size,
            QuantizerConfig::MxFp(c) => c.group_size,
        }
    }

    /// Whether the scale is calibrated once
    pub fn static_scale(&self) -> bool {
        match self {
            QuantizerConfig::Int(c) => c.static_scale,
            QuantizerConfig::MxInt(c) => c.static_scale,
            QuantizerConfig::MxFp(c) => c.static_scale,
        }
    }

    /// Element bits, including the exponent bits of minifloats and the sign
    pub fn element_bits(&self) -> u32 {
        match self {
            QuantizerConfig::Int(c) => c.bit_w,
            QuantizerConfig::MxInt(c) => c.bit_w,
            QuantizerConfig::MxFp(c) => c.exp_w + c.man_w + u32::from(c.signed),
        }
    }
}

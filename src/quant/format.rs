//! Element format policies
//!
//! The quantizer engine is shared by every format; a format only decides how
//! large a power of two its elements can hold (`max_pot`) and how a descaled
//! value is rounded onto its grid.

use super::config::{GroupSize, IntConfig, MxFpConfig, MxIntConfig};
use super::rounding::{IntGrid, MinifloatGrid};
use crate::error::{Error, Result};
use std::fmt;

/// Element format of a block-scaled quantizer
pub trait QuantFormat: Clone + fmt::Debug + fmt::Display + Send + Sync {
    /// log2 of the largest power of two the element grid represents
    fn max_pot(&self) -> i32;

    /// Round a descaled value onto the element grid
    fn round_grid(&self, x: f32) -> f32;

    /// Elements per scale group
    fn group_size(&self) -> GroupSize;

    /// Whether the scale is calibrated once
    fn static_scale(&self) -> bool;
}

/// Narrowest integer element
pub const MIN_BIT_W: u32 = 2;
/// Widest integer element; every code up to `2^24` is exact in f32
pub const MAX_BIT_W: u32 = 24;
/// Narrowest minifloat exponent
pub const MIN_EXP_W: u32 = 1;
/// Widest minifloat exponent, that of f32
pub const MAX_EXP_W: u32 = 8;
/// Widest minifloat mantissa, that of f32
pub const MAX_MAN_W: u32 = 23;

fn check_bits(bit_w: u32) -> Result<()> {
    if !(MIN_BIT_W..=MAX_BIT_W).contains(&bit_w) {
        return Err(Error::InvalidParameter(format!(
            "bit_w must be in {MIN_BIT_W}..={MAX_BIT_W}, got {bit_w}"
        )));
    }
    Ok(())
}

/// Plain integer elements
#[derive(Clone, Debug)]
pub struct IntFormat {
    config: IntConfig,
    grid: IntGrid,
}

impl IntFormat {
    pub fn new(config: IntConfig) -> Result<Self> {
        check_bits(config.bit_w)?;
        let grid = IntGrid::new(config.bit_w, config.signed, config.symmetric);
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &IntConfig {
        &self.config
    }
}

impl QuantFormat for IntFormat {
    fn max_pot(&self) -> i32 {
        if self.config.signed {
            self.config.bit_w as i32 - 1
        } else {
            self.config.bit_w as i32
        }
    }

    fn round_grid(&self, x: f32) -> f32 {
        self.grid.round(x)
    }

    fn group_size(&self) -> GroupSize {
        self.config.group_size
    }

    fn static_scale(&self) -> bool {
        self.config.static_scale
    }
}

impl fmt::Display for IntFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bit_w={}, group_size={}, symmetric={}, signed={}, static_scale={}",
            self.config.bit_w,
            self.config.group_size,
            self.config.symmetric,
            self.config.signed,
            self.config.static_scale
        )
    }
}

/// Shared-exponent integer elements (MXINT)
#[derive(Clone, Debug)]
pub struct MxIntFormat {
    config: MxIntConfig,
    grid: IntGrid,
}

impl MxIntFormat {
    pub fn new(config: MxIntConfig) -> Result<Self> {
        check_bits(config.bit_w)?;
        let grid = IntGrid::new(config.bit_w, config.signed, config.symmetric);
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &MxIntConfig {
        &self.config
    }

    /// Signed symmetric 2-bit elements: `{-1, 0, 1}`
    pub fn is_ternary(&self) -> bool {
        self.config.bit_w == 2 && self.config.signed && self.config.symmetric
    }
}

impl QuantFormat for MxIntFormat {
    fn max_pot(&self) -> i32 {
        if self.is_ternary() {
            return 1;
        }
        if self.config.signed {
            self.config.bit_w as i32 - 1
        } else {
            self.config.bit_w as i32
        }
    }

    fn round_grid(&self, x: f32) -> f32 {
        self.grid.round(x)
    }

    fn group_size(&self) -> GroupSize {
        self.config.group_size
    }

    fn static_scale(&self) -> bool {
        self.config.static_scale
    }
}

impl fmt::Display for MxIntFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bit_w={}, group_size={}, signed={}, symmetric={}, static_scale={}",
            self.config.bit_w,
            self.config.group_size,
            self.config.signed,
            self.config.symmetric,
            self.config.static_scale
        )
    }
}

/// Shared-exponent minifloat elements (MXFP)
#[derive(Clone, Debug)]
pub struct MxFpFormat {
    config: MxFpConfig,
    grid: MinifloatGrid,
}

impl MxFpFormat {
    pub fn new(config: MxFpConfig) -> Result<Self> {
        if !(MIN_EXP_W..=MAX_EXP_W).contains(&config.exp_w) {
            return Err(Error::InvalidParameter(format!(
                "exp_w must be in {MIN_EXP_W}..={MAX_EXP_W}, got {}",
                config.exp_w
            )));
        }
        if config.man_w > MAX_MAN_W {
            return Err(Error::InvalidParameter(format!(
                "man_w must be at most {MAX_MAN_W}, got {}",
                config.man_w
            )));
        }
        let grid = MinifloatGrid::new(config.exp_w, config.man_w, config.signed);
        Ok(Self { config, grid })
    }

    pub fn config(&self) -> &MxFpConfig {
        &self.config
    }

    /// Element grid limits
    pub fn grid(&self) -> &MinifloatGrid {
        &self.grid
    }
}

impl QuantFormat for MxFpFormat {
    fn max_pot(&self) -> i32 {
        1 << (self.config.exp_w - 1)
    }

    fn round_grid(&self, x: f32) -> f32 {
        self.grid.round(x)
    }

    fn group_size(&self) -> GroupSize {
        self.config.group_size
    }

    fn static_scale(&self) -> bool {
        self.config.static_scale
    }
}

impl fmt::Display for MxFpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exp_w={}, man_w={}, group_size={}, signed={}, static_scale={}",
            self.config.exp_w,
            self.config.man_w,
            self.config.group_size,
            self.config.signed,
            self.config.static_scale
        )
    }
}

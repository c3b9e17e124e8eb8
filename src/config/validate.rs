//! Configuration validation

use crate::quant::{
    AttentionQuantSpec, QuantizerConfig, MAX_BIT_W, MAX_EXP_W, MAX_MAN_W, MIN_BIT_W, MIN_EXP_W,
};

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid bit width: {0} (must be in {min}..={max})", min = MIN_BIT_W, max = MAX_BIT_W)]
    InvalidBitWidth(u32),

    #[error("Invalid exponent width: {0} (must be in {min}..={max})", min = MIN_EXP_W, max = MAX_EXP_W)]
    InvalidExponentWidth(u32),

    #[error("Invalid mantissa width: {0} (must be at most {max})", max = MAX_MAN_W)]
    InvalidMantissaWidth(u32),

    #[error("{name}: {source}")]
    Quantizer {
        name: &'static str,
        #[source]
        source: Box<ValidationError>,
    },
}

fn check_bit_width(bit_w: u32) -> Result<(), ValidationError> {
    if !(MIN_BIT_W..=MAX_BIT_W).contains(&bit_w) {
        return Err(ValidationError::InvalidBitWidth(bit_w));
    }
    Ok(())
}

/// Validate a single quantizer configuration
///
/// Group sizes need no check here: `GroupSize` rejects zero when parsed.
pub fn validate_quantizer(config: &QuantizerConfig) -> Result<(), ValidationError> {
    match config {
        QuantizerConfig::Int(c) => check_bit_width(c.bit_w),
        QuantizerConfig::MxInt(c) => check_bit_width(c.bit_w),
        QuantizerConfig::MxFp(c) => {
            if !(MIN_EXP_W..=MAX_EXP_W).contains(&c.exp_w) {
                return Err(ValidationError::InvalidExponentWidth(c.exp_w));
            }
            if c.man_w > MAX_MAN_W {
                return Err(ValidationError::InvalidMantissaWidth(c.man_w));
            }
            Ok(())
        }
    }
}

/// Validate every configured quantizer of an attention block
pub fn validate_spec(spec: &AttentionQuantSpec) -> Result<(), ValidationError> {
    for (name, config) in spec.entries() {
        if let Some(config) = config {
            validate_quantizer(config).map_err(|e| ValidationError::Quantizer {
                name,
                source: Box::new(e),
            })?;
        }
    }
    Ok(())
}

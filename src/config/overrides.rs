//! `name={json}` overrides on top of a loaded spec

use crate::error::{Error, Result};
use crate::quant::{AttentionQuantSpec, QuantizerConfig};

/// Split `name={json}` into the quantizer name and its configuration
///
/// A value of `null` removes the quantizer.
pub fn parse_override(text: &str) -> Result<(String, Option<QuantizerConfig>)> {
    let (name, json) = text
        .split_once('=')
        .ok_or_else(|| Error::ConfigError(format!("Override must be name={{json}}: {}", text)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::ConfigError(format!("Override has no name: {}", text)));
    }

    let value: serde_json::Value = serde_json::from_str(json.trim())
        .map_err(|e| Error::ConfigError(format!("Invalid JSON in override {}: {}", name, e)))?;
    let config = match value {
        serde_json::Value::Null => None,
        value => Some(QuantizerConfig::from_value(value)?),
    };
    Ok((name.to_string(), config))
}

/// Apply overrides in order; later overrides of the same name win
pub fn apply_overrides<S: AsRef<str>>(spec: &mut AttentionQuantSpec, overrides: &[S]) -> Result<()> {
    for text in overrides {
        let (name, config) = parse_override(text.as_ref())?;
        let slot = spec
            .slot_mut(&name)
            .ok_or_else(|| Error::ConfigError(format!("Unknown quantization point: {}", name)))?;
        *slot = config;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::GroupSize;

    #[test]
    fn test_parse_override() {
        let (name, config) =
            parse_override(r#"k_quantizer={"quant":"MXINTQuantizer","bit_w":4,"group_size":16}"#)
                .unwrap();
        assert_eq!(name, "k_quantizer");
        let config = config.unwrap();
        assert_eq!(config.tag(), "MXINTQuantizer");
        assert_eq!(config.group_size(), GroupSize::Size(16));
    }

    #[test]
    fn test_override_null_clears() {
        let (_, config) = parse_override("v_quantizer=null").unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_override_missing_equals() {
        assert!(matches!(
            parse_override("k_quantizer"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_override_unknown_tag() {
        assert!(matches!(
            parse_override(r#"k_quantizer={"quant":"BlockFPQuantizer"}"#),
            Err(Error::UnknownQuantizer(_))
        ));
    }

    #[test]
    fn test_apply_overrides_last_wins() {
        let mut spec = AttentionQuantSpec::default();
        apply_overrides(
            &mut spec,
            &[
                r#"s_quantizer={"quant":"IntQuantizer","bit_w":8}"#,
                r#"s_quantizer={"quant":"IntQuantizer","bit_w":6}"#,
            ],
        )
        .unwrap();
        assert_eq!(spec.s_quantizer.unwrap().element_bits(), 6);
    }

    #[test]
    fn test_apply_overrides_unknown_point() {
        let mut spec = AttentionQuantSpec::default();
        let err = apply_overrides(&mut spec, &[r#"q_quantizer={"quant":"IntQuantizer"}"#]);
        assert!(matches!(err, Err(Error::ConfigError(_))));
    }
}

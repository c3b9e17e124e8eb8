//! Attention quantizers from YAML configuration

use super::validate::validate_spec;
use crate::error::{Error, Result};
use crate::quant::{AttentionQuantSpec, AttentionQuantizers, QuantizerConfig};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse an attention quantization spec from YAML text
///
/// Each entry is read through [`QuantizerConfig::from_value`] so an
/// unregistered `quant` tag surfaces as [`Error::UnknownQuantizer`].
pub fn parse_config(yaml: &str) -> Result<AttentionQuantSpec> {
    if yaml.trim().is_empty() {
        return Ok(AttentionQuantSpec::default());
    }
    let value: serde_json::Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

    let mut spec = AttentionQuantSpec::default();
    let entries = match value {
        serde_json::Value::Null => return Ok(spec),
        serde_json::Value::Object(entries) => entries,
        other => {
            return Err(Error::ConfigError(format!(
                "Expected a mapping of quantizers, got {}",
                other
            )))
        }
    };

    for (name, entry) in entries {
        let slot = spec
            .slot_mut(&name)
            .ok_or_else(|| Error::ConfigError(format!("Unknown quantization point: {}", name)))?;
        *slot = match entry {
            serde_json::Value::Null => None,
            entry => Some(QuantizerConfig::from_value(entry)?),
        };
    }
    Ok(spec)
}

/// Load and validate an attention quantization spec from a YAML file
///
/// # Example
///
/// ```yaml
/// k_quantizer:
///   quant: MXINTQuantizer
///   bit_w: 4
///   group_size: 32
/// v_quantizer:
///   quant: MXFPQuantizer
///   exp_w: 2
///   man_w: 1
/// ```
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<AttentionQuantSpec> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    let spec = parse_config(&yaml_content)?;
    validate_spec(&spec).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    debug!(path = %config_path.as_ref().display(), "loaded quantization config");
    Ok(spec)
}

/// Load a YAML config and build its quantizers
pub fn quantizers_from_yaml<P: AsRef<Path>>(config_path: P) -> Result<AttentionQuantizers> {
    AttentionQuantizers::from_spec(&load_config(config_path)?)
}

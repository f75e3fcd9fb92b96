//! Configuration loading and parsing

use anyhow::{Context, Result};
use dbc_codec::{DbcFlavor, DecoderConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Decode session configuration (loaded from decode.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecodeConfig {
    /// Signal naming convention of the DBC; guessed from the file name if absent
    #[serde(default)]
    pub flavor: Option<DbcFlavor>,
    pub decoder: DecoderConfig,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<DecodeConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: DecodeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.decoder.signals.is_empty() && config.decoder.checks.is_empty() {
        log::warn!("Config {:?} monitors no signals and no messages", path);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            flavor = "honda"

            [decoder]
            bus = 1
            staleness_multiplier = 1.5

            [[decoder.signals]]
            name = "STEER_TORQUE"
            message = "STEERING_CONTROL"

            [[decoder.checks]]
            message = "STEERING_CONTROL"
            frequency = 100.0
        "#;

        let config: DecodeConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.flavor, Some(DbcFlavor::Honda));
        assert_eq!(config.decoder.bus, 1);
        assert_eq!(config.decoder.staleness_multiplier, 1.5);
        assert_eq!(config.decoder.signals.len(), 1);
        assert_eq!(config.decoder.checks[0].frequency, 100.0);
        assert!(config.decoder.verify_checksums);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[decoder]").unwrap();
        writeln!(file, "history_capacity = 8").unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.flavor, None);
        assert_eq!(config.decoder.history_capacity, 8);
    }

    #[test]
    fn test_load_config_errors_carry_path() {
        let err = load_config(Path::new("missing/decode.toml")).unwrap_err();
        assert!(err.to_string().contains("decode.toml"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "decoder = 3").unwrap();
        file.flush().unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}

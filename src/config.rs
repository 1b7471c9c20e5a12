//! Configuration
//!
//! JSON configuration for mask creation. Every field has a default, so an
//! empty object `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "fraction_threshold": 0.8,
//!   "preset_range_mode": "exclusive",
//!   "region_catalog_name": "AR6",
//!   "custom_masks": [
//!     {"name": "pacific", "dim": "lon", "selection": {"range": [120, 280]}}
//!   ],
//!   "logging": {"mode": "standalone", "package_level": "debug", "root_level": "warn"},
//!   "output": {"overwrite": "never"}
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging::LogConfig;
use crate::masking::{RangeMode, DEFAULT_FRACTION_THRESHOLD};
use crate::utils::OverwritePolicy;

/// User-defined coordinate mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMaskConfig {
    pub name: String,
    pub dim: String,
    /// Numeric array of explicit labels, or `{"range": [min, max]}`
    pub selection: Value,
    /// Range mode name; unknown names are rejected when the mask is registered
    #[serde(default)]
    pub range_mode: Option<String>,
    /// Valid domain; defaults to [-90, 90] for `lat` and [0, 360] for `lon`
    #[serde(default)]
    pub valid_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Threshold for `land` / `ocean` (cells strictly above are selected)
    pub fraction_threshold: f64,
    /// Range mode used by the latitude band presets
    pub preset_range_mode: RangeMode,
    /// Name used in region mask names (`<catalog>_<abbrev>_mask`)
    pub region_catalog_name: String,
    pub custom_masks: Vec<CustomMaskConfig>,
    pub logging: LogConfig,
    pub output: OutputConfig,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            fraction_threshold: DEFAULT_FRACTION_THRESHOLD,
            preset_range_mode: RangeMode::Exclusive,
            region_catalog_name: "AR6".to_string(),
            custom_masks: Vec::new(),
            logging: LogConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl MaskConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: MaskConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need a region catalog
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fraction_threshold) {
            anyhow::bail!(
                "fraction_threshold must be within [0, 1], got {}",
                self.fraction_threshold
            );
        }

        let mut seen = std::collections::BTreeSet::new();
        for custom in &self.custom_masks {
            if !seen.insert(custom.name.as_str()) {
                anyhow::bail!("custom mask '{}' is defined more than once", custom.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogMode;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: MaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MaskConfig::default());
        assert_eq!(config.fraction_threshold, 0.8);
        assert_eq!(config.region_catalog_name, "AR6");
        assert_eq!(config.output.overwrite, OverwritePolicy::Never);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "fraction_threshold": 0.5,
                "preset_range_mode": "inclusive",
                "custom_masks": [
                    {{"name": "pacific", "dim": "lon", "selection": {{"range": [120, 280]}}}}
                ],
                "logging": {{"mode": "standalone", "package_level": "debug"}},
                "output": {{"overwrite": "always"}}
            }}"#
        )
        .unwrap();

        let config = MaskConfig::load(file.path()).unwrap();
        assert_eq!(config.fraction_threshold, 0.5);
        assert_eq!(config.preset_range_mode, RangeMode::Inclusive);
        assert_eq!(config.custom_masks.len(), 1);
        assert_eq!(config.custom_masks[0].range_mode, None);
        assert_eq!(config.logging.mode, LogMode::Standalone);
        assert_eq!(config.output.overwrite, OverwritePolicy::Always);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fraction_threshold": 80}}"#).unwrap();
        let err = MaskConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("fraction_threshold"));
    }

    #[test]
    fn test_missing_file() {
        let err = MaskConfig::load(Path::new("/nonexistent/masks.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/rsjobs/rsjobs.toml`
//! 3. Explicit config file (`--conf`)
//! 4. Environment variables: `RSJOBS_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;

/// Expansion behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExpanderConfig {
    /// Substitute empty text for undefined fields without a default
    pub allow_empty_variables: bool,
    /// Warn instead of failing when item names repeat
    pub allow_duplicates: bool,
}

/// Raw expander config for intermediate parsing.
///
/// `None` means "not specified here, inherit from the layer below".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawExpanderConfig {
    pub allow_empty_variables: Option<bool>,
    pub allow_duplicates: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RawSettings {
    pub expander: RawExpanderConfig,
}

impl ExpanderConfig {
    /// Overlay wins where it specifies a value.
    pub fn merge(&self, overlay: &RawExpanderConfig) -> Self {
        Self {
            allow_empty_variables: overlay
                .allow_empty_variables
                .unwrap_or(self.allow_empty_variables),
            allow_duplicates: overlay.allow_duplicates.unwrap_or(self.allow_duplicates),
        }
    }
}

/// Unified configuration for rsjobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Expansion settings
    pub expander: ExpanderConfig,
}

/// Get the XDG config directory for rsjobs.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rsjobs").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("rsjobs.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            expander: self.expander.merge(&overlay.expander),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `conf` - Optional explicit config file; it must exist
    pub fn load(conf: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        if let Some(path) = conf {
            current = current.merge_with(&load_raw_settings(path)?);
        }

        Self::apply_env_overrides(current)
    }

    /// Load from one file on top of the defaults, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self, ApplicationError> {
        Ok(Self::default().merge_with(&load_raw_settings(path)?))
    }

    /// Apply RSJOBS_* environment variables as explicit overrides,
    /// e.g. `RSJOBS_EXPANDER__ALLOW_DUPLICATES=true`.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("RSJOBS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_bool("expander.allow_empty_variables") {
            settings.expander.allow_empty_variables = val;
        }
        if let Ok(val) = config.get_bool("expander.allow_duplicates") {
            settings.expander.allow_duplicates = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# rsjobs configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/rsjobs/rsjobs.toml
#   File:   --conf <FILE>
#   Env:    RSJOBS_* environment variables (e.g. RSJOBS_EXPANDER__ALLOW_DUPLICATES=true)

[expander]
# Substitute empty text for undefined fields that have no default
# allow_empty_variables = false

# Warn instead of failing when two items share a name (last one wins)
# allow_duplicates = false
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_overlay_with_one_field_when_merging_then_other_field_is_kept() {
        let base = ExpanderConfig {
            allow_empty_variables: true,
            allow_duplicates: false,
        };
        let overlay = RawExpanderConfig {
            allow_empty_variables: None,
            allow_duplicates: Some(true),
        };

        let result = base.merge(&overlay);

        assert!(result.allow_empty_variables);
        assert!(result.allow_duplicates);
    }

    #[test]
    fn given_empty_overlay_when_merging_then_base_is_unchanged() {
        let base = ExpanderConfig {
            allow_empty_variables: true,
            allow_duplicates: true,
        };

        let result = base.merge(&RawExpanderConfig::default());

        assert_eq!(result, base);
    }

    #[test]
    fn given_template_when_parsing_then_yields_defaults() {
        let raw: RawSettings = toml::from_str(&Settings::template()).expect("parse template");

        assert_eq!(Settings::default().merge_with(&raw), Settings::default());
    }
}

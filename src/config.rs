//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/rollup/rollup.toml`
//! 3. Explicit config file passed to [`Settings::load`]
//! 4. Environment variables: `ROLLUP_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{RollupError, RollupResult};

/// Label given to the synthetic bucket holding items whose key is null.
pub const DEFAULT_UNKNOWN_LABEL: &str = "Unknown";

/// Behaviour knobs for grouping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Name of the child collecting null-keyed items
    pub unknown_label: String,
    /// Navigating or computing on a null intermediate yields null instead of an error
    pub propagate_null: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            unknown_label: DEFAULT_UNKNOWN_LABEL.to_string(),
            propagate_null: true,
        }
    }
}

/// Get the XDG config directory for rollup.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rollup").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("rollup.toml"))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional explicit TOML file; it must exist when given
    ///
    /// Later layers replace individual keys of earlier ones.
    #[instrument(level = "debug")]
    pub fn load(config_file: Option<&Path>) -> RollupResult<Self> {
        let mut builder = Self::defaults_builder()?;

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                debug!(path = %global_path.display(), "loading global config");
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(path) = config_file {
            debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ROLLUP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;
        let settings: Self = config.try_deserialize().map_err(config_err)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load only compiled defaults plus the given file, ignoring global config and env vars.
    pub fn from_file(path: &Path) -> RollupResult<Self> {
        let config = Self::defaults_builder()?
            .add_source(File::from(path).required(true))
            .build()
            .map_err(config_err)?;
        let settings: Self = config.try_deserialize().map_err(config_err)?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults_builder() -> RollupResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Settings::default();
        Config::builder()
            .set_default("unknown_label", defaults.unknown_label)
            .map_err(config_err)?
            .set_default("propagate_null", defaults.propagate_null)
            .map_err(config_err)
    }

    fn validate(&self) -> RollupResult<()> {
        if self.unknown_label.trim().is_empty() {
            return Err(RollupError::Settings {
                message: "unknown_label must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> RollupResult<String> {
        toml::to_string_pretty(self).map_err(|e| RollupError::Settings {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# rollup configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/rollup/rollup.toml
#   File:   passed explicitly to Settings::load
#   Env:    ROLLUP_* environment variables (e.g. ROLLUP_UNKNOWN_LABEL)

# Name of the child node collecting items whose grouping value is null
# unknown_label = "Unknown"

# Treat navigation through (or arithmetic on) a null value as null
# instead of failing the grouping
# propagate_null = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> RollupError {
    RollupError::Settings {
        message: e.to_string(),
    }
}

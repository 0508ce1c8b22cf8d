//! Configuration file handling.
//!
//! Settings come from an optional `vpr-dashboard.toml`; command-line flags
//! override them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filter::FilterState;
use crate::data::loader::LoadOptions;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "vpr-dashboard.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    /// Initial filter selection.
    #[serde(default)]
    pub filters: FilterState,

    #[serde(default)]
    pub bias: BiasConfig,
}

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding `marks.*`, `scores.*` and `bias.*`.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,

    /// Use the built-in demo generator instead of files.
    #[serde(default)]
    pub mock: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            mock: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasConfig {
    /// Trust the sum of per-label markers over the stored `totalMarkers`.
    #[serde(default)]
    pub recompute_totals: bool,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    log::debug!("using {DEFAULT_CONFIG_FILE}");
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            recompute_totals: self.bias.recompute_totals,
        }
    }
}

//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main typedprompt configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template lookup configuration
    pub templates: TemplatesConfig,

    /// Template engine configuration
    pub render: RenderConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        Ok(Self::load_first(&Self::search_paths()))
    }

    /// Implicit config locations, highest priority first
    ///
    /// `./.typedprompt.yml`, then `<config_dir>/typedprompt/typedprompt.yml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".typedprompt.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("typedprompt").join("typedprompt.yml"));
        }
        paths
    }

    /// First candidate that exists and parses; broken files are skipped with a warning
    fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Self::default()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where named templates come from and how inline text is cleaned up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directories searched, in order, for `<name>.<extension>`
    pub dirs: Vec<PathBuf>,

    /// File extension of named templates
    pub extension: String,

    /// Strip common indentation and surrounding blank space from inline templates
    pub dedent: bool,

    /// Keep loaded template sources in memory
    pub cache: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            extension: "pmt".to_string(),
            dedent: true,
            cache: true,
        }
    }
}

/// Escaping applied to substituted values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    /// Values are inserted verbatim (plain-text prompts)
    #[default]
    None,
    /// HTML entity escaping
    Html,
}

/// Template engine options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Referencing a variable missing from the context is an error
    #[serde(rename = "strict-undefined")]
    pub strict_undefined: bool,

    /// Trim leading and trailing whitespace from rendered output
    #[serde(rename = "trim-output")]
    pub trim_output: bool,

    /// Escaping of substituted values
    pub escape: EscapeMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strict_undefined: true,
            trim_output: true,
            escape: EscapeMode::None,
        }
    }
}

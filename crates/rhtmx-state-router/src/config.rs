// File: src/config.rs
// Purpose: Router configuration parsing from router.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::state::StateConfig;

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub urls: UrlConfig,

    #[serde(default)]
    pub transitions: TransitionConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Declarative states, registered in order by `StateService::from_config`
    #[serde(default)]
    pub states: Vec<StateConfig>,
}

/// URL matching and formatting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UrlConfig {
    /// Whether static segments match case-insensitively (default: false)
    #[serde(default = "default_false")]
    pub case_insensitive: bool,

    /// Whether a trailing slash must match exactly (default: true)
    #[serde(default = "default_true")]
    pub strict_mode: bool,

    /// Whether hrefs are plain paths (true) or `#`-prefixed (default: true)
    #[serde(default = "default_true")]
    pub html5_mode: bool,

    /// Prefix written after `#` when html5 mode is off (default: "")
    #[serde(default)]
    pub hash_prefix: String,

    /// URL to visit when no rule matches the location
    #[serde(default)]
    pub otherwise: Option<String>,
}

/// Transition behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionConfig {
    /// Longest redirect chain followed before giving up (default: 20)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Whether the default error handler logs rejections (default: true)
    #[serde(default = "default_true")]
    pub log_rejections: bool,
}

/// State registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Whether `register` flushes the queue immediately (default: true)
    #[serde(default = "default_true")]
    pub auto_flush: bool,
}

// Default values
fn default_max_redirects() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            strict_mode: true,
            html5_mode: true,
            hash_prefix: String::new(),
            otherwise: None,
        }
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            max_redirects: default_max_redirects(),
            log_rejections: true,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { auto_flush: true }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist or is empty, return default config
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read router config: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Self::from_toml(&content).with_context(|| format!("Failed to parse router config: {:?}", path))
    }

    /// Load configuration from the default path (./router.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("router.toml")
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

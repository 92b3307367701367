//! Configuration management for deckgen.
//!
//! Loads configuration from an optional TOML file (`deckgen.toml` in the
//! working directory by default) with sensible defaults. API keys are
//! resolved from config or environment by the provider modules; missing
//! keys surface per request, not at startup.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How deck HTML is produced from an outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// One provider call per slide, fanned out, reassembled in outline
    /// order (default).
    #[default]
    Parallel,
    /// One provider call for the whole document, chunks streamed through
    /// to the client as they arrive.
    Streamed,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    const DEFAULT_HOST: &str = "127.0.0.1";
    const DEFAULT_PORT: u16 = 3000;

    /// Returns the listener address in `host:port` form.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

/// Deck generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GenerationConfig {
    pub mode: GenerationMode,
}

/// Deck storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local directory used by the filesystem backend.
    pub dir: String,
    /// Key prefix shared by both backends.
    pub prefix: String,
}

impl StorageConfig {
    const DEFAULT_DIR: &str = "data";
    const DEFAULT_PREFIX: &str = "presentations";
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: Self::DEFAULT_DIR.to_string(),
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Provider configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies).
    pub base_url: Option<String>,
    /// Model override for this provider.
    pub model: Option<String>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub providers: ProvidersConfig,
}

impl Config {
    /// Default config file path, relative to the working directory.
    pub const DEFAULT_PATH: &str = "deckgen.toml";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(Self::DEFAULT_PATH))
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }
}

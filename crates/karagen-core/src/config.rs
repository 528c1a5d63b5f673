//! Configuration management for karagen.
//!
//! This module defines the `Config` struct holding provider, model, retry and
//! output settings. The configuration can be loaded from a YAML or TOML file,
//! created programmatically, or overridden from command-line arguments.
//!
//! # Examples
//!
//! ```no_run
//! use karagen_core::config::Config;
//! use karagen_core::generator::Provider;
//!
//! // Create a new config programmatically
//! let mut config = Config::default();
//! config.provider = Provider::Groq;
//! assert_eq!(config.api_key_env(), "GROQ_API_KEY");
//!
//! // Or load from a config file
//! # async fn load() -> karagen_core::Result<()> {
//! let config = Config::from_file("karagen.yaml").await?;
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generator::{Provider, RetryPolicy};
use crate::output::Layout;
use crate::Error;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

/// File name looked up in the working directory and in `~/.karagen/`
pub const CONFIG_FILE_NAME: &str = "karagen.yaml";

/// Configuration for a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Completion provider
    #[serde(default)]
    pub provider: Provider,

    /// Model name (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API (provider default when unset)
    #[serde(default)]
    pub base_url: Option<Url>,

    /// Environment variable holding the API key (provider default when unset)
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How endpoints are split into feature files
    #[serde(default)]
    pub layout: Layout,

    /// Append a UTC timestamp to output file names
    #[serde(default)]
    pub timestamp: bool,

    /// Backoff applied around each completion request
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
            layout: Layout::default(),
            timestamp: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file; `.toml` files are read as TOML, anything else as YAML
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let config = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }

    /// Save configuration to a file, in the format implied by its extension
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_yaml::to_string(self)?
        };
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load `./karagen.yaml`, else `~/.karagen/karagen.yaml`, else defaults
    pub async fn discover() -> crate::Result<Self> {
        for candidate in Self::search_paths() {
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                log::debug!("Using config file {}", candidate.display());
                return Self::from_file(&candidate).await;
            }
        }
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".karagen").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Model to request
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Base URL of the completion API
    pub fn base_url(&self) -> crate::Result<Url> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(self.provider.default_base_url())
                .map_err(|e| Error::config(format!("Invalid provider base URL: {}", e))),
        }
    }

    /// Name of the environment variable that must hold the API key
    pub fn api_key_env(&self) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| self.provider.api_key_env().to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_roundtrip_yaml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("karagen.yaml");

        let mut config = Config::default();
        config.provider = Provider::Groq;
        config.layout = Layout::PerGroup;
        config.max_tokens = Some(2048);
        config.save(&file_path).await?;

        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_config_roundtrip_toml() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("karagen.toml");

        let mut config = Config::default();
        config.base_url = Some(Url::parse("http://localhost:8080/v1").unwrap());
        config.timestamp = true;
        config.save(&file_path).await?;

        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("partial.yml");
        tokio::fs::write(&file_path, "provider: groq\nlayout: per-endpoint\n").await?;

        let config = Config::from_file(&file_path).await?;
        assert_eq!(config.provider, Provider::Groq);
        assert_eq!(config.layout, Layout::PerEndpoint);
        assert_eq!(config.temperature, default_temperature());
        assert_eq!(config.retry, RetryPolicy::default());
        Ok(())
    }

    #[test]
    fn test_provider_defaults_apply() {
        let config = Config::default();
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.model(), "gpt-4");
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://api.openai.com/v1"
        );
    }

    #[test]
    fn test_explicit_values_win() {
        let config = Config {
            provider: Provider::Groq,
            model: Some("mixtral".into()),
            api_key_env: Some("MY_KEY".into()),
            ..Config::default()
        };
        assert_eq!(config.model(), "mixtral");
        assert_eq!(config.api_key_env(), "MY_KEY");
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://api.groq.com/openai/v1"
        );
    }
}

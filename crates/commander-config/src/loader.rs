//! Configuration loading from JSON, YAML or TOML files.

use crate::error::ConfigError;
use crate::schema::Config;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Picks a format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Reads and writes the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this loader reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates configuration from file.
    pub async fn load(&self) -> Result<Config, ConfigError> {
        let format = ConfigFormat::from_path(&self.path)?;
        debug!(path = %self.path.display(), ?format, "Parsing configuration file");

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;

        let config = Self::parse(&text, format)?;
        config.validate()?;

        info!(
            path = %self.path.display(),
            prefix = %config.command_prefix,
            extensions = config.extensions.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Writes `config` back in the file's own format.
    ///
    /// The text goes to a sibling temp file first and is renamed over the
    /// original, so readers never see a partial file.
    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let format = ConfigFormat::from_path(&self.path)?;
        config.validate()?;
        let text = Self::render(config, format)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_error = |source: std::io::Error| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, text).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_error)?;

        info!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }

    /// Renders configuration text in the given format.
    pub fn render(config: &Config, format: ConfigFormat) -> Result<String, ConfigError> {
        Ok(match format {
            ConfigFormat::Json => serde_json::to_string_pretty(config)? + "\n",
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config)?,
        })
    }

    /// Parses configuration text in the given format without validating it.
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
        Ok(match format {
            ConfigFormat::Json => serde_json::from_str(text)?,
            ConfigFormat::Yaml => serde_yaml::from_str(text)?,
            ConfigFormat::Toml => toml::from_str(text)?,
        })
    }
}

//! Configuration error types.

use std::path::PathBuf;

/// Errors raised while working with the extension registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionConfigError {
    /// The named extension has no entry in the configuration.
    #[error("Extension `{0}` is not in the configuration")]
    NotConfigured(String),

    /// The named extension is required and cannot be disabled.
    #[error("Extension `{0}` is required and cannot be disabled")]
    IsRequired(String),

    /// The same extension name appears more than once.
    #[error("Extension `{0}` is configured more than once")]
    Duplicate(String),

    /// An entry has an empty name.
    #[error("Extension entries must have a non-empty name")]
    EmptyName,

    /// A shorthand entry uses both the required and the disabled sigil.
    #[error("Extension entry `{0}` cannot be both required and disabled in shorthand form")]
    ConflictingSigils(String),
}

/// Errors raised while loading or validating the bot configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("Failed to access configuration file {path:?}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not map to a known format.
    #[error("Unsupported configuration format: {0:?}")]
    UnsupportedFormat(PathBuf),

    /// JSON parse failure.
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse failure.
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure.
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration could not be written as TOML.
    #[error("Failed to write TOML configuration: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// The configuration parsed but is not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The extension list is not usable.
    #[error(transparent)]
    Extension(#[from] ExtensionConfigError),
}

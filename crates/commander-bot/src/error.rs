//! Application-wide error types using thiserror.

use commander_config::ConfigError;
use poise::serenity_prelude as serenity;
use std::path::PathBuf;

/// Main application error type.
#[derive(thiserror::Error, Debug)]
pub enum BotError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Discord/Serenity error.
    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    /// The token file could not be read.
    #[error("Failed to read token file {path}: {source}")]
    TokenFile {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No usable token was supplied.
    #[error("No bot token was provided")]
    MissingToken,

    /// Required extensions failed to load.
    #[error("Required extensions failed to load: {}", .0.join(", "))]
    RequiredExtensions(Vec<String>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the bot application.
pub type BotResult<T> = Result<T, BotError>;

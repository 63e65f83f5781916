//! Runtime validation of a parsed configuration.

use crate::error::ConfigError;
use crate::registry::ExtensionRegistry;
use crate::schema::Config;

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a configuration.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.command_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Command prefix cannot be empty".to_string(),
            ));
        }

        if config.command_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "Command prefix cannot contain whitespace".to_string(),
            ));
        }

        // Catches duplicate names before anything is loaded.
        ExtensionRegistry::from_entries(config.extensions.iter().cloned())?;

        Ok(())
    }
}

impl Config {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigValidator::validate(self)
    }

    /// Builds the extension registry for this configuration.
    pub fn extension_registry(&self) -> Result<ExtensionRegistry, ConfigError> {
        Ok(ExtensionRegistry::from_entries(self.extensions.iter().cloned())?)
    }
}

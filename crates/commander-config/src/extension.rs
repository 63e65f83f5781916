//! Configured extension entries and their shorthand syntax.
//!
//! An entry in the `extensions` list is either a bare string or a table:
//!
//! - `"name"` loads the extension,
//! - `"$name"` loads it and marks it as required,
//! - `"!name"` keeps it configured but disabled,
//! - `{ "name": ..., "required": ..., "disabled": ..., "options": ... }`.
//!
//! When the table form sets both `required` and `disabled`, the entry is
//! disabled. `required` is still reported so that an operator can see it.

use crate::error::ExtensionConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Prefix marking an extension as required.
pub const REQUIRED_SIGIL: char = '$';

/// Prefix marking an extension as disabled.
pub const DISABLED_SIGIL: char = '!';

/// A single extension entry from the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExtensionEntry", into = "RawExtensionEntry")]
pub struct ConfiguredExtension {
    /// Unique extension name, e.g. `commander.ext.invite`.
    pub name: String,
    /// Required extensions cannot be disabled at runtime and abort startup
    /// when they fail to load.
    pub required: bool,
    /// Disabled extensions are not loaded.
    pub disabled: bool,
    /// Free-form options handed to the extension on load.
    pub options: Option<Value>,
}

impl ConfiguredExtension {
    /// Creates an enabled, optional entry without options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            disabled: false,
            options: None,
        }
    }

    /// Marks the entry as required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Marks the entry as disabled.
    #[must_use]
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Attaches an options document.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Whether the entry should be loaded.
    pub const fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Parses the shorthand string form.
    pub fn parse_shorthand(entry: &str) -> Result<Self, ExtensionConfigError> {
        let (name, required, disabled) = if let Some(rest) = entry.strip_prefix(REQUIRED_SIGIL) {
            (rest, true, false)
        } else if let Some(rest) = entry.strip_prefix(DISABLED_SIGIL) {
            (rest, false, true)
        } else {
            (entry, false, false)
        };

        if name.starts_with([REQUIRED_SIGIL, DISABLED_SIGIL]) {
            return Err(ExtensionConfigError::ConflictingSigils(entry.to_string()));
        }
        validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            required,
            disabled,
            options: None,
        })
    }
}

impl FromStr for ConfiguredExtension {
    type Err = ExtensionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_shorthand(s)
    }
}

fn validate_name(name: &str) -> Result<(), ExtensionConfigError> {
    if name.trim().is_empty() {
        return Err(ExtensionConfigError::EmptyName);
    }
    Ok(())
}

/// Wire form of an entry, before normalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawExtensionEntry {
    Shorthand(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        required: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        disabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
}

impl TryFrom<RawExtensionEntry> for ConfiguredExtension {
    type Error = ExtensionConfigError;

    fn try_from(raw: RawExtensionEntry) -> Result<Self, Self::Error> {
        match raw {
            RawExtensionEntry::Shorthand(entry) => Self::parse_shorthand(&entry),
            RawExtensionEntry::Detailed {
                name,
                required,
                disabled,
                options,
            } => {
                validate_name(&name)?;
                Ok(Self {
                    name,
                    required,
                    disabled,
                    options,
                })
            }
        }
    }
}

impl From<ConfiguredExtension> for RawExtensionEntry {
    fn from(ext: ConfiguredExtension) -> Self {
        match ext {
            ConfiguredExtension {
                name,
                required,
                disabled,
                options: None,
            } if !(required && disabled) => {
                let sigil = if required {
                    Some(REQUIRED_SIGIL)
                } else if disabled {
                    Some(DISABLED_SIGIL)
                } else {
                    None
                };
                Self::Shorthand(sigil.map_or_else(|| name.clone(), |s| format!("{s}{name}")))
            }
            ConfiguredExtension {
                name,
                required,
                disabled,
                options,
            } => Self::Detailed {
                name,
                required,
                disabled,
                options,
            },
        }
    }
}

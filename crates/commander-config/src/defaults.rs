//! Default values for the configuration schema.

use crate::schema::{Config, PrivilegedIntentsConfig};
use commander_common::AllowedMentions;

/// Text command prefix used when none is configured programmatically.
pub const DEFAULT_COMMAND_PREFIX: &str = ">";

impl Default for Config {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            privileged_intents: PrivilegedIntentsConfig::default(),
            allowed_mentions: AllowedMentions::not_everyone(),
            extensions: Vec::new(),
        }
    }
}

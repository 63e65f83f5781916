//! Configuration schema definitions using serde.

use crate::extension::ConfiguredExtension;
use commander_common::AllowedMentions;
use serde::{Deserialize, Serialize};

/// Main configuration structure for CommanderBot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix for text commands.
    pub command_prefix: String,
    /// Privileged gateway intents to request on top of the default ones.
    #[serde(default)]
    pub privileged_intents: PrivilegedIntentsConfig,
    /// Default mention policy for outgoing messages.
    #[serde(default)]
    pub allowed_mentions: AllowedMentions,
    /// Extensions to load, in order.
    #[serde(default)]
    pub extensions: Vec<ConfiguredExtension>,
}

/// Privileged gateway intents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegedIntentsConfig {
    /// Guild member events.
    pub members: bool,
    /// Presence updates.
    pub presences: bool,
    /// Message content in guild messages.
    pub message_content: bool,
}

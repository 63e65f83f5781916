//! Framework-level command failures and how users are told about them.

use poise::serenity_prelude::Permissions;
use std::time::Duration;
use thiserror::Error;

/// A built-in check that stopped a command before it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// `owners_only` command used by someone else.
    NotAnOwner,
    /// The invoking user lacks permissions; `None` when they could not be
    /// determined.
    MissingUserPermissions(Option<Permissions>),
    /// The bot lacks permissions.
    MissingBotPermissions(Permissions),
    /// `guild_only` command used in a direct message.
    GuildOnly,
    /// `dm_only` command used in a server.
    DmOnly,
    /// `nsfw_only` command used outside an NSFW channel.
    NsfwOnly,
    /// The command is on cooldown.
    Cooldown(Duration),
    /// A group was invoked without one of its subcommands.
    SubcommandRequired {
        /// Qualified name of the group.
        command: String,
        /// Names of its subcommands.
        subcommands: Vec<String>,
    },
}

impl CheckFailure {
    /// What the user is told.
    pub fn message(&self) -> String {
        match self {
            Self::NotAnOwner => "Only bot owners can use this command.".to_string(),
            Self::MissingUserPermissions(Some(missing)) => {
                format!("You are missing permissions for this command: {missing}")
            }
            Self::MissingUserPermissions(None) => {
                "Your permissions for this command could not be checked.".to_string()
            }
            Self::MissingBotPermissions(missing) => {
                format!("I am missing permissions for this command: {missing}")
            }
            Self::GuildOnly => "This command can only be used in a server.".to_string(),
            Self::DmOnly => "This command can only be used in direct messages.".to_string(),
            Self::NsfwOnly => "This command can only be used in NSFW channels.".to_string(),
            Self::Cooldown(remaining) => format!(
                "This command is on cooldown. Try again in {:.1} seconds.",
                remaining.as_secs_f32()
            ),
            Self::SubcommandRequired {
                command,
                subcommands,
            } => {
                let names: Vec<String> = subcommands.iter().map(|name| format!("`{name}`")).collect();
                format!("`{command}` needs a subcommand: {}", names.join(", "))
            }
        }
    }
}

/// A command that failed without returning an error of its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The command panicked.
    #[error("Command panicked: {}", .0.as_deref().unwrap_or("no panic message"))]
    Panicked(Option<String>),

    /// The registered slash command no longer matches the local definition.
    #[error("Command structure mismatch: {0}")]
    StructureMismatch(&'static str),
}

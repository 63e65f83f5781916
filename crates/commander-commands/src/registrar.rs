//! Discord's application command endpoints as a [`CommandRegistrar`].

use async_trait::async_trait;
use commander_common::BoxError;
use commander_core::{CommandRegistrar, RegisteredCommand};
use poise::serenity_prelude::{
    self as serenity, Command, CommandId, CommandOption, CommandOptionType, CommandType,
    CreateCommand, GuildId,
};
use std::sync::Arc;
use tracing::debug;

/// Registers and fetches application commands over HTTP.
#[derive(Clone)]
pub struct SerenityRegistrar {
    http: Arc<serenity::Http>,
}

impl SerenityRegistrar {
    /// Wraps an HTTP client.
    pub const fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

impl std::fmt::Debug for SerenityRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerenityRegistrar").finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRegistrar for SerenityRegistrar {
    type Definition = CreateCommand;

    async fn sync_global(
        &self,
        commands: Vec<CreateCommand>,
    ) -> Result<Vec<RegisteredCommand>, BoxError> {
        let registered = Command::set_global_commands(&self.http, commands).await?;
        Ok(flatten_commands(&registered, None))
    }

    async fn fetch_global(&self) -> Result<Vec<RegisteredCommand>, BoxError> {
        let registered = Command::get_global_commands(&self.http).await?;
        Ok(flatten_commands(&registered, None))
    }

    async fn fetch_guild(&self, guild_id: GuildId) -> Result<Vec<RegisteredCommand>, BoxError> {
        let registered = guild_id.get_commands(&self.http).await?;
        Ok(flatten_commands(&registered, Some(guild_id)))
    }
}

/// Expands slash commands into one entry per qualified name.
///
/// Context menu commands are not slash-invocable and are left out.
pub fn flatten_commands(commands: &[Command], guild_id: Option<GuildId>) -> Vec<RegisteredCommand> {
    let mut flattened = Vec::new();
    for command in commands {
        if command.kind != CommandType::ChatInput {
            debug!(name = %command.name, "Skipping context menu command");
            continue;
        }
        push(&mut flattened, command.name.clone(), command.id, guild_id);
        for option in &command.options {
            flatten_option(&mut flattened, &command.name, option, command.id, guild_id);
        }
    }
    flattened
}

fn flatten_option(
    flattened: &mut Vec<RegisteredCommand>,
    parent: &str,
    option: &CommandOption,
    id: CommandId,
    guild_id: Option<GuildId>,
) {
    if !matches!(
        option.kind,
        CommandOptionType::SubCommand | CommandOptionType::SubCommandGroup
    ) {
        return;
    }

    let name = format!("{parent} {}", option.name);
    for nested in &option.options {
        flatten_option(flattened, &name, nested, id, guild_id);
    }
    push(flattened, name, id, guild_id);
}

fn push(
    flattened: &mut Vec<RegisteredCommand>,
    name: String,
    id: CommandId,
    guild_id: Option<GuildId>,
) {
    flattened.push(RegisteredCommand { name, id, guild_id });
}
